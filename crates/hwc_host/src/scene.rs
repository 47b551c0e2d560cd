//! Synthetic frames submitted by the headless host
//!
//! Like a real compositor, the host keeps one layer list alive across
//! frames and only flags a geometry change when it relayouts, so the
//! composer's dispositions carry over in between.

use hwc_composer::{Blending, BufferHandle, DisplayContents, DisplayHandle, Layer, Rect, SurfaceHandle};

/// Screen size of the fixed panel
pub const SCREEN: Rect = Rect::new(0, 0, 800, 480);

/// Frames between simulated relayouts
pub const RELAYOUT_INTERVAL: u64 = 120;

const APP_BUFFERS: u64 = 3;

/// Wallpaper, status bar and one app window
pub fn initial_frame() -> DisplayContents {
    let status_bar = Rect::new(0, 0, SCREEN.right, 24);
    let window = Rect::new(40, 40, SCREEN.right - 40, SCREEN.bottom - 40);

    let mut contents = DisplayContents::new(DisplayHandle(1), SurfaceHandle(1)).with_layers(vec![
        Layer::new(BufferHandle(0x1000), Blending::None, SCREEN),
        Layer::new(BufferHandle(0x2000), Blending::Alpha, status_bar),
        Layer::new(BufferHandle(0x3000), Blending::Alpha, window),
    ]);
    contents.set_geometry_changed(true);
    contents
}

/// Move the scene to `frame`: the app window cycles through its buffers
/// and the layout is redone every [`RELAYOUT_INTERVAL`] frames
pub fn advance(contents: &mut DisplayContents, frame: u64) {
    if let Some(window) = contents.layers.get_mut(2) {
        window.handle = BufferHandle(0x3000 + frame % APP_BUFFERS);
    }
    contents.set_geometry_changed(frame % RELAYOUT_INTERVAL == 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwc_composer::{classify, CompositionType};

    #[test]
    fn test_wallpaper_is_opaque_bottom_layer() {
        let frame = initial_frame();
        assert!(frame.geometry_changed());
        assert_eq!(frame.layers.len(), 3);
        assert!(frame.layers[0].blending.is_opaque());
        assert_eq!(frame.layers[0].display_frame, SCREEN);
    }

    #[test]
    fn test_advance_flags_relayouts() {
        let mut frame = initial_frame();

        advance(&mut frame, 1);
        assert!(!frame.geometry_changed());
        assert_eq!(frame.layers[2].handle, BufferHandle(0x3001));

        advance(&mut frame, RELAYOUT_INTERVAL);
        assert!(frame.geometry_changed());
    }

    #[test]
    fn test_dispositions_survive_between_relayouts() {
        let mut frame = initial_frame();
        classify::prepare_display(&mut frame);

        for n in 1..5 {
            advance(&mut frame, n);
            classify::prepare_display(&mut frame);
            assert_eq!(frame.layers[0].composition_type, CompositionType::Overlay);
        }
    }
}
