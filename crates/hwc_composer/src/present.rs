//! Frame presentation (the set half of a frame)

use crate::error::{HwcError, HwcResult};
use crate::layer::{DisplayContents, DisplayHandle, SurfaceHandle};
use crate::surface::DisplaySurface;

/// The GPU presentation call, provided by the platform
pub trait BufferSwap: Send + Sync {
    /// Swap the front and back buffers of `surface`. Blocks until done.
    fn swap_buffers(&self, display: DisplayHandle, surface: SurfaceHandle) -> bool;
}

/// Swap that always succeeds, for hosts without a GPU
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessSwap;

impl BufferSwap for HeadlessSwap {
    fn swap_buffers(&self, _display: DisplayHandle, _surface: SurfaceHandle) -> bool {
        true
    }
}

/// What a present call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentStats {
    /// Overlay layers the placeholder was drawn for
    pub overlay_layers: usize,
    /// Bytes written into the display surface
    pub bytes_written: usize,
}

/// Drives the buffer swap, then stands in for overlay programming by
/// painting a prefix of the display surface once per overlay layer
#[derive(Debug, Clone, Copy)]
pub struct FramePresenter {
    fill_byte: u8,
    fill_len: usize,
}

impl FramePresenter {
    pub fn new(fill_byte: u8, fill_len: usize) -> Self {
        Self { fill_byte, fill_len }
    }

    /// Present one display's frame
    ///
    /// A failed swap is returned as [`HwcError::Presentation`] with nothing
    /// written; no retry. Overlay writes are best effort and never fail the
    /// call.
    pub fn present(
        &self,
        swap: &dyn BufferSwap,
        contents: &DisplayContents,
        mut surface: Option<&mut (dyn DisplaySurface + 'static)>,
    ) -> HwcResult<PresentStats> {
        log::debug!("set: {} layers, swapping buffers", contents.layers.len());

        if !swap.swap_buffers(contents.display, contents.surface) {
            log::error!("Buffer swap failed for display {:?}", contents.display);
            return Err(HwcError::Presentation);
        }

        let mut stats = PresentStats::default();

        for index in contents.overlay_layers() {
            log::debug!("Overlay layer ({}): {}", index, contents.layers[index]);
            stats.overlay_layers += 1;

            match surface.as_deref_mut() {
                Some(surface) => stats.bytes_written += surface.fill_prefix(self.fill_byte, self.fill_len),
                None => log::debug!("No display surface mapped, skipping overlay placeholder"),
            }
        }

        Ok(stats)
    }
}

impl Default for FramePresenter {
    fn default() -> Self {
        Self::new(0x80, 2000)
    }
}
