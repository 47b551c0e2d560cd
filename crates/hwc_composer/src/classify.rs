//! Layer classification (the prepare half of a frame)
//!
//! Placeholder heuristic, not a real overlay validity check: an opaque
//! bottom layer goes to the overlay path in place of a background fill,
//! everything else is left to the GPU. Destination overlap, formats and
//! scaling limits are not considered.

use crate::layer::{CompositionType, DisplayContents};

/// Classify the primary display. Only the first entry is looked at.
pub fn prepare(displays: &mut [DisplayContents]) {
    if let Some(primary) = displays.first_mut() {
        prepare_display(primary);
    }
}

/// Assign a composition type to every layer of one display
///
/// Does nothing unless the geometry changed, so dispositions from the
/// previous call carry over.
pub fn prepare_display(contents: &mut DisplayContents) {
    if !contents.geometry_changed() {
        log::trace!("prepare: geometry unchanged, keeping {} dispositions", contents.layers.len());
        return;
    }

    for (index, layer) in contents.layers.iter_mut().enumerate() {
        log::debug!("\t{}", layer);

        layer.composition_type = if index == 0 && layer.blending.is_opaque() {
            CompositionType::Overlay
        } else {
            CompositionType::Gpu
        };
    }
}
