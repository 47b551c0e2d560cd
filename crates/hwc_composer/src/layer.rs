//! Per-frame layer model handed over by the host
//!
//! The host owns every [`DisplayContents`]; the composer only rewrites
//! [`Layer::composition_type`] during prepare and reads the rest.

use std::fmt;

use bitflags::bitflags;

/// Display identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DisplayId(pub i32);

impl DisplayId {
    /// The built-in panel
    pub const PRIMARY: Self = Self(0);
    /// A hotplugged display (never served by this device)
    pub const EXTERNAL: Self = Self(1);
}

/// Which subsystem renders a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompositionType {
    /// Composited by the GPU into the framebuffer target
    #[default]
    Gpu,
    /// Handled by the display path instead of the GPU
    Overlay,
    /// Solid background fill
    Background,
    /// The GPU's own output surface
    Target,
}

impl CompositionType {
    /// Name used in layer dumps
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gpu => "FB",
            Self::Overlay => "OVERLAY",
            Self::Background => "BACKGROUND",
            Self::Target => "FB TARGET",
        }
    }
}

/// Layer blending mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    /// Fully opaque
    #[default]
    None,
    /// Blended with what is underneath
    Alpha,
}

impl Blending {
    /// Host blending code
    pub fn code(&self) -> u32 {
        match self {
            Self::None => 0x100,
            Self::Alpha => 0x105,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "BLENDING_NONE",
            Self::Alpha => "BLENDING_ALPHA",
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Integer rectangle, right/bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{},{},{}}}", self.left, self.top, self.right, self.bottom)
    }
}

/// Opaque allocator buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferHandle(pub u64);

/// Opaque presentation display handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DisplayHandle(pub u64);

/// Opaque presentation surface handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceHandle(pub u64);

bitflags! {
    /// Per-layer flags set by the host
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerFlags: u32 {
        /// The host will draw this layer itself
        const SKIP_LAYER = 0x0000_0001;
    }
}

bitflags! {
    /// Per-display flags set by the host
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DisplayFlags: u32 {
        /// Layer list or geometry changed since the previous frame
        const GEOMETRY_CHANGED = 0x0000_0001;
    }
}

/// One visual element of a frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layer {
    pub composition_type: CompositionType,
    pub handle: BufferHandle,
    pub transform: u32,
    pub blending: Blending,
    pub source_crop: Rect,
    pub display_frame: Rect,
    pub flags: LayerFlags,
}

impl Layer {
    /// A layer covering `frame` with the given blending
    pub fn new(handle: BufferHandle, blending: Blending, frame: Rect) -> Self {
        Self {
            handle,
            blending,
            source_crop: Rect::new(0, 0, frame.width(), frame.height()),
            display_frame: frame,
            ..Default::default()
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={}, flags={:08x}, handle={:#x}, tr={:02x}, blend={:04x} ({}), {}, {}",
            self.composition_type.name(),
            self.flags.bits(),
            self.handle.0,
            self.transform,
            self.blending.code(),
            self.blending.name(),
            self.source_crop,
            self.display_frame,
        )
    }
}

/// Layers of one display for one frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayContents {
    pub layers: Vec<Layer>,
    pub flags: DisplayFlags,
    pub display: DisplayHandle,
    pub surface: SurfaceHandle,
}

impl DisplayContents {
    pub fn new(display: DisplayHandle, surface: SurfaceHandle) -> Self {
        Self {
            display,
            surface,
            ..Default::default()
        }
    }

    pub fn with_layers(mut self, layers: Vec<Layer>) -> Self {
        self.layers = layers;
        self
    }

    pub fn geometry_changed(&self) -> bool {
        self.flags.contains(DisplayFlags::GEOMETRY_CHANGED)
    }

    pub fn set_geometry_changed(&mut self, changed: bool) {
        self.flags.set(DisplayFlags::GEOMETRY_CHANGED, changed);
    }

    /// Indices of layers assigned to the overlay path
    pub fn overlay_layers(&self) -> impl Iterator<Item = usize> + '_ {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.composition_type == CompositionType::Overlay)
            .map(|(index, _)| index)
    }
}
