//! # HWC Composer
//!
//! Hardware composer for a single fixed framebuffer display.
//!
//! The host compositor drives it once per frame and receives vsync
//! callbacks in between:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Host compositor                                             │
//! │   prepare(displays) ──► classify: opaque bottom → overlay    │
//! │   set(displays)     ──► present: buffer swap, then overlay   │
//! │                         placeholder into the framebuffer     │
//! │   event_control     ──► vsync loop ──► HwcProcs::vsync       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  hwc_composer (this crate)                                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Allocator, GPU buffer swap, framebuffer node (injected)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Overlay handling is a placeholder: layers sent to the overlay path are
//! "drawn" by filling a prefix of the framebuffer with a fixed byte.

pub mod allocator;
pub mod classify;
pub mod config;
pub mod device;
pub mod error;
pub mod layer;
pub mod present;
pub mod procs;
pub mod surface;
pub mod vsync;

pub use allocator::{Allocator, FramebufferHandle, HeadlessAllocator, ModuleRegistry, StaticRegistry};
pub use config::HwcConfig;
pub use device::{
    Composer, DeviceDeps, EventKind, HwcDevice, HwcModule, HAL_MODULE_INFO, HWC_HARDWARE_COMPOSER,
};
pub use error::{HwcError, HwcResult};
pub use layer::{
    Blending, BufferHandle, CompositionType, DisplayContents, DisplayFlags, DisplayHandle, DisplayId, Layer,
    LayerFlags, Rect, SurfaceHandle,
};
pub use present::{BufferSwap, FramePresenter, HeadlessSwap, PresentStats};
pub use procs::HwcProcs;
pub use surface::{DisplaySurface, FramebufferOpener, MemoryFramebufferOpener, MemorySurface};
pub use vsync::{Clock, MonotonicClock, VsyncGenerator};
