//! Graphics buffer allocator, as seen from the composer
//!
//! The allocator lives outside this crate. The device looks it up by its
//! well-known id at open time and keeps the handle around without using it.

use std::sync::Arc;

use crate::error::{HwcError, HwcResult};

/// Well-known allocator module id
pub const GRALLOC_HARDWARE_MODULE_ID: &str = "gralloc";

/// Opaque framebuffer device handle obtained from the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u64);

/// An allocator module
pub trait Allocator: Send + Sync {
    /// Vendor name
    fn name(&self) -> &str;

    fn author(&self) -> &str {
        "unknown"
    }

    /// Open the allocator's framebuffer device
    fn open_framebuffer(&self) -> HwcResult<FramebufferHandle>;
}

/// Looks up hardware modules by id
pub trait ModuleRegistry: Send + Sync {
    fn allocator(&self, id: &str) -> HwcResult<Arc<dyn Allocator>>;
}

/// Registry with at most one allocator, registered under
/// [`GRALLOC_HARDWARE_MODULE_ID`]
#[derive(Default, Clone)]
pub struct StaticRegistry {
    allocator: Option<Arc<dyn Allocator>>,
}

impl StaticRegistry {
    /// Registry where every lookup fails
    pub fn empty() -> Self {
        Self { allocator: None }
    }

    pub fn with_allocator(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator: Some(allocator) }
    }
}

impl ModuleRegistry for StaticRegistry {
    fn allocator(&self, id: &str) -> HwcResult<Arc<dyn Allocator>> {
        match &self.allocator {
            Some(allocator) if id == GRALLOC_HARDWARE_MODULE_ID => Ok(Arc::clone(allocator)),
            _ => Err(HwcError::Dependency(format!("module '{}' not registered", id))),
        }
    }
}

/// Allocator stand-in for hosts without one
#[derive(Debug, Clone)]
pub struct HeadlessAllocator {
    name: String,
}

impl HeadlessAllocator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for HeadlessAllocator {
    fn default() -> Self {
        Self::new("headless gralloc")
    }
}

impl Allocator for HeadlessAllocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_framebuffer(&self) -> HwcResult<FramebufferHandle> {
        Ok(FramebufferHandle(1))
    }
}
