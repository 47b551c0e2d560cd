//! Composer error types

use thiserror::Error;

/// Status returned to the host for a successful call
pub const STATUS_OK: i32 = 0;

/// Status the host expects when the GPU presentation call fails
pub const HWC_EGL_ERROR: i32 = -1;

const EIO: i32 = 5;
const EAGAIN: i32 = 11;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;

/// Composer errors
#[derive(Debug, Error)]
pub enum HwcError {
    #[error("No such device: {0}")]
    NoSuchDevice(String),

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Buffer swap failed")]
    Presentation,

    #[error("Framebuffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vsync thread error: {0}")]
    VsyncThread(String),
}

impl HwcError {
    /// Integer status code handed back across the host boundary
    pub fn status(&self) -> i32 {
        match self {
            Self::NoSuchDevice(_) | Self::Config(_) => -EINVAL,
            Self::Dependency(_) => -ENODEV,
            Self::Presentation => HWC_EGL_ERROR,
            Self::Io(err) => -err.raw_os_error().unwrap_or(EIO),
            Self::VsyncThread(_) => -EAGAIN,
        }
    }
}

/// Result type for composer operations
pub type HwcResult<T> = Result<T, HwcError>;

/// Collapse a result into the host status code
pub fn status_of<T>(result: &HwcResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(err) => err.status(),
    }
}
