//! Byte-addressable display surface the overlay placeholder writes into
//!
//! On a device this is a shared mapping of the framebuffer node. Tests and
//! headless hosts use a heap buffer instead.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Writable display memory
pub trait DisplaySurface: Send {
    /// Size of the surface in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill the first `len` bytes with `byte`, clamped to the surface size.
    /// Returns the number of bytes written.
    fn fill_prefix(&mut self, byte: u8, len: usize) -> usize;
}

/// Produces the display surface at device open
pub trait FramebufferOpener: Send + Sync {
    fn open(&self, path: &Path, len: usize) -> io::Result<Box<dyn DisplaySurface>>;
}

/// Heap-backed surface; clones share the same bytes
#[derive(Debug, Clone)]
pub struct MemorySurface {
    bytes: Arc<Mutex<Vec<u8>>>,
    fills: Arc<AtomicUsize>,
}

impl MemorySurface {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0; len])),
            fills: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// Number of fill operations performed so far
    pub fn fill_count(&self) -> usize {
        self.fills.load(Ordering::Relaxed)
    }
}

impl DisplaySurface for MemorySurface {
    fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    fn fill_prefix(&mut self, byte: u8, len: usize) -> usize {
        let mut bytes = self.bytes.lock();
        let n = len.min(bytes.len());
        bytes[..n].fill(byte);
        self.fills.fetch_add(1, Ordering::Relaxed);
        n
    }
}

/// Hands out clones of one [`MemorySurface`], ignoring the path
#[derive(Debug, Clone)]
pub struct MemoryFramebufferOpener {
    surface: MemorySurface,
}

impl MemoryFramebufferOpener {
    pub fn new(surface: MemorySurface) -> Self {
        Self { surface }
    }
}

impl FramebufferOpener for MemoryFramebufferOpener {
    fn open(&self, _path: &Path, _len: usize) -> io::Result<Box<dyn DisplaySurface>> {
        Ok(Box::new(self.surface.clone()))
    }
}

/// Opens and maps the real framebuffer device node
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFramebufferOpener;

impl FramebufferOpener for DeviceFramebufferOpener {
    #[cfg(unix)]
    fn open(&self, path: &Path, len: usize) -> io::Result<Box<dyn DisplaySurface>> {
        Ok(Box::new(MappedFramebuffer::open(path, len)?))
    }

    #[cfg(not(unix))]
    fn open(&self, path: &Path, _len: usize) -> io::Result<Box<dyn DisplaySurface>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot map {}: framebuffer mapping needs a unix host", path.display()),
        ))
    }
}

#[cfg(unix)]
pub use mapped::MappedFramebuffer;

#[cfg(unix)]
mod mapped {
    use std::ffi::c_void;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::num::NonZeroUsize;
    use std::path::Path;
    use std::ptr::NonNull;

    use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

    use super::DisplaySurface;

    /// Shared read-write mapping of a framebuffer node.
    ///
    /// Unmapped and closed on drop.
    pub struct MappedFramebuffer {
        file: File,
        addr: NonNull<c_void>,
        len: NonZeroUsize,
    }

    // Safety: the mapping is owned exclusively by this value and only
    // touched through `&mut self`.
    unsafe impl Send for MappedFramebuffer {}

    impl MappedFramebuffer {
        /// Open `path` read-write and map its first `len` bytes
        pub fn open<P: AsRef<Path>>(path: P, len: usize) -> io::Result<Self> {
            let len = NonZeroUsize::new(len)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "zero-length mapping"))?;
            let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

            // Safety: fresh shared mapping at a kernel-chosen address; nothing
            // else in this process aliases it.
            let addr = unsafe {
                mmap(
                    None,
                    len,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED,
                    &file,
                    0,
                )
            }
            .map_err(io::Error::from)?;

            log::debug!("Mapped {} bytes of {} at {:p}", len, path.as_ref().display(), addr);
            Ok(Self { file, addr, len })
        }
    }

    impl DisplaySurface for MappedFramebuffer {
        fn len(&self) -> usize {
            self.len.get()
        }

        fn fill_prefix(&mut self, byte: u8, len: usize) -> usize {
            let n = len.min(self.len.get());
            // Safety: n is within the mapping established in `open`
            unsafe { std::ptr::write_bytes(self.addr.as_ptr().cast::<u8>(), byte, n) };
            n
        }
    }

    impl Drop for MappedFramebuffer {
        fn drop(&mut self) {
            // Safety: addr/len are exactly what mmap returned
            if let Err(e) = unsafe { munmap(self.addr, self.len.get()) } {
                log::warn!("Failed to unmap framebuffer: {}", e);
            }
            log::debug!("Released framebuffer mapping (fd {:?})", self.file);
        }
    }
}
