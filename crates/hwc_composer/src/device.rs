//! Device lifecycle and the composer entry points
//!
//! [`HwcModule::open`] builds one [`HwcDevice`] per open handle. The device
//! owns its display surface and vsync loop, and releases both on
//! [`HwcDevice::close`] (or drop).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::allocator::{Allocator, FramebufferHandle, ModuleRegistry, GRALLOC_HARDWARE_MODULE_ID};
use crate::classify;
use crate::config::HwcConfig;
use crate::error::{HwcError, HwcResult};
use crate::layer::{DisplayContents, DisplayId};
use crate::present::{BufferSwap, FramePresenter, PresentStats};
use crate::procs::HwcProcs;
use crate::surface::{DeviceFramebufferOpener, DisplaySurface, FramebufferOpener};
use crate::vsync::{Clock, MonotonicClock, VsyncGenerator};

/// Module id the host looks this module up by
pub const HWC_HARDWARE_MODULE_ID: &str = "hwcomposer";

/// The one device name this module serves
pub const HWC_HARDWARE_COMPOSER: &str = "composer";

/// Major/minor version pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Device API implemented by [`HwcDevice`]
pub const HWC_DEVICE_API_VERSION: ApiVersion = ApiVersion { major: 1, minor: 0 };

/// Module registration record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub author: &'static str,
    pub version: ApiVersion,
}

pub const HAL_MODULE_INFO: ModuleInfo = ModuleInfo {
    id: HWC_HARDWARE_MODULE_ID,
    name: "Sample hwcomposer module",
    author: "hwcomposer contributors",
    version: ApiVersion { major: 1, minor: 0 },
};

/// Display events the host can switch on and off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Vsync,
    /// Anything else; acknowledged and ignored
    Other(i32),
}

impl From<i32> for EventKind {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Vsync,
            other => Self::Other(other),
        }
    }
}

/// Entry points a composer device exposes to the host
pub trait Composer: Send + Sync {
    /// Decide which layers go to the overlay path. Mutates dispositions.
    fn prepare(&self, displays: &mut [DisplayContents]) -> HwcResult<()>;

    /// Present the prepared frame
    fn set(&self, displays: &[DisplayContents]) -> HwcResult<PresentStats>;

    /// Turn a display event on or off
    fn event_control(&self, display: DisplayId, event: EventKind, enabled: bool) -> HwcResult<()>;

    /// Blank or unblank a display
    fn blank(&self, display: DisplayId, blank: bool) -> HwcResult<()>;

    /// Query a device property
    fn query(&self, what: i32, value: &mut i32) -> HwcResult<()>;

    /// Register the host callback table
    fn register_procs(&self, procs: &Arc<dyn HwcProcs>);

    /// Write debug state into `buffer`
    fn dump(&self, buffer: &mut [u8]);

    fn get_display_configs(
        &self,
        display: DisplayId,
        configs: &mut [u32],
        num_configs: &mut usize,
    ) -> HwcResult<()>;

    fn get_display_attributes(
        &self,
        display: DisplayId,
        config: u32,
        attributes: &[u32],
        values: &mut [i32],
    ) -> HwcResult<()>;
}

/// Collaborators a device is built from
#[derive(Clone)]
pub struct DeviceDeps {
    pub registry: Arc<dyn ModuleRegistry>,
    pub swap: Arc<dyn BufferSwap>,
    pub framebuffer: Arc<dyn FramebufferOpener>,
    pub clock: Arc<dyn Clock>,
}

impl DeviceDeps {
    /// Real framebuffer node and monotonic clock
    pub fn system(registry: Arc<dyn ModuleRegistry>, swap: Arc<dyn BufferSwap>) -> Self {
        Self {
            registry,
            swap,
            framebuffer: Arc::new(DeviceFramebufferOpener),
            clock: Arc::new(MonotonicClock),
        }
    }

    pub fn with_framebuffer(mut self, framebuffer: Arc<dyn FramebufferOpener>) -> Self {
        self.framebuffer = framebuffer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// The composer module
#[derive(Debug, Clone, Copy, Default)]
pub struct HwcModule;

impl HwcModule {
    pub fn info(&self) -> &'static ModuleInfo {
        &HAL_MODULE_INFO
    }

    /// Open the device called `name`
    ///
    /// Only [`HWC_HARDWARE_COMPOSER`] is served. A missing allocator or
    /// framebuffer leaves the device degraded unless
    /// [`HwcConfig::strict_dependencies`] is set.
    pub fn open(&self, name: &str, config: HwcConfig, deps: DeviceDeps) -> HwcResult<HwcDevice> {
        if name != HWC_HARDWARE_COMPOSER {
            log::warn!("Refusing to open unknown device '{}'", name);
            return Err(HwcError::NoSuchDevice(name.to_string()));
        }
        config.validate()?;

        let strict = config.strict_dependencies;

        let allocator = match deps.registry.allocator(GRALLOC_HARDWARE_MODULE_ID) {
            Ok(allocator) => {
                log::info!("Allocator vendor is '{}' ({})", allocator.name(), allocator.author());
                Some(allocator)
            }
            Err(e) if strict => return Err(e),
            Err(e) => {
                log::warn!("Could not get allocator, continuing degraded: {}", e);
                None
            }
        };

        let framebuffer = match allocator.as_ref().map(|a| a.open_framebuffer()) {
            Some(Ok(handle)) => Some(handle),
            Some(Err(e)) if strict => return Err(e),
            Some(Err(e)) => {
                log::warn!("Could not open allocator framebuffer, continuing degraded: {}", e);
                None
            }
            None => None,
        };
        log::debug!("Allocator framebuffer is {:?}", framebuffer);

        let surface = match deps.framebuffer.open(&config.framebuffer_path, config.framebuffer_map_len) {
            Ok(surface) => Some(surface),
            Err(e) if strict => return Err(e.into()),
            Err(e) => {
                log::warn!(
                    "Could not map {}, overlay placeholder disabled: {}",
                    config.framebuffer_path.display(),
                    e
                );
                None
            }
        };

        let device = HwcDevice {
            presenter: FramePresenter::new(config.overlay_fill_byte, config.overlay_fill_len),
            vsync: VsyncGenerator::new(config.vsync_period(), deps.clock),
            swap: deps.swap,
            surface: Mutex::new(surface),
            allocator,
            framebuffer,
            frames_presented: AtomicU64::new(0),
            config,
        };

        log::info!(
            "Opened {} (device API {}, degraded: {})",
            HWC_HARDWARE_COMPOSER,
            HWC_DEVICE_API_VERSION,
            device.is_degraded()
        );
        Ok(device)
    }
}

/// One open composer device
pub struct HwcDevice {
    config: HwcConfig,
    allocator: Option<Arc<dyn Allocator>>,
    framebuffer: Option<FramebufferHandle>,
    surface: Mutex<Option<Box<dyn DisplaySurface>>>,
    swap: Arc<dyn BufferSwap>,
    presenter: FramePresenter,
    vsync: VsyncGenerator,
    frames_presented: AtomicU64,
}

impl HwcDevice {
    pub fn config(&self) -> &HwcConfig {
        &self.config
    }

    pub fn api_version(&self) -> ApiVersion {
        HWC_DEVICE_API_VERSION
    }

    pub fn allocator_name(&self) -> Option<&str> {
        self.allocator.as_deref().map(|a| a.name())
    }

    pub fn has_framebuffer(&self) -> bool {
        self.framebuffer.is_some()
    }

    pub fn has_surface(&self) -> bool {
        self.surface.lock().is_some()
    }

    /// Any dependency missing
    pub fn is_degraded(&self) -> bool {
        self.allocator.is_none() || self.framebuffer.is_none() || !self.has_surface()
    }

    pub fn vsync(&self) -> &VsyncGenerator {
        &self.vsync
    }

    /// Frames successfully presented
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    /// Stop the vsync loop. Other entry points keep working.
    pub fn shutdown(&self) {
        self.vsync.shutdown();
    }

    /// Close the device, releasing the vsync loop and the framebuffer mapping
    pub fn close(self) -> HwcResult<()> {
        log::info!("Closing {} after {} frames", HWC_HARDWARE_COMPOSER, self.frames_presented());
        self.shutdown();
        drop(self);
        Ok(())
    }
}

impl Composer for HwcDevice {
    fn prepare(&self, displays: &mut [DisplayContents]) -> HwcResult<()> {
        log::trace!("prepare: {} displays", displays.len());
        classify::prepare(displays);
        Ok(())
    }

    fn set(&self, displays: &[DisplayContents]) -> HwcResult<PresentStats> {
        let Some(primary) = displays.first() else {
            log::warn!("set called without displays");
            return Ok(PresentStats::default());
        };

        let mut surface = self.surface.lock();
        let stats = self.presenter.present(self.swap.as_ref(), primary, surface.as_deref_mut())?;
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        Ok(stats)
    }

    fn event_control(&self, display: DisplayId, event: EventKind, enabled: bool) -> HwcResult<()> {
        log::debug!("event_control: display {:?}, {:?} -> {}", display, event, enabled);
        match event {
            EventKind::Vsync => self.vsync.set_enabled(enabled),
            EventKind::Other(code) => {
                log::debug!("Ignoring unsupported event {}", code);
                Ok(())
            }
        }
    }

    fn blank(&self, display: DisplayId, blank: bool) -> HwcResult<()> {
        log::debug!("blank: display {:?} -> {}", display, blank);
        Ok(())
    }

    fn query(&self, what: i32, _value: &mut i32) -> HwcResult<()> {
        log::debug!("query: {}", what);
        Ok(())
    }

    fn register_procs(&self, procs: &Arc<dyn HwcProcs>) {
        log::debug!("register_procs");
        self.vsync.state().register_procs(procs);
    }

    fn dump(&self, buffer: &mut [u8]) {
        log::debug!("dump requested ({} byte buffer)", buffer.len());
    }

    fn get_display_configs(
        &self,
        display: DisplayId,
        _configs: &mut [u32],
        _num_configs: &mut usize,
    ) -> HwcResult<()> {
        log::debug!("get_display_configs: display {:?}", display);
        Ok(())
    }

    fn get_display_attributes(
        &self,
        display: DisplayId,
        config: u32,
        _attributes: &[u32],
        _values: &mut [i32],
    ) -> HwcResult<()> {
        log::debug!("get_display_attributes: display {:?}, config {}", display, config);
        Ok(())
    }
}
