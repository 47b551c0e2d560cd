//! End-to-end tests for the composer device
//!
//! These drive the device only through the `Composer` entry points, the way
//! a host compositor would.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use hwc_composer::*;

/// Swap whose result the test controls
#[derive(Default)]
struct ScriptedSwap {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl BufferSwap for ScriptedSwap {
    fn swap_buffers(&self, _display: DisplayHandle, _surface: SurfaceHandle) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        !self.fail.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct VsyncRecorder {
    events: Mutex<Vec<(DisplayId, i64)>>,
}

impl VsyncRecorder {
    fn count(&self) -> usize {
        self.events.lock().len()
    }

    fn timestamps(&self) -> Vec<i64> {
        self.events.lock().iter().map(|(_, ts)| *ts).collect()
    }
}

impl HwcProcs for VsyncRecorder {
    fn vsync(&self, display: DisplayId, timestamp_ns: i64) {
        self.events.lock().push((display, timestamp_ns));
    }
}

/// Allocator that can refuse to open its framebuffer
struct FlakyAllocator {
    framebuffer_ok: bool,
}

impl Allocator for FlakyAllocator {
    fn name(&self) -> &str {
        "flaky"
    }

    fn open_framebuffer(&self) -> HwcResult<FramebufferHandle> {
        if self.framebuffer_ok {
            Ok(FramebufferHandle(7))
        } else {
            Err(HwcError::Dependency("framebuffer busy".into()))
        }
    }
}

/// Surface that records when it is released
struct TrackedSurface {
    inner: MemorySurface,
    released: Arc<AtomicBool>,
}

impl DisplaySurface for TrackedSurface {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn fill_prefix(&mut self, byte: u8, len: usize) -> usize {
        self.inner.fill_prefix(byte, len)
    }
}

impl Drop for TrackedSurface {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct TrackedOpener {
    released: Arc<AtomicBool>,
}

impl FramebufferOpener for TrackedOpener {
    fn open(&self, _path: &Path, len: usize) -> io::Result<Box<dyn DisplaySurface>> {
        Ok(Box::new(TrackedSurface {
            inner: MemorySurface::new(len),
            released: Arc::clone(&self.released),
        }))
    }
}

struct MissingNode;

impl FramebufferOpener for MissingNode {
    fn open(&self, path: &Path, _len: usize) -> io::Result<Box<dyn DisplaySurface>> {
        Err(io::Error::new(io::ErrorKind::NotFound, format!("{} missing", path.display())))
    }
}

struct Harness {
    device: HwcDevice,
    swap: Arc<ScriptedSwap>,
    surface: MemorySurface,
}

fn test_config() -> HwcConfig {
    HwcConfig {
        framebuffer_map_len: 8192,
        vsync_period_us: 2_000,
        ..Default::default()
    }
}

fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let swap = Arc::new(ScriptedSwap::default());
    let surface = MemorySurface::new(8192);
    let registry = StaticRegistry::with_allocator(Arc::new(HeadlessAllocator::default()));

    let deps = DeviceDeps::system(Arc::new(registry), swap.clone())
        .with_framebuffer(Arc::new(MemoryFramebufferOpener::new(surface.clone())));
    let device = HwcModule
        .open(HWC_HARDWARE_COMPOSER, test_config(), deps)
        .expect("open composer");

    Harness { device, swap, surface }
}

fn three_layer_frame(first: Blending) -> DisplayContents {
    let full = Rect::new(0, 0, 800, 480);
    let mut contents = DisplayContents::new(DisplayHandle(1), SurfaceHandle(1)).with_layers(vec![
        Layer::new(BufferHandle(0x10), first, full),
        Layer::new(BufferHandle(0x20), Blending::Alpha, Rect::new(0, 0, 800, 40)),
        Layer::new(BufferHandle(0x30), Blending::None, Rect::new(100, 100, 300, 200)),
    ]);
    contents.set_geometry_changed(true);
    contents
}

fn dispositions(contents: &DisplayContents) -> Vec<CompositionType> {
    contents.layers.iter().map(|l| l.composition_type).collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn end_to_end_opaque_first_layer_frame() {
    let h = harness();
    let mut displays = vec![three_layer_frame(Blending::None)];

    h.device.prepare(&mut displays).unwrap();
    assert_eq!(
        dispositions(&displays[0]),
        vec![CompositionType::Overlay, CompositionType::Gpu, CompositionType::Gpu]
    );

    let stats = h.device.set(&displays).unwrap();
    assert_eq!(stats, PresentStats { overlay_layers: 1, bytes_written: 2000 });
    assert_eq!(h.swap.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.surface.fill_count(), 1);

    let bytes = h.surface.snapshot();
    assert!(bytes[..2000].iter().all(|&b| b == 0x80));
    assert!(bytes[2000..].iter().all(|&b| b == 0));
    assert_eq!(h.device.frames_presented(), 1);
}

#[test]
fn blended_first_layer_uses_gpu_only() {
    let h = harness();
    let mut displays = vec![three_layer_frame(Blending::Alpha)];

    h.device.prepare(&mut displays).unwrap();
    assert_eq!(dispositions(&displays[0]), vec![CompositionType::Gpu; 3]);

    h.device.set(&displays).unwrap();
    assert_eq!(h.surface.fill_count(), 0);
}

#[test]
fn unchanged_geometry_keeps_previous_dispositions() {
    let h = harness();
    let mut displays = vec![three_layer_frame(Blending::None)];
    h.device.prepare(&mut displays).unwrap();

    displays[0].set_geometry_changed(false);
    displays[0].layers[0].blending = Blending::Alpha;
    let before = displays.clone();

    for _ in 0..3 {
        h.device.prepare(&mut displays).unwrap();
        assert_eq!(displays, before);
    }
}

#[test]
fn failed_swap_propagates_and_skips_overlay() {
    let h = harness();
    let mut displays = vec![three_layer_frame(Blending::None)];
    h.device.prepare(&mut displays).unwrap();

    h.swap.fail.store(true, Ordering::SeqCst);
    let err = h.device.set(&displays).unwrap_err();

    assert!(matches!(err, HwcError::Presentation));
    assert_eq!(err.status(), hwc_composer::error::HWC_EGL_ERROR);
    assert_eq!(h.surface.fill_count(), 0);
    assert_eq!(h.device.frames_presented(), 0);

    // No retry inside the device; the next frame works again
    h.swap.fail.store(false, Ordering::SeqCst);
    assert!(h.device.set(&displays).is_ok());
    assert_eq!(h.swap.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn vsync_timestamps_strictly_increase() {
    let h = harness();
    let recorder = Arc::new(VsyncRecorder::default());
    let procs: Arc<dyn HwcProcs> = recorder.clone();
    h.device.register_procs(&procs);

    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true).unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.count() >= 10));
    h.device.shutdown();

    let stamps = recorder.timestamps();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert!(recorder.events.lock().iter().all(|(d, _)| *d == DisplayId::PRIMARY));
}

#[test]
fn vsync_gating_keeps_loop_alive() {
    let h = harness();
    let recorder = Arc::new(VsyncRecorder::default());
    let procs: Arc<dyn HwcProcs> = recorder.clone();
    h.device.register_procs(&procs);

    // A disable request starts the loop but delivers nothing
    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, false).unwrap();
    assert!(h.device.vsync().is_running());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.count(), 0);

    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true).unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.count() >= 1));

    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, false).unwrap();
    // One tick may already be past the flag check
    thread::sleep(Duration::from_millis(10));
    let frozen = recorder.count();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.count(), frozen);

    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true).unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.count() > frozen));

    assert!(h.device.vsync().is_running());
    assert_eq!(h.device.vsync().loops_started(), 1);
}

#[test]
fn many_toggles_start_one_loop() {
    let h = harness();
    for i in 0..200 {
        h.device
            .event_control(DisplayId::PRIMARY, EventKind::Vsync, i % 3 != 0)
            .unwrap();
    }
    assert_eq!(h.device.vsync().loops_started(), 1);
}

#[test]
fn vsync_before_registration_is_harmless() {
    let h = harness();
    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(h.device.vsync().state().delivered(), 0);

    let recorder = Arc::new(VsyncRecorder::default());
    let procs: Arc<dyn HwcProcs> = recorder.clone();
    h.device.register_procs(&procs);
    assert!(wait_until(Duration::from_secs(2), || recorder.count() >= 1));
}

#[test]
fn vsync_and_presentation_are_independent() {
    let h = harness();
    let recorder = Arc::new(VsyncRecorder::default());
    let procs: Arc<dyn HwcProcs> = recorder.clone();
    h.device.register_procs(&procs);
    h.device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true).unwrap();

    let mut displays = vec![three_layer_frame(Blending::None)];
    h.device.prepare(&mut displays).unwrap();
    for _ in 0..20 {
        h.device.set(&displays).unwrap();
    }

    assert_eq!(h.device.frames_presented(), 20);
    assert!(wait_until(Duration::from_secs(2), || recorder.count() >= 3));
}

#[test]
fn missing_dependencies_open_degraded() {
    let deps = DeviceDeps::system(Arc::new(StaticRegistry::empty()), Arc::new(HeadlessSwap))
        .with_framebuffer(Arc::new(MissingNode));
    let device = HwcModule
        .open(HWC_HARDWARE_COMPOSER, test_config(), deps)
        .expect("degraded open still succeeds");

    assert!(device.is_degraded());
    assert_eq!(device.allocator_name(), None);
    assert!(!device.has_framebuffer());
    assert!(!device.has_surface());

    // Presentation still works, the overlay placeholder is skipped
    let mut displays = vec![three_layer_frame(Blending::None)];
    device.prepare(&mut displays).unwrap();
    let stats = device.set(&displays).unwrap();
    assert_eq!(stats, PresentStats { overlay_layers: 1, bytes_written: 0 });
}

#[test]
fn allocator_without_framebuffer_opens_degraded() {
    let registry = StaticRegistry::with_allocator(Arc::new(FlakyAllocator { framebuffer_ok: false }));
    let deps = DeviceDeps::system(Arc::new(registry), Arc::new(HeadlessSwap))
        .with_framebuffer(Arc::new(MemoryFramebufferOpener::new(MemorySurface::new(8192))));
    let device = HwcModule.open(HWC_HARDWARE_COMPOSER, test_config(), deps).unwrap();

    assert_eq!(device.allocator_name(), Some("flaky"));
    assert!(!device.has_framebuffer());
    assert!(device.has_surface());
    assert!(device.is_degraded());
}

#[test]
fn strict_dependencies_fail_open() {
    let strict = HwcConfig {
        strict_dependencies: true,
        ..test_config()
    };

    let deps = DeviceDeps::system(Arc::new(StaticRegistry::empty()), Arc::new(HeadlessSwap));
    let result = HwcModule.open(HWC_HARDWARE_COMPOSER, strict.clone(), deps);
    assert!(matches!(result, Err(HwcError::Dependency(_))));

    let registry = StaticRegistry::with_allocator(Arc::new(FlakyAllocator { framebuffer_ok: true }));
    let deps = DeviceDeps::system(Arc::new(registry), Arc::new(HeadlessSwap)).with_framebuffer(Arc::new(MissingNode));
    match HwcModule.open(HWC_HARDWARE_COMPOSER, strict, deps) {
        Err(HwcError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
        _ => panic!("expected framebuffer I/O error"),
    }
}

#[test]
fn wrong_device_name_creates_nothing() {
    let released = Arc::new(AtomicBool::new(false));
    let deps = DeviceDeps::system(Arc::new(StaticRegistry::empty()), Arc::new(HeadlessSwap))
        .with_framebuffer(Arc::new(TrackedOpener { released: released.clone() }));

    let result = HwcModule.open("display", test_config(), deps);
    assert!(matches!(result, Err(HwcError::NoSuchDevice(ref name)) if name == "display"));
    assert!(!released.load(Ordering::SeqCst));
}

#[test]
fn close_releases_surface_and_stops_vsync() {
    let released = Arc::new(AtomicBool::new(false));
    let registry = StaticRegistry::with_allocator(Arc::new(HeadlessAllocator::default()));
    let deps = DeviceDeps::system(Arc::new(registry), Arc::new(HeadlessSwap))
        .with_framebuffer(Arc::new(TrackedOpener { released: released.clone() }));
    let device = HwcModule.open(HWC_HARDWARE_COMPOSER, test_config(), deps).unwrap();

    let recorder = Arc::new(VsyncRecorder::default());
    let procs: Arc<dyn HwcProcs> = recorder.clone();
    device.register_procs(&procs);
    device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true).unwrap();
    assert!(wait_until(Duration::from_secs(2), || recorder.count() >= 1));

    assert!(device.close().is_ok());
    assert!(released.load(Ordering::SeqCst));

    let after_close = recorder.count();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(recorder.count(), after_close);
}

#[test]
fn composer_is_usable_as_trait_object() {
    let h = harness();
    let composer: &dyn Composer = &h.device;

    let mut displays = vec![three_layer_frame(Blending::None)];
    composer.prepare(&mut displays).unwrap();
    assert!(composer.set(&displays).is_ok());
    assert!(composer.blank(DisplayId::PRIMARY, false).is_ok());
}
