//! Vsync signal generation
//!
//! A software stand-in for the display's refresh interrupt. The first
//! event-control request starts one background loop per device; after that,
//! enable and disable only flip a flag the loop checks on each tick:
//!
//! ```text
//! event_control(enable) ──► enabled flag ◄── loop: wait period
//!                                              sample CLOCK_MONOTONIC
//!                                              if enabled: procs.vsync(PRIMARY, ts)
//! ```
//!
//! Disabling never stops the loop, so re-enabling resumes within one
//! period. The loop ends only on [`VsyncGenerator::shutdown`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{HwcError, HwcResult};
use crate::layer::DisplayId;
use crate::procs::HwcProcs;

/// Nanosecond monotonic time source
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> i64;
}

/// `CLOCK_MONOTONIC`
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[cfg(unix)]
    fn now_ns(&self) -> i64 {
        use nix::time::{clock_gettime, ClockId};

        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => ts.tv_sec() as i64 * 1_000_000_000 + ts.tv_nsec() as i64,
            Err(e) => {
                log::error!("clock_gettime(CLOCK_MONOTONIC) failed: {}", e);
                0
            }
        }
    }

    #[cfg(not(unix))]
    fn now_ns(&self) -> i64 {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as i64
    }
}

/// State shared between the foreground and the vsync loop
pub struct VsyncState {
    enabled: AtomicBool,
    procs: RwLock<Option<Weak<dyn HwcProcs>>>,
    delivered: AtomicU64,
}

impl VsyncState {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            procs: RwLock::new(None),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Point delivery at a new callback table
    pub fn register_procs(&self, procs: &Arc<dyn HwcProcs>) {
        *self.procs.write() = Some(Arc::downgrade(procs));
    }

    /// Current callback table, if registered and still alive
    pub fn procs(&self) -> Option<Arc<dyn HwcProcs>> {
        self.procs.read().as_ref().and_then(Weak::upgrade)
    }

    /// Vsync events handed to the host so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Hand one event to the host. A missing callback table is not an error.
    fn deliver(&self, display: DisplayId, timestamp_ns: i64) -> bool {
        match self.procs() {
            Some(procs) => {
                log::trace!("vsync to host: display {:?} at {}", display, timestamp_ns);
                procs.vsync(display, timestamp_ns);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                log::trace!("vsync at {} dropped, no callbacks registered", timestamp_ns);
                false
            }
        }
    }
}

impl Default for VsyncState {
    fn default() -> Self {
        Self::new()
    }
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the vsync loop of one device
pub struct VsyncGenerator {
    period: Duration,
    clock: Arc<dyn Clock>,
    state: Arc<VsyncState>,
    started: AtomicBool,
    loops_started: AtomicUsize,
    worker: Mutex<Option<Worker>>,
}

impl VsyncGenerator {
    pub fn new(period: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            period,
            clock,
            state: Arc::new(VsyncState::new()),
            started: AtomicBool::new(false),
            loops_started: AtomicUsize::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Shared state handle
    pub fn state(&self) -> &Arc<VsyncState> {
        &self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Whether the loop has ever been started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the loop is currently running
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// How many loops this generator has spawned (0 or 1)
    pub fn loops_started(&self) -> usize {
        self.loops_started.load(Ordering::Relaxed)
    }

    /// Turn delivery on or off. Starts the loop on the first request.
    pub fn set_enabled(&self, enabled: bool) -> HwcResult<()> {
        self.state.set_enabled(enabled);
        log::debug!("vsync {}", if enabled { "enabled" } else { "disabled" });

        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Err(e) = self.spawn() {
                self.started.store(false, Ordering::Release);
                return Err(e);
            }
        }
        Ok(())
    }

    fn spawn(&self) -> HwcResult<()> {
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let period = self.period;

        let handle = thread::Builder::new()
            .name("hwc-vsync".to_string())
            .spawn(move || Self::vsync_loop(state, clock, period, shutdown_rx))
            .map_err(|e| HwcError::VsyncThread(e.to_string()))?;

        *self.worker.lock() = Some(Worker { shutdown, handle });
        self.loops_started.fetch_add(1, Ordering::Relaxed);
        log::info!("Vsync loop started ({:?} period)", period);
        Ok(())
    }

    /// Stop the loop and wait for it to exit. The loop is never restarted.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        // Closing the channel wakes the loop out of its wait
        drop(worker.shutdown);

        if worker.handle.thread().id() == thread::current().id() {
            log::warn!("Vsync loop shut down from its own callback, not joining");
            return;
        }
        if worker.handle.join().is_err() {
            log::error!("Vsync loop panicked");
        }
        log::info!("Vsync loop stopped after {} events", self.state.delivered());
    }

    fn vsync_loop(state: Arc<VsyncState>, clock: Arc<dyn Clock>, period: Duration, shutdown: Receiver<()>) {
        let mut last: Option<i64> = None;

        loop {
            match shutdown.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            // Timestamps handed to the host must strictly increase
            let now = clock.now_ns();
            let timestamp = match last {
                Some(prev) if now <= prev => prev + 1,
                _ => now,
            };
            last = Some(timestamp);

            if state.is_enabled() {
                state.deliver(DisplayId::PRIMARY, timestamp);
            }
        }
    }
}

impl Drop for VsyncGenerator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
