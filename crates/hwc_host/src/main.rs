//! Headless host compositor
//!
//! Opens the composer device, enables vsync and submits one frame per
//! vsync event until Ctrl-C or `--frames N`:
//!
//! ```text
//! vsync loop ──► HostProcs ──► channel ──► main loop: prepare + set
//! ```
//!
//! Run with: cargo run -p hwc_host -- [CONFIG.toml] [--frames N]

mod args;
mod scene;

use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};

use hwc_composer::{
    Composer, DeviceDeps, DisplayId, EventKind, HeadlessAllocator, HeadlessSwap, HwcConfig, HwcDevice,
    HwcError, HwcModule, HwcProcs, HwcResult, StaticRegistry, HWC_HARDWARE_COMPOSER,
};

use crate::args::HostArgs;

/// Forwards vsync events to the main loop
struct HostProcs {
    vsync_tx: Sender<i64>,
}

impl HwcProcs for HostProcs {
    fn vsync(&self, display: DisplayId, timestamp_ns: i64) {
        // Never block the vsync loop; a busy host just skips a frame
        if self.vsync_tx.try_send(timestamp_ns).is_err() {
            log::trace!("Host busy, dropped vsync {} for {:?}", timestamp_ns, display);
        }
    }

    fn invalidate(&self) {
        log::debug!("Composer requested a redraw");
    }
}

#[derive(Debug, Default)]
struct HostStats {
    frames: u64,
    overlay_frames: u64,
    failed_frames: u64,
    first_vsync: Option<i64>,
    last_vsync: Option<i64>,
}

impl HostStats {
    fn average_period_us(&self) -> Option<f64> {
        match (self.first_vsync, self.last_vsync) {
            (Some(first), Some(last)) if self.frames > 1 => {
                Some((last - first) as f64 / (self.frames - 1) as f64 / 1_000.0)
            }
            _ => None,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match HostArgs::from_env() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: hwc-host [CONFIG.toml] [--frames N]");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        log::error!("hwc-host failed: {} (status {})", e, e.status());
        std::process::exit(1);
    }
}

fn load_config(args: &HostArgs) -> HwcResult<HwcConfig> {
    match &args.config_path {
        Some(path) => {
            let mut config = HwcConfig::load_from_file(path)?;
            config.apply_env_overrides();
            config.validate()?;
            log::info!("Loaded composer config from {}", path.display());
            Ok(config)
        }
        None => HwcConfig::load(),
    }
}

fn run(args: HostArgs) -> HwcResult<()> {
    let config = load_config(&args)?;

    let registry = StaticRegistry::with_allocator(Arc::new(HeadlessAllocator::default()));
    let deps = DeviceDeps::system(Arc::new(registry), Arc::new(HeadlessSwap));
    let device = HwcModule.open(HWC_HARDWARE_COMPOSER, config, deps)?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| HwcError::Config(format!("cannot install Ctrl-C handler: {}", e)))?;

    let (vsync_tx, vsync_rx) = crossbeam_channel::bounded::<i64>(2);
    let procs: Arc<dyn HwcProcs> = Arc::new(HostProcs { vsync_tx });
    device.register_procs(&procs);
    device.event_control(DisplayId::PRIMARY, EventKind::Vsync, true)?;

    let stats = drive(&device, &vsync_rx, &shutdown_rx, args.frames);

    device.event_control(DisplayId::PRIMARY, EventKind::Vsync, false)?;
    log::info!(
        "Presented {} frames ({} with overlay, {} failed), average vsync period {}",
        stats.frames,
        stats.overlay_frames,
        stats.failed_frames,
        stats
            .average_period_us()
            .map(|us| format!("{:.1}us", us))
            .unwrap_or_else(|| "n/a".to_string()),
    );

    device.close()
}

/// Submit one frame per vsync until shut down
fn drive(device: &HwcDevice, vsync_rx: &Receiver<i64>, shutdown_rx: &Receiver<()>, limit: Option<u64>) -> HostStats {
    let mut stats = HostStats::default();
    let mut displays = vec![scene::initial_frame()];

    loop {
        if limit.is_some_and(|limit| stats.frames >= limit) {
            break;
        }

        let next = select! {
            recv(vsync_rx) -> msg => msg.ok(),
            recv(shutdown_rx) -> _ => {
                log::info!("Shutdown requested");
                None
            }
        };
        let Some(timestamp) = next else {
            break;
        };

        stats.first_vsync.get_or_insert(timestamp);
        stats.last_vsync = Some(timestamp);

        if stats.frames > 0 {
            scene::advance(&mut displays[0], stats.frames);
        }

        if let Err(e) = device.prepare(&mut displays) {
            log::warn!("prepare failed: {}", e);
            continue;
        }

        match device.set(&displays) {
            Ok(present) => {
                if present.overlay_layers > 0 {
                    stats.overlay_frames += 1;
                }
            }
            Err(e) => {
                log::warn!("Frame {} not presented: {}", stats.frames, e);
                stats.failed_frames += 1;
            }
        }
        stats.frames += 1;
    }

    stats
}
