//! Composer configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `HWC_FB_DEVICE`, `HWC_FB_MAP_LEN`,
//!    `HWC_VSYNC_PERIOD_US`, `HWC_STRICT_DEPS`
//! 2. Config file: `/etc/hwcomposer/hwc.toml`, then `hwc.toml`
//! 3. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! framebuffer_path = "/dev/graphics/fb0"
//! framebuffer_map_len = 3072000
//! overlay_fill_byte = 128
//! overlay_fill_len = 2000
//! vsync_period_us = 16666
//! strict_dependencies = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HwcError, HwcResult};

/// Default framebuffer device node
pub const DEFAULT_FRAMEBUFFER_PATH: &str = "/dev/graphics/fb0";

/// 800x480, 32bpp, double buffered
pub const DEFAULT_FRAMEBUFFER_MAP_LEN: usize = 800 * 480 * 4 * 2;

/// ~60 Hz
pub const DEFAULT_VSYNC_PERIOD_US: u64 = 16_666;

const CONFIG_SEARCH_PATHS: &[&str] = &["/etc/hwcomposer/hwc.toml", "hwc.toml"];

/// Composer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwcConfig {
    /// Framebuffer device node opened read-write at device open
    pub framebuffer_path: PathBuf,
    /// Bytes of the framebuffer mapped into the device context
    pub framebuffer_map_len: usize,
    /// Byte written by the overlay placeholder
    pub overlay_fill_byte: u8,
    /// Length of the prefix the overlay placeholder fills
    pub overlay_fill_len: usize,
    /// Vsync loop period in microseconds
    pub vsync_period_us: u64,
    /// Fail `open` when the allocator or framebuffer cannot be acquired
    pub strict_dependencies: bool,
}

impl Default for HwcConfig {
    fn default() -> Self {
        Self {
            framebuffer_path: PathBuf::from(DEFAULT_FRAMEBUFFER_PATH),
            framebuffer_map_len: DEFAULT_FRAMEBUFFER_MAP_LEN,
            overlay_fill_byte: 0x80,
            overlay_fill_len: 2000,
            vsync_period_us: DEFAULT_VSYNC_PERIOD_US,
            strict_dependencies: false,
        }
    }
}

impl HwcConfig {
    /// Load configuration from the first config file found, then apply
    /// environment overrides
    pub fn load() -> HwcResult<Self> {
        let mut config = Self::default();

        for path in CONFIG_SEARCH_PATHS {
            if Path::new(path).exists() {
                config = Self::load_from_file(path)?;
                log::info!("Loaded composer config from {}", path);
                break;
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> HwcResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| HwcError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> HwcResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| HwcError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HWC_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("HWC_FB_DEVICE").filter(|p| !p.is_empty()) {
            self.framebuffer_path = PathBuf::from(path);
            log::info!("Framebuffer device from env: {}", self.framebuffer_path.display());
        }

        if let Some(len) = lookup("HWC_FB_MAP_LEN").and_then(|v| v.parse().ok()) {
            self.framebuffer_map_len = len;
        }

        if let Some(period) = lookup("HWC_VSYNC_PERIOD_US").and_then(|v| v.parse().ok()) {
            self.vsync_period_us = period;
            log::info!("Vsync period from env: {}us", period);
        }

        if let Some(strict) = lookup("HWC_STRICT_DEPS") {
            self.strict_dependencies = strict == "1" || strict.eq_ignore_ascii_case("true");
        }
    }

    /// Reject configurations the device cannot run with
    pub fn validate(&self) -> HwcResult<()> {
        if self.framebuffer_map_len == 0 {
            return Err(HwcError::Config("framebuffer_map_len must be non-zero".into()));
        }
        if self.vsync_period_us == 0 {
            return Err(HwcError::Config("vsync_period_us must be non-zero".into()));
        }
        if self.overlay_fill_len > self.framebuffer_map_len {
            return Err(HwcError::Config(format!(
                "overlay_fill_len ({}) exceeds framebuffer_map_len ({})",
                self.overlay_fill_len, self.framebuffer_map_len
            )));
        }
        Ok(())
    }

    /// Vsync loop period
    pub fn vsync_period(&self) -> Duration {
        Duration::from_micros(self.vsync_period_us)
    }
}
