//! Command line handling
//!
//! ```text
//! hwc-host [CONFIG.toml] [--frames N]
//! ```

use std::path::PathBuf;

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostArgs {
    /// Config file to load instead of the default search path
    pub config_path: Option<PathBuf>,
    /// Stop after this many presented frames
    pub frames: Option<u64>,
}

impl HostArgs {
    pub fn from_env() -> Result<Self, String> {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().ok_or("--frames needs a value")?;
                    let frames = value
                        .parse()
                        .map_err(|_| format!("invalid frame count: {}", value))?;
                    parsed.frames = Some(frames);
                }
                flag if flag.starts_with("--") => return Err(format!("unknown flag: {}", flag)),
                path if parsed.config_path.is_none() => parsed.config_path = Some(PathBuf::from(path)),
                extra => return Err(format!("unexpected argument: {}", extra)),
            }
        }

        Ok(parsed)
    }
}
