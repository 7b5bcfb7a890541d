//! TOML configuration for a scan run.
//!
//! Every field has a compiled-in default matching the command-line defaults,
//! so a config file only needs the values it changes. Command-line flags are
//! applied on top of whatever is loaded here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::probes::ProbeSettings;
use crate::throughput::{SpeedSettings, DEFAULT_SPEED_URL};

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "EDGESCOUT_CONFIG";

pub const DEFAULT_LOCATIONS_URL: &str = "https://speed.bestip.one/locations";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub speed: SpeedConfig,
    #[serde(default)]
    pub locations: LocationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScanConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded scan configuration");
        Ok(config)
    }

    /// Resolve configuration from, in order:
    /// 1. `explicit` (an error here is fatal).
    /// 2. The file named by `EDGESCOUT_CONFIG` (falls through on error).
    /// 3. Compiled-in defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Reject settings that would stall or trivially fail the run.
    pub fn validate(&self) -> Result<()> {
        if self.probe.max_concurrency == 0 {
            bail!("max concurrency must be at least 1");
        }
        if self.probe.dial_timeout_ms == 0
            || self.probe.request_timeout_ms == 0
            || self.probe.total_deadline_ms == 0
            || self.speed.timeout_ms == 0
        {
            bail!("timeouts must be greater than zero");
        }
        if self.probe.trace_host.trim().is_empty() {
            bail!("trace host must not be empty");
        }
        if self.speed.workers > 0 && self.speed.url.trim().is_empty() {
            bail!("speed test URL must not be empty");
        }
        Ok(())
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            dial_timeout: Duration::from_millis(self.probe.dial_timeout_ms),
            request_timeout: Duration::from_millis(self.probe.request_timeout_ms),
            total_deadline: Duration::from_millis(self.probe.total_deadline_ms),
            tls: self.probe.tls,
            trace_host: self.probe.trace_host.clone(),
        }
    }

    pub fn speed_settings(&self) -> SpeedSettings {
        SpeedSettings {
            url: self.speed.url.clone(),
            dial_timeout: Duration::from_millis(self.probe.dial_timeout_ms),
            timeout: Duration::from_millis(self.speed.timeout_ms),
            ..SpeedSettings::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Input / output files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Candidate list, one `address port` per line.
    pub candidates: PathBuf,
    /// CSV export path.
    pub output: PathBuf,
    /// Expand `a.b.c.d/nn` addresses into every address of the block.
    pub expand_cidr: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            candidates: PathBuf::from("ip.txt"),
            output: PathBuf::from("ip.csv"),
            expand_cidr: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Probing (stage 1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub max_concurrency: usize,
    pub dial_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub total_deadline_ms: u64,
    pub tls: bool,
    pub trace_host: String,
    /// Raise the open-file soft limit before probing (Unix only).
    pub raise_nofile: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            dial_timeout_ms: 1000,
            request_timeout_ms: 1000,
            total_deadline_ms: 2500,
            tls: false,
            trace_host: "www.speedtest.net".to_string(),
            raise_nofile: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Speed test (stage 2)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Concurrent download workers; 0 disables the stage.
    pub workers: usize,
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            url: DEFAULT_SPEED_URL.to_string(),
            timeout_ms: 5000,
        }
    }
}

// ---------------------------------------------------------------------------
// Location table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    pub cache: PathBuf,
    pub url: String,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            cache: PathBuf::from("locations.json"),
            url: DEFAULT_LOCATIONS_URL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (`trace` .. `error`).
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
