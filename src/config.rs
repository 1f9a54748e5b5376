//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/maxigauge.toml`, optional)
//! 2. environment variables prefixed with `MAXIGAUGE_`, sections separated by
//!    a double underscore (`MAXIGAUGE_CONNECTION__RESOURCE=/dev/ttyUSB1`)
//!
//! Every field has a default, so an empty or missing file yields a usable
//! configuration.
//!
//! # Example
//! ```no_run
//! use maxigauge::config::GaugeConfig;
//!
//! let config = GaugeConfig::load()?;
//! println!("Instrument at {}", config.connection.resource);
//! # Ok::<(), figment::Error>(())
//! ```

use crate::sampler::SamplerConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/maxigauge.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaugeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial connection to the controller
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Continuous sampling and the averaged log
    #[serde(default)]
    pub sampling: SamplerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// How to reach the instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port name (e.g. "/dev/ttyUSB0", "COM3")
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Baud rate; the controller ships at 9600
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Upper bound on opening the port
    #[serde(default = "default_open_timeout", with = "humantime_serde")]
    pub open_timeout: Duration,
    /// Optional bound on a single line read (none by default)
    #[serde(default, with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
    /// How long stale input is drained before each command (0 = only what is
    /// already buffered)
    #[serde(default, with = "humantime_serde")]
    pub drain_window: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            baud_rate: default_baud_rate(),
            open_timeout: default_open_timeout(),
            read_timeout: None,
            drain_window: Duration::ZERO,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_resource() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_open_timeout() -> Duration {
    Duration::from_millis(200)
}

impl GaugeConfig {
    /// Load configuration from `config/maxigauge.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and the environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The provider stack behind [`GaugeConfig::load_from`], for callers that
    /// want to merge further overrides.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MAXIGAUGE_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.connection.resource.trim().is_empty() {
            return Err("connection.resource must name a serial port".to_string());
        }

        if self.connection.baud_rate == 0 {
            return Err("connection.baud_rate must be greater than zero".to_string());
        }

        if self.sampling.interval.is_zero() {
            return Err("sampling.interval must be greater than zero".to_string());
        }

        Ok(())
    }
}
