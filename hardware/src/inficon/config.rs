//! Configuration for VGC controllers and the pressure logger.
//!
//! Both types load from JSON files. The poll configuration keeps the key
//! names of the logging configuration used with these controllers
//! (`device_host`, `device_port`, `log_channels`, ...).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use super::link::{VgcError, VgcResult, DEFAULT_PORT, DEFAULT_TIMEOUT};

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_interval_secs() -> u64 {
    10
}

/// Accepts `true`/`false` as well as the integer form `0`/`1`, where only
/// `1` enables the flag.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n == 1,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> VgcResult<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| VgcError::Config(format!("Cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| VgcError::Config(format!("Invalid config {}: {e}", path.display())))
}

/// Connection settings for one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Hostname or IP address of the controller
    pub host: String,
    /// TCP port (8000 unless reconfigured on the device)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Read/write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides the gauge count derived from the model name
    #[serde(default)]
    pub gauge_count: Option<u8>,
}

impl ControllerConfig {
    /// Config for `host` with default port and timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout_ms: default_timeout_ms(),
            gauge_count: None,
        }
    }

    /// Set the TCP port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set an explicit gauge count.
    pub fn with_gauge_count(mut self, count: u8) -> Self {
        self.gauge_count = Some(count);
        self
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load from a JSON file.
    pub fn load_from_file(path: &Path) -> VgcResult<Self> {
        let config: Self = read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> VgcResult<()> {
        if self.host.trim().is_empty() {
            return Err(VgcError::Config("host must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(VgcError::Config("timeout_ms must be non-zero".to_string()));
        }
        if let Some(count) = self.gauge_count {
            if count == 0 {
                return Err(VgcError::Config("gauge_count must be at least 1".to_string()));
            }
        }
        Ok(())
    }
}

/// Per-channel settings of the pressure logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Field name prefix for the logged value (the gauge index is appended)
    pub field: String,
    /// Unit label recorded with each sample
    pub units: String,
}

/// Settings of the periodic pressure logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Hostname or IP address of the controller
    pub device_host: String,
    /// TCP port of the controller
    #[serde(default = "default_port")]
    pub device_port: u16,
    /// Read/write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Seconds to wait between polling passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Channels to log, keyed by 1-based gauge index
    pub log_channels: BTreeMap<String, ChannelConfig>,
    /// Log every sample at info level (`true`/`false` or `1`/`0`)
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub verbose: bool,
    /// CSV output file for the samples; stdout when absent.
    ///
    /// Diagnostics always go through `tracing` to stderr, so a `logfile`
    /// key in older configs is ignored.
    #[serde(default)]
    pub csv_file: Option<PathBuf>,
}

impl PollConfig {
    /// Load from a JSON file and validate the channel keys.
    pub fn load_from_file(path: &Path) -> VgcResult<Self> {
        let config: Self = read_json(path)?;
        config.channels()?;
        config.controller().validate()?;
        Ok(config)
    }

    /// Connection settings derived from this logger configuration.
    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            host: self.device_host.clone(),
            port: self.device_port,
            timeout_ms: self.timeout_ms,
            gauge_count: None,
        }
    }

    /// Interval between polling passes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Configured channels with parsed gauge indices, in ascending order.
    pub fn channels(&self) -> VgcResult<Vec<(u8, &ChannelConfig)>> {
        if self.log_channels.is_empty() {
            return Err(VgcError::Config("log_channels must not be empty".to_string()));
        }

        let mut channels = self
            .log_channels
            .iter()
            .map(|(key, channel)| {
                let gauge: u8 = key
                    .trim()
                    .parse()
                    .ok()
                    .filter(|&g| g >= 1)
                    .ok_or_else(|| VgcError::Config(format!("Invalid gauge index: {key:?}")))?;
                Ok((gauge, channel))
            })
            .collect::<VgcResult<Vec<_>>>()?;
        channels.sort_by_key(|(gauge, _)| *gauge);
        Ok(channels)
    }
}
