//! Configuration management for p2pshare.
//!
//! This module handles loading, saving, and validating p2pshare configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/p2pshare/config.toml` |
//! | macOS | `~/Library/Application Support/com.p2pshare.p2pshare/config.toml` |
//! | Windows | `%APPDATA%\p2pshare\p2pshare\config\config.toml` |
//!
//! Both peers must agree on the two ports; everything else is local.
//!
//! ## Example
//!
//! ```rust,ignore
//! use p2pshare_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Discovery port: {}", config.network.discovery_port);
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::MAX_FRAME_SIZE;

/// Main configuration struct for p2pshare.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub network: NetworkConfig,
    /// Discovery timing
    pub discovery: DiscoveryConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// UI settings
    pub ui: UiConfig,
}

/// Network configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Discovery port (UDP)
    pub discovery_port: u16,
    /// Transfer port (TCP)
    pub transfer_port: u16,
    /// Fixed probe destination; `None` derives broadcast addresses from
    /// the local interfaces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_address: Option<Ipv4Addr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: crate::DEFAULT_DISCOVERY_PORT,
            transfer_port: crate::DEFAULT_TRANSFER_PORT,
            broadcast_address: None,
        }
    }
}

/// Discovery timing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// How often probes are broadcast
    #[serde(with = "humantime_serde")]
    pub probe_interval: Duration,
    /// A peer not heard from for this long is dropped
    #[serde(with = "humantime_serde")]
    pub liveness_window: Duration,
    /// How often expired peers are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(1),
            liveness_window: Duration::from_secs(2),
            sweep_interval: Duration::from_millis(500),
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload bytes per data frame
    pub chunk_size: usize,
    /// Deadline for establishing a connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Deadline for each frame read or write
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
    /// Directory for received files (`None` = current directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(30),
            output_dir: None,
        }
    }
}

/// UI configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Theme (dark, light)
    pub theme: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.network.discovery_port == 0 {
            return Err(invalid("network.discovery_port", "must not be 0"));
        }
        if self.network.transfer_port == 0 {
            return Err(invalid("network.transfer_port", "must not be 0"));
        }
        if self.discovery.probe_interval.is_zero() {
            return Err(invalid("discovery.probe_interval", "must be positive"));
        }
        if self.discovery.sweep_interval.is_zero() {
            return Err(invalid("discovery.sweep_interval", "must be positive"));
        }
        if self.discovery.liveness_window < self.discovery.probe_interval {
            return Err(invalid(
                "discovery.liveness_window",
                "must be at least one probe interval",
            ));
        }
        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_FRAME_SIZE {
            return Err(invalid(
                "transfer.chunk_size",
                &format!("must be between 1 and {MAX_FRAME_SIZE}"),
            ));
        }
        if self.transfer.connect_timeout.is_zero() {
            return Err(invalid("transfer.connect_timeout", "must be positive"));
        }
        if self.transfer.io_timeout.is_zero() {
            return Err(invalid("transfer.io_timeout", "must be positive"));
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "p2pshare", "p2pshare")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration format '{s}'")))
    }
}

/// Parse a duration string like "500ms", "30s" or "2m".
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        None
    }
}
