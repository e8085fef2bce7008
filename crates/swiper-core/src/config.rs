//! Configuration system for Swiper.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SWIPER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/swiper/config.toml
//!   3. ~/.config/swiper/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rendezvous::MAX_INTERVAL;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwiperConfig {
    pub discovery: DiscoveryConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Rendezvous window length. Every participant must agree on it.
    pub interval_secs: u64,
    /// Capacity of a watcher's discovered-peer channel.
    pub peer_buffer: usize,
}

/// Settings for the `swiperd` local simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of loopback nodes, each announcing and watching.
    pub nodes: usize,
    pub resource: String,
    pub seed: String,
    /// How long to run before shutting down. 0 = until Ctrl-C.
    pub run_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            peer_buffer: 64,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            resource: "swiper-demo".to_string(),
            seed: "swiper-demo-seed".to_string(),
            run_secs: 5,
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Reject settings the scheduler or a watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("discovery.interval_secs must be > 0"));
        }
        if self.interval_secs > MAX_INTERVAL.as_secs() {
            return Err(ConfigError::Invalid(
                "discovery.interval_secs must be at most 366 days",
            ));
        }
        if self.peer_buffer == 0 {
            return Err(ConfigError::Invalid("discovery.peer_buffer must be > 0"));
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("swiper")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SwiperConfig {
    /// Load config: env vars → file → defaults. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            SwiperConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SWIPER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&SwiperConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery.validate()
    }

    /// Apply SWIPER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SWIPER_DISCOVERY__INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.discovery.interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SWIPER_DISCOVERY__PEER_BUFFER") {
            if let Ok(n) = v.parse() {
                self.discovery.peer_buffer = n;
            }
        }
        if let Ok(v) = std::env::var("SWIPER_SIMULATION__NODES") {
            if let Ok(n) = v.parse() {
                self.simulation.nodes = n;
            }
        }
    }
}
