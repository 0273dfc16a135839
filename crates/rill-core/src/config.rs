//! Configuration system for rill.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RILL_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/rill/config.toml
//!   3. ~/.config/rill/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RillConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Protocol id announced when opening streams.
    pub protocol_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Deadline for each blocking stream operation (open, read, write+flush),
    /// in milliseconds.
    pub io_timeout_ms: u64,
    /// Maximum encoded datagram body accepted from a peer, in bytes.
    pub max_datagram_bytes: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for RillConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            protocol_id: wire::PROTOCOL_ID.to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: 5_000,
            max_datagram_bytes: wire::MAX_DATAGRAM,
        }
    }
}

// ── Path helpers ─────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("rill")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ───────────────────────────────────────────────────────────────────

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
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl RillConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RillConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RILL_CONFIG")
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
            let text = toml::to_string_pretty(&RillConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply RILL_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RILL_NETWORK__PROTOCOL_ID") {
            self.network.protocol_id = v;
        }
        if let Ok(v) = std::env::var("RILL_PROTOCOL__IO_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.protocol.io_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("RILL_PROTOCOL__MAX_DATAGRAM_BYTES") {
            if let Ok(bytes) = v.parse() {
                self.protocol.max_datagram_bytes = bytes;
            }
        }
    }

    /// The io timeout as a [`std::time::Duration`].
    pub fn io_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.protocol.io_timeout_ms)
    }
}
