// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harvest configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// What to do when an endpoint cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPolicy {
    /// Abort the whole harvest on the first connect failure.
    #[default]
    FailFast,
    /// Log the failure, drop the endpoint and keep going.
    SkipUnreachable,
}

/// Harvest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Local port to bind outgoing connections to (0 = ephemeral)
    #[serde(default)]
    pub local_port: u16,

    /// Per-endpoint connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Idle window in milliseconds; the harvest ends when no message
    /// arrives for this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Trace every frame sent and received
    #[serde(default)]
    pub log_data: bool,

    /// Connect failure handling
    #[serde(default)]
    pub connect_policy: ConnectPolicy,

    /// Maximum frame size (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Colorize summary lines
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_connect_timeout() -> u64 {
    2_000
}

fn default_idle_timeout() -> u64 {
    3_000
}

fn default_max_frame_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_true() -> bool {
    true
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            local_port: 0,
            connect_timeout_ms: default_connect_timeout(),
            idle_timeout_ms: default_idle_timeout(),
            log_data: false,
            connect_policy: ConnectPolicy::default(),
            max_frame_size: default_max_frame_size(),
            color: true,
        }
    }
}

impl HarvestConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "connect_timeout_ms cannot be 0".into(),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "idle_timeout_ms cannot be 0".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_frame_size cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
