//! Process-level cloud properties

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PIP_IDLE_TIMEOUT_IN_MINUTES: u32 = 4;
pub const PIP_IDLE_TIMEOUT_RANGE: std::ops::RangeInclusive<u32> = 4..=30;

/// Settings shared by every VM managed by one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudProperties {
    /// Default resource group; also searched for security groups
    pub resource_group_name: String,

    #[serde(default)]
    pub use_managed_disks: bool,

    pub ssh_user: String,

    pub ssh_public_key: String,

    #[serde(default)]
    pub default_security_group: Option<String>,

    #[serde(default = "default_pip_idle_timeout")]
    pub pip_idle_timeout_in_minutes: u32,

    /// Enables boot diagnostics
    #[serde(default)]
    pub debug_mode: bool,

    /// Settings endpoint handed to the guest agent
    pub registry_endpoint: String,

    #[serde(default)]
    pub lock: LockSettings,
}

fn default_pip_idle_timeout() -> u32 {
    DEFAULT_PIP_IDLE_TIMEOUT_IN_MINUTES
}

impl CloudProperties {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let properties: CloudProperties = serde_yaml::from_str(content)?;
        properties.validate()?;
        Ok(properties)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resource_group_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "resource_group_name must not be empty".to_string(),
            ));
        }
        if !PIP_IDLE_TIMEOUT_RANGE.contains(&self.pip_idle_timeout_in_minutes) {
            return Err(ConfigError::Invalid(format!(
                "pip_idle_timeout_in_minutes must be between {} and {}, got {}",
                PIP_IDLE_TIMEOUT_RANGE.start(),
                PIP_IDLE_TIMEOUT_RANGE.end(),
                self.pip_idle_timeout_in_minutes
            )));
        }
        self.lock.validate()
    }
}

/// Where and how the lock coordinator keeps its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for waiting on an application gateway backend pool lock
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
}

fn default_expiry_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_gateway_timeout_secs() -> u64 {
    300
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            dir: None,
            expiry_secs: default_expiry_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl LockSettings {
    /// Lock directory, `<temp-dir>/nodeflow-locks` when not configured
    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("nodeflow-locks"))
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.expiry_secs == 0 {
            return Err(ConfigError::Invalid(
                "lock.expiry_secs must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "lock.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(dir) = &self.dir
            && dir == Path::new("")
        {
            return Err(ConfigError::Invalid("lock.dir must not be empty".to_string()));
        }
        Ok(())
    }
}
