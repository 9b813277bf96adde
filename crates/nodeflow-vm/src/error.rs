//! VM lifecycle error types

use nodeflow_cloud::CloudError;
use nodeflow_config::ConfigError;
use nodeflow_lock::LockError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmError {
    /// Missing or invalid property; never retried
    #[error("{0}")]
    Configuration(String),

    /// A referenced resource does not exist; never retried
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid identifier `{0}'")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Failed to {action} the availability set `{name}' in the resource group `{resource_group}': {source}")]
    AvailabilitySet {
        action: &'static str,
        name: String,
        resource_group: String,
        #[source]
        source: Box<VmError>,
    },

    /// Rolling back after `source` failed too
    #[error("{source}\ncleanup failed: {cleanup}")]
    Cleanup {
        #[source]
        source: Box<VmError>,
        cleanup: Box<VmError>,
    },

    /// Final error of a failed create
    #[error("{message}")]
    CreationFailed {
        resource_group: String,
        vm_name: String,
        /// Resources deliberately kept for investigation
        left_behind: Vec<String>,
        message: String,
        #[source]
        cause: Box<VmError>,
    },
}

impl From<ConfigError> for VmError {
    fn from(e: ConfigError) -> Self {
        VmError::Configuration(e.to_string())
    }
}

impl VmError {
    /// Whether the VM reached the `Failed` provisioning state
    pub fn is_provisioning_failure(&self) -> bool {
        matches!(self, VmError::Cloud(e) if e.is_provisioning_failure())
    }

    /// Whether a lock could not be acquired or is in an unknown state
    pub fn is_lock_error(&self) -> bool {
        match self {
            VmError::Lock(_) => true,
            VmError::AvailabilitySet { source, .. } => source.is_lock_error(),
            _ => false,
        }
    }

    /// Name of the lock involved, if this is a lock error
    pub fn lock_name(&self) -> Option<&str> {
        match self {
            VmError::Lock(
                LockError::Stale { name, .. }
                | LockError::Timeout { name, .. }
                | LockError::NotOwned { name, .. },
            ) => Some(name),
            VmError::AvailabilitySet { source, .. } => source.lock_name(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VmError>;
