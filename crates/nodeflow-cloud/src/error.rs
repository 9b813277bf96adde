//! Cloud API error types

use thiserror::Error;

/// Terminal status reported by an asynchronous operation that failed while provisioning.
pub const PROVISIONING_STATE_FAILED: &str = "Failed";

/// Errors surfaced by a [`CloudClient`](crate::CloudClient) implementation
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A long-running operation was polled to a terminal, unsuccessful status.
    #[error("Asynchronous operation finished with status `{status}': {message}")]
    AsyncOperationFailed { status: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether this error means the VM reached the `Failed` provisioning state.
    ///
    /// Only this class of failure is worth retrying: the request was accepted and
    /// the platform gave up while provisioning.
    pub fn is_provisioning_failure(&self) -> bool {
        matches!(
            self,
            CloudError::AsyncOperationFailed { status, .. } if status == PROVISIONING_STATE_FAILED
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_) | CloudError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
