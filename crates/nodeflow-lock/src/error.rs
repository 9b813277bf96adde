//! Lock coordinator error types

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    /// The holder stopped refreshing its entry. Whatever it was protecting is in
    /// an unknown state, so the lock is never taken over automatically.
    #[error(
        "Lock `{name}' is held by {holder}, which stopped refreshing it at {refreshed_at}; \
        the protected resource is in an unknown state and the lock must be cleared by an operator"
    )]
    Stale {
        name: String,
        holder: String,
        refreshed_at: DateTime<Utc>,
    },

    #[error("Timed out after {waited:?} waiting for lock `{name}'")]
    Timeout { name: String, waited: Duration },

    #[error("Lock `{name}' is not held by {holder}")]
    NotOwned { name: String, holder: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;
