//! NodeFlow lock coordination
//!
//! Named locks shared by every process pointed at the same lock directory:
//!
//! - [`FileMutex`]: exclusive access, optionally with a wait timeout
//! - [`ReadersWriterLock`]: shared readers or one exclusive writer, writers preferred
//!
//! Holders refresh their entries with a heartbeat. A holder that stops
//! refreshing leaves its lock held and waiters fail with [`LockError::Stale`];
//! locks are never taken over automatically. Guards do not release on drop:
//! call `release` after a critical section completes, or `abandon` to leave the
//! lock held on purpose.
//!
//! # Example
//!
//! ```no_run
//! use nodeflow_lock::{LockConfig, LockCoordinator};
//!
//! # async fn example() -> nodeflow_lock::Result<()> {
//! let locks = LockCoordinator::new("/var/lib/nodeflow/locks", LockConfig::default());
//!
//! let guard = locks.rw_lock("availability-set-web").acquire_read().await?;
//! // ... place a VM into the availability set ...
//! guard.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod mutex;
pub mod rwlock;
mod store;

pub use coordinator::{DeletionMark, LockConfig, LockCoordinator, LockEntry, LockKind};
pub use error::{LockError, Result};
pub use mutex::{FileMutex, MutexGuard};
pub use rwlock::{ReadGuard, ReadersWriterLock, RwLockState, RwLockStatus, WriteGuard};
pub use store::HolderInfo;
