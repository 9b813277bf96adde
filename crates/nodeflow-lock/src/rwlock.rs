//! Durable readers/writer lock
//!
//! Provides shared read access or exclusive write access with:
//! - Multiple concurrent readers OR a single exclusive writer
//! - Writer preference: a live waiting writer blocks new readers
//! - Heartbeat-based liveness: stale readers are purged, a stale writer is
//!   reported and never taken over
//!
//! ## Lock State
//!
//! The state is stored as JSON in `<name>.rwlock` and only ever rewritten while
//! holding the short-lived `<name>.rwlock.guard` file:
//! ```json
//! {
//!   "writer": {"holder": "...", "acquired_at": "...", "refreshed_at": "..."},
//!   "readers": [{"holder": "...", ...}],
//!   "pending_writers": [{"holder": "...", ...}]
//! }
//! ```

use crate::coordinator::LockConfig;
use crate::error::{LockError, Result};
use crate::store::{GUARD_EXT, Heartbeat, HolderInfo, LockDir, RWLOCK_EXT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const GUARD_POLL: Duration = Duration::from_millis(10);

/// Persisted readers/writer state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RwLockState {
    #[serde(default)]
    pub writer: Option<HolderInfo>,

    #[serde(default)]
    pub readers: Vec<HolderInfo>,

    #[serde(default)]
    pub pending_writers: Vec<HolderInfo>,
}

impl RwLockState {
    pub fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty() && self.pending_writers.is_empty()
    }

    /// Drop readers and pending writers that stopped refreshing.
    ///
    /// A dead reader can no longer add members to the protected resource, so
    /// its entry is safe to discard. A writer is never purged here.
    fn purge_stale(&mut self, name: &str, expiry: Duration) {
        self.readers.retain(|r| {
            let stale = r.is_stale(expiry);
            if stale {
                tracing::warn!(lock = %name, holder = %r.holder, "purging stale reader");
            }
            !stale
        });
        self.pending_writers.retain(|w| !w.is_stale(expiry));
    }

    fn stale_writer_error(&self, name: &str, expiry: Duration) -> Option<LockError> {
        self.writer
            .as_ref()
            .filter(|w| w.is_stale(expiry))
            .map(|w| LockError::Stale {
                name: name.to_string(),
                holder: w.holder.clone(),
                refreshed_at: w.refreshed_at,
            })
    }
}

/// Snapshot of a readers/writer lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RwLockStatus {
    pub readers: usize,
    pub writer: Option<HolderInfo>,
    pub pending_writers: usize,
}

impl RwLockStatus {
    pub fn is_write_locked(&self) -> bool {
        self.writer.is_some()
    }
}

/// Named cross-process readers/writer lock
pub struct ReadersWriterLock {
    dir: LockDir,
    name: String,
    holder: String,
    config: LockConfig,
}

impl ReadersWriterLock {
    pub(crate) fn new(
        dir: LockDir,
        name: impl Into<String>,
        holder: impl Into<String>,
        config: LockConfig,
    ) -> Self {
        Self {
            dir,
            name: name.into(),
            holder: holder.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire shared access, waiting while a writer holds or awaits the lock
    pub async fn acquire_read(&self) -> Result<ReadGuard> {
        loop {
            let admitted = self
                .with_state(|state| {
                    state.purge_stale(&self.name, self.config.expiry);
                    if let Some(err) = state.stale_writer_error(&self.name, self.config.expiry) {
                        return Err(err);
                    }
                    if state.writer.is_some() || !state.pending_writers.is_empty() {
                        return Ok(false);
                    }
                    state.readers.push(HolderInfo::new(&self.holder));
                    Ok(true)
                })
                .await?;

            if admitted {
                tracing::debug!(lock = %self.name, holder = %self.holder, "acquired read lock");
                return Ok(ReadGuard {
                    name: self.name.clone(),
                    holder: self.holder.clone(),
                    heartbeat: self.spawn_heartbeat(EntryKind::Reader),
                    lock: self.clone_handle(),
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Acquire exclusive access, waiting for all readers and any other writer
    pub async fn acquire_write(&self) -> Result<WriteGuard> {
        self.with_state(|state| {
            state.purge_stale(&self.name, self.config.expiry);
            state.pending_writers.push(HolderInfo::new(&self.holder));
            Ok(())
        })
        .await?;

        loop {
            let acquired = self
                .with_state(|state| {
                    state.purge_stale(&self.name, self.config.expiry);
                    if let Some(err) = state.stale_writer_error(&self.name, self.config.expiry) {
                        return Err(err);
                    }
                    let ready = state.writer.is_none() && state.readers.is_empty();
                    match state
                        .pending_writers
                        .iter_mut()
                        .find(|w| w.holder == self.holder)
                    {
                        Some(pending) => pending.refresh(),
                        None => state.pending_writers.push(HolderInfo::new(&self.holder)),
                    }
                    if !ready {
                        return Ok(false);
                    }
                    state.pending_writers.retain(|w| w.holder != self.holder);
                    state.writer = Some(HolderInfo::new(&self.holder));
                    Ok(true)
                })
                .await;

            match acquired {
                Ok(true) => {
                    tracing::debug!(lock = %self.name, holder = %self.holder, "acquired write lock");
                    return Ok(WriteGuard {
                        name: self.name.clone(),
                        holder: self.holder.clone(),
                        heartbeat: self.spawn_heartbeat(EntryKind::Writer),
                        lock: self.clone_handle(),
                    });
                }
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    self.withdraw_pending().await;
                    return Err(e);
                }
            }
        }
    }

    pub async fn status(&self) -> Result<RwLockStatus> {
        let state: RwLockState = self
            .dir
            .read_json(&self.state_path())
            .await?
            .unwrap_or_default();
        Ok(RwLockStatus {
            readers: state.readers.len(),
            writer: state.writer,
            pending_writers: state.pending_writers.len(),
        })
    }

    fn state_path(&self) -> PathBuf {
        self.dir.path(&self.name, RWLOCK_EXT)
    }

    fn clone_handle(&self) -> ReadersWriterLock {
        ReadersWriterLock::new(
            self.dir.clone(),
            self.name.clone(),
            self.holder.clone(),
            self.config.clone(),
        )
    }

    async fn withdraw_pending(&self) {
        let result = self
            .with_state(|state| {
                state.pending_writers.retain(|w| w.holder != self.holder);
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(lock = %self.name, "failed to withdraw pending writer: {}", e);
        }
    }

    fn spawn_heartbeat(&self, kind: EntryKind) -> Heartbeat {
        let lock = self.clone_handle();
        Heartbeat::spawn(self.config.heartbeat_interval, move || {
            let lock = lock.clone_handle();
            async move {
                lock.with_state(|state| {
                    let entry = match kind {
                        EntryKind::Reader => {
                            state.readers.iter_mut().find(|r| r.holder == lock.holder)
                        }
                        EntryKind::Writer => state.writer.as_mut().filter(|w| w.holder == lock.holder),
                    };
                    if let Some(entry) = entry {
                        entry.refresh();
                    }
                    Ok(())
                })
                .await
            }
        })
    }

    /// Run `f` against the persisted state while holding the state guard.
    async fn with_state<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RwLockState) -> Result<T>,
    {
        self.lock_guard_file().await?;
        let result = self.apply(f).await;
        let unlocked = self.dir.remove(&self.dir.path(&self.name, GUARD_EXT)).await;

        let value = result?;
        unlocked?;
        Ok(value)
    }

    async fn apply<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RwLockState) -> Result<T>,
    {
        let path = self.state_path();
        let mut state: RwLockState = self.dir.read_json(&path).await?.unwrap_or_default();
        let before = state.clone();
        let value = f(&mut state)?;

        if state != before {
            if state.is_free() {
                self.dir.remove(&path).await?;
            } else {
                self.dir.write_atomic(&path, &state).await?;
            }
        }
        Ok(value)
    }

    async fn lock_guard_file(&self) -> Result<()> {
        let path = self.dir.path(&self.name, GUARD_EXT);
        let info = HolderInfo::new(&self.holder);
        loop {
            if self.dir.create_exclusive(&path, &info).await? {
                return Ok(());
            }
            // The guard is only held for a read-modify-write; an old one means its
            // owner died in the middle of rewriting the state.
            if let Some(age) = self.dir.age(&path).await?
                && age > self.config.expiry
            {
                let holder = self
                    .dir
                    .read_json::<HolderInfo>(&path)
                    .await?
                    .map(|h| h.holder)
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(LockError::Stale {
                    name: self.name.clone(),
                    holder,
                    refreshed_at: chrono::Utc::now()
                        - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero()),
                });
            }
            tokio::time::sleep(GUARD_POLL).await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EntryKind {
    Reader,
    Writer,
}

/// Proof of shared access; release it explicitly once the critical section returns
pub struct ReadGuard {
    name: String,
    holder: String,
    heartbeat: Heartbeat,
    lock: ReadersWriterLock,
}

impl ReadGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(self) -> Result<()> {
        self.heartbeat.stop().await;
        let removed = self
            .lock
            .with_state(|state| {
                let before = state.readers.len();
                state.readers.retain(|r| r.holder != self.holder);
                Ok(state.readers.len() != before)
            })
            .await?;

        if !removed {
            return Err(LockError::NotOwned {
                name: self.name.clone(),
                holder: self.holder.clone(),
            });
        }
        tracing::debug!(lock = %self.name, "released read lock");
        Ok(())
    }
}

/// Proof of exclusive access.
///
/// Only [`WriteGuard::release`] frees the lock. A writer whose critical section
/// failed keeps holding it so no reader proceeds against a resource left in an
/// unknown state.
pub struct WriteGuard {
    name: String,
    holder: String,
    heartbeat: Heartbeat,
    lock: ReadersWriterLock,
}

impl WriteGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(self) -> Result<()> {
        self.heartbeat.stop().await;
        let released = self
            .lock
            .with_state(|state| {
                if state.writer.as_ref().is_some_and(|w| w.holder == self.holder) {
                    state.writer = None;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })
            .await?;

        if !released {
            return Err(LockError::NotOwned {
                name: self.name.clone(),
                holder: self.holder.clone(),
            });
        }
        tracing::debug!(lock = %self.name, "released write lock");
        Ok(())
    }

    /// Stop refreshing and leave the write lock held
    pub async fn abandon(self) {
        self.heartbeat.stop().await;
        tracing::warn!(lock = %self.name, holder = %self.holder, "abandoned write lock in held state");
    }
}
