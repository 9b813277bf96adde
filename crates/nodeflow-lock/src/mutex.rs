//! Durable mutual exclusion
//!
//! A mutex is held by whoever managed to create `<name>.mutex` in the lock
//! directory. The holder keeps the entry fresh with a heartbeat; waiters give up
//! with [`LockError::Stale`] once a holder stops refreshing.

use crate::coordinator::LockConfig;
use crate::error::{LockError, Result};
use crate::store::{Heartbeat, HolderInfo, LockDir, MUTEX_EXT};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Named cross-process mutex
pub struct FileMutex {
    dir: LockDir,
    name: String,
    holder: String,
    config: LockConfig,
    timeout: Option<Duration>,
}

impl FileMutex {
    pub(crate) fn new(
        dir: LockDir,
        name: impl Into<String>,
        holder: impl Into<String>,
        config: LockConfig,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            dir,
            name: name.into(),
            holder: holder.into(),
            config,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> PathBuf {
        self.dir.path(&self.name, MUTEX_EXT)
    }

    /// Try to take the mutex without waiting
    pub async fn try_acquire(&self) -> Result<Option<MutexGuard>> {
        let path = self.path();
        let info = HolderInfo::new(&self.holder);
        if !self.dir.create_exclusive(&path, &info).await? {
            tracing::debug!(lock = %self.name, "mutex is held by another holder");
            return Ok(None);
        }

        tracing::debug!(lock = %self.name, holder = %self.holder, "acquired mutex");
        let heartbeat = {
            let dir = self.dir.clone();
            let path = path.clone();
            let holder = self.holder.clone();
            Heartbeat::spawn(self.config.heartbeat_interval, move || {
                let dir = dir.clone();
                let path = path.clone();
                let holder = holder.clone();
                async move {
                    if let Some(mut info) = dir.read_json::<HolderInfo>(&path).await?
                        && info.holder == holder
                    {
                        info.refresh();
                        dir.write_atomic(&path, &info).await?;
                    }
                    Ok(())
                }
            })
        };

        Ok(Some(MutexGuard {
            dir: self.dir.clone(),
            name: self.name.clone(),
            holder: self.holder.clone(),
            path,
            heartbeat,
        }))
    }

    /// Block until the current holder releases the mutex or its entry disappears.
    ///
    /// Fails with [`LockError::Stale`] when the holder stopped refreshing, and
    /// with [`LockError::Timeout`] when this mutex was built with a timeout that
    /// elapsed.
    pub async fn wait(&self) -> Result<()> {
        let started = Instant::now();
        let path = self.path();

        loop {
            match self.dir.read_json::<HolderInfo>(&path).await? {
                None => return Ok(()),
                Some(info) if info.is_stale(self.config.expiry) => {
                    return Err(LockError::Stale {
                        name: self.name.clone(),
                        holder: info.holder,
                        refreshed_at: info.refreshed_at,
                    });
                }
                Some(_) => {}
            }

            self.check_timeout(started)?;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Take the mutex, waiting for other holders as long as necessary
    pub async fn acquire(&self) -> Result<MutexGuard> {
        let started = Instant::now();
        loop {
            if let Some(guard) = self.try_acquire().await? {
                return Ok(guard);
            }
            self.wait().await?;
            self.check_timeout(started)?;
        }
    }

    /// Current holder, if any
    pub async fn holder(&self) -> Result<Option<HolderInfo>> {
        self.dir.read_json(&self.path()).await
    }

    fn check_timeout(&self, started: Instant) -> Result<()> {
        match self.timeout {
            Some(timeout) if started.elapsed() >= timeout => Err(LockError::Timeout {
                name: self.name.clone(),
                waited: started.elapsed(),
            }),
            _ => Ok(()),
        }
    }
}

/// Proof of holding a [`FileMutex`].
///
/// Dropping the guard does not release the mutex: a critical section that did
/// not finish must leave the lock in place.
pub struct MutexGuard {
    dir: LockDir,
    name: String,
    holder: String,
    path: PathBuf,
    heartbeat: Heartbeat,
}

impl MutexGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the mutex after a completed critical section
    pub async fn release(self) -> Result<()> {
        self.heartbeat.stop().await;

        match self.dir.read_json::<HolderInfo>(&self.path).await? {
            Some(info) if info.holder == self.holder => {
                self.dir.remove(&self.path).await?;
                tracing::debug!(lock = %self.name, "released mutex");
                Ok(())
            }
            _ => Err(LockError::NotOwned {
                name: self.name.clone(),
                holder: self.holder.clone(),
            }),
        }
    }

    /// Stop refreshing and leave the mutex held.
    ///
    /// Waiters will observe the entry going stale and fail instead of entering
    /// a critical section whose previous run did not complete.
    pub async fn abandon(self) {
        self.heartbeat.stop().await;
        tracing::warn!(lock = %self.name, holder = %self.holder, "abandoned mutex in held state");
    }
}
