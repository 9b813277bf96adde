//! Lock coordinator
//!
//! Hands out named mutexes and readers/writer locks backed by one shared lock
//! directory, and lets operators inspect and clear entries left behind by
//! failed critical sections.

use crate::error::Result;
use crate::mutex::FileMutex;
use crate::rwlock::{ReadersWriterLock, RwLockState};
use crate::store::{
    DELETING_EXT, GUARD_EXT, HolderInfo, LockDir, MUTEX_EXT, RWLOCK_EXT, process_holder,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;

static HOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Timing parameters shared by every lock of a coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// A holder that has not refreshed for this long is considered stale
    pub expiry: Duration,
    /// Delay between attempts while waiting
    pub poll_interval: Duration,
    /// How often a holder refreshes its entry
    pub heartbeat_interval: Duration,
}

impl LockConfig {
    pub fn new(expiry: Duration, poll_interval: Duration) -> Self {
        Self {
            expiry,
            poll_interval,
            heartbeat_interval: expiry / 4,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(1))
    }
}

/// Record left next to a lock whose protected resource was being deleted when
/// something went wrong
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionMark {
    pub lock: String,
    pub reason: String,
    pub holder: String,
    pub marked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Mutex,
    ReadersWriter,
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKind::Mutex => write!(f, "mutex"),
            LockKind::ReadersWriter => write!(f, "rwlock"),
        }
    }
}

/// One lock found in the lock directory
#[derive(Debug, Clone)]
pub struct LockEntry {
    pub name: String,
    pub kind: LockKind,
    pub holders: Vec<HolderInfo>,
    pub stale: bool,
    pub marked: Option<DeletionMark>,
}

/// Factory for locks sharing one directory
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    dir: LockDir,
    config: LockConfig,
}

impl LockCoordinator {
    pub fn new(root: impl AsRef<Path>, config: LockConfig) -> Self {
        Self {
            dir: LockDir::new(root),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Every acquisition gets its own holder identity, so two tasks of the same
    /// process are told apart.
    fn next_holder(&self) -> String {
        let seq = HOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}", process_holder(), seq)
    }

    pub fn mutex(&self, name: &str) -> FileMutex {
        FileMutex::new(self.dir.clone(), name, self.next_holder(), self.config.clone(), None)
    }

    pub fn mutex_with_timeout(&self, name: &str, timeout: Duration) -> FileMutex {
        FileMutex::new(
            self.dir.clone(),
            name,
            self.next_holder(),
            self.config.clone(),
            Some(timeout),
        )
    }

    pub fn rw_lock(&self, name: &str) -> ReadersWriterLock {
        ReadersWriterLock::new(self.dir.clone(), name, self.next_holder(), self.config.clone())
    }

    /// Flag `name` as belonging to a resource whose deletion failed half-way
    pub async fn mark_for_deletion(&self, name: &str, reason: &str) -> Result<()> {
        let mark = DeletionMark {
            lock: name.to_string(),
            reason: reason.to_string(),
            holder: process_holder(),
            marked_at: Utc::now(),
        };
        self.dir
            .write_atomic(&self.dir.path(name, DELETING_EXT), &mark)
            .await?;
        tracing::warn!(lock = %name, reason = %reason, "marked lock for deletion");
        Ok(())
    }

    pub async fn deletion_marks(&self) -> Result<Vec<DeletionMark>> {
        let mut marks = Vec::new();
        for path in self.files_with_ext(DELETING_EXT).await? {
            if let Some(mark) = self.dir.read_json::<DeletionMark>(&path).await? {
                marks.push(mark);
            }
        }
        marks.sort_by(|a, b| a.lock.cmp(&b.lock));
        Ok(marks)
    }

    /// Inspect every lock in the directory
    pub async fn list(&self) -> Result<Vec<LockEntry>> {
        let marks = self.deletion_marks().await?;
        let mark_for = |stem: &str| {
            marks
                .iter()
                .find(|m| crate::store::file_stem(&m.lock) == stem)
                .cloned()
        };

        let mut entries = Vec::new();
        for path in self.files_with_ext(MUTEX_EXT).await? {
            let Some(info) = self.dir.read_json::<HolderInfo>(&path).await? else {
                continue;
            };
            let name = stem_of(&path, MUTEX_EXT);
            entries.push(LockEntry {
                stale: info.is_stale(self.config.expiry),
                marked: mark_for(&name),
                kind: LockKind::Mutex,
                holders: vec![info],
                name,
            });
        }

        for path in self.files_with_ext(RWLOCK_EXT).await? {
            let Some(state) = self.dir.read_json::<RwLockState>(&path).await? else {
                continue;
            };
            let name = stem_of(&path, RWLOCK_EXT);
            let holders: Vec<HolderInfo> = state
                .writer
                .into_iter()
                .chain(state.readers)
                .collect();
            entries.push(LockEntry {
                stale: holders.iter().any(|h| h.is_stale(self.config.expiry)),
                marked: mark_for(&name),
                kind: LockKind::ReadersWriter,
                holders,
                name,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Remove every file belonging to lock `name`, returning whether any existed.
    ///
    /// Meant for operators after the protected resource has been inspected.
    pub async fn clear(&self, name: &str) -> Result<bool> {
        let mut removed = false;
        for ext in [MUTEX_EXT, RWLOCK_EXT, GUARD_EXT, DELETING_EXT] {
            removed |= self.dir.remove(&self.dir.path(name, ext)).await?;
        }
        if removed {
            tracing::info!(lock = %name, "cleared lock");
        }
        Ok(removed)
    }

    /// Clear every lock carrying a deletion mark, returning their names
    pub async fn clear_marked(&self) -> Result<Vec<String>> {
        let mut cleared = Vec::new();
        for mark in self.deletion_marks().await? {
            self.clear(&mark.lock).await?;
            cleared.push(mark.lock);
        }
        Ok(cleared)
    }

    async fn files_with_ext(&self, ext: &str) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut read_dir = match fs::read_dir(self.dir.root()).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{}", ext);
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Temp files start with a dot; the guard file also ends in `.rwlock.guard`
            if !file_name.starts_with('.') && file_name.ends_with(&suffix) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn stem_of(path: &Path, ext: &str) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(&format!(".{}", ext)))
        .unwrap_or_default()
        .to_string()
}
