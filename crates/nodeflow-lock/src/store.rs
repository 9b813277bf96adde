//! Lock directory backing store
//!
//! Every lock lives as a small JSON file inside one directory shared by all
//! participating processes. Files are published with exclusive-create or
//! write-then-rename so a reader never observes a partially written entry.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub(crate) const MUTEX_EXT: &str = "mutex";
pub(crate) const RWLOCK_EXT: &str = "rwlock";
pub(crate) const GUARD_EXT: &str = "rwlock.guard";
pub(crate) const DELETING_EXT: &str = "deleting";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identity of a lock holder and the last time it proved it was alive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderInfo {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub refreshed_at: DateTime<Utc>,
}

impl HolderInfo {
    pub fn new(holder: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            holder: holder.into(),
            acquired_at: now,
            refreshed_at: now,
        }
    }

    /// Whether the holder has not refreshed the entry for longer than `expiry`
    pub fn is_stale(&self, expiry: Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.refreshed_at)
            .to_std()
            .map(|age| age > expiry)
            .unwrap_or(false)
    }

    pub fn refresh(&mut self) {
        self.refreshed_at = Utc::now();
    }
}

/// Map a lock name onto a file-system safe stem
pub(crate) fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Default holder prefix for this process: `<host>:<pid>`
pub(crate) fn process_holder() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

/// Directory holding all lock files
#[derive(Debug, Clone)]
pub(crate) struct LockDir {
    root: PathBuf,
}

impl LockDir {
    pub(crate) fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn path(&self, name: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{}.{}", file_stem(name), ext))
    }

    fn temp_path(&self, target: &Path) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.root.join(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            seq
        ))
    }

    /// Ensure the lock directory exists
    pub(crate) async fn ensure(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).await?;
            tracing::debug!("Created lock directory: {}", self.root.display());
        }
        Ok(())
    }

    /// Publish `value` at `path` only if nothing is there yet.
    ///
    /// Returns `false` when another holder already owns the path.
    pub(crate) async fn create_exclusive<T: Serialize>(&self, path: &Path, value: &T) -> Result<bool> {
        self.ensure().await?;
        let tmp = self.temp_path(path);
        fs::write(&tmp, serde_json::to_string_pretty(value)?).await?;

        // hard_link fails with AlreadyExists instead of replacing the target
        let linked = fs::hard_link(&tmp, path).await;
        if let Err(e) = fs::remove_file(&tmp).await {
            tracing::debug!("Failed to remove temp lock file {}: {}", tmp.display(), e);
        }

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the content of `path` atomically
    pub(crate) async fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure().await?;
        let tmp = self.temp_path(path);
        fs::write(&tmp, serde_json::to_string_pretty(value)?).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub(crate) async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `path`, returning whether it existed
    pub(crate) async fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Age of the file at `path` by modification time
    pub(crate) async fn age(&self, path: &Path) -> Result<Option<Duration>> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.modified()?.elapsed().ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Background task that keeps a held lock entry fresh.
///
/// `stop` serializes with an in-flight refresh, so once it returns no further
/// write to the lock entry can happen.
pub(crate) struct Heartbeat {
    active: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    pub(crate) fn spawn<F, Fut>(every: Duration, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let active = Arc::new(Mutex::new(true));
        let flag = active.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let running = flag.lock().await;
                if !*running {
                    break;
                }
                if let Err(e) = refresh().await {
                    tracing::warn!("Failed to refresh lock heartbeat: {}", e);
                }
            }
        });
        Self { active, task }
    }

    pub(crate) async fn stop(&self) {
        *self.active.lock().await = false;
        self.task.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}
