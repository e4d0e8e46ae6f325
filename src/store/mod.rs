//! File-backed JSON document store with exclusive-writer serialization.
//!
//! Each [`PersistentStore<T>`] owns exactly one JSON document on disk. Writes
//! go through [`PersistentStore::with_lock`], which serializes all mutators
//! for that store, applies the mutation to an in-memory copy, and persists
//! it with a write-to-temp-then-rename so a crash mid-write never leaves a
//! torn file. Reads observe the latest state from this process.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors produced by [`PersistentStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem operation failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The on-disk document could not be parsed as JSON.
    #[error("store deserialization error: {0}")]
    Deserialize(String),
    /// The document could not be serialized back to JSON.
    #[error("store serialization error: {0}")]
    Serialize(String),
}

/// A single process-wide monotonic counter backing [`generate_id`].
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate an id that is unique within the process and sortable by
/// creation time: a 13-hex-digit millisecond timestamp followed by a
/// 6-hex-digit random suffix, with a monotonic counter folded into the
/// timestamp component to keep ordering stable for calls landing in the
/// same millisecond.
pub fn generate_id() -> String {
    let millis = u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX);
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xfff;
    let mut rng = rand::thread_rng();
    let suffix = rng.next_u32() & 0x00ff_ffff;
    format!("{millis:011x}{seq:03x}{suffix:06x}")
}

/// A single JSON document per store, guarded by a mutex that serializes all
/// mutators and doubles as the atomicity boundary for the temp-then-rename
/// write.
pub struct PersistentStore<T> {
    path: PathBuf,
    document: Mutex<T>,
}

impl<T> PersistentStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    /// Open (or initialize) the store at `path`. If the file does not exist,
    /// the store starts with `T::default()`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = load_or_default(&path).await?;
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    /// Return a clone of the current in-memory document.
    ///
    /// Takes the store's mutex briefly, so this always reflects the latest
    /// write made by this process.
    pub async fn read(&self) -> T {
        self.document.lock().await.clone()
    }

    /// Acquire the store's exclusive lock, hand the current document to
    /// `mutator`, persist the (possibly mutated) document atomically, and
    /// return whatever `mutator` returned.
    ///
    /// No other `with_lock` call on this store proceeds until this one
    /// completes. If persistence fails, the in-memory document is rolled
    /// back to what was last durably written, and the error is returned —
    /// the mutator's effect is never observable without a successful write.
    pub async fn with_lock<R>(
        &self,
        mutator: impl FnOnce(&mut T) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self.document.lock().await;
        let before = guard.clone();
        let result = mutator(&mut guard);
        if let Err(e) = persist(&self.path, &guard).await {
            *guard = before;
            return Err(e);
        }
        Ok(result)
    }
}

async fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialize(e.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(StoreError::Io(e)),
    }
}

async fn persist<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    let bytes =
        serde_json::to_vec_pretty(document).map_err(|e| StoreError::Serialize(e.to_string()))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
