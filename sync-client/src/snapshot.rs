//! Persistent snapshot store.
//!
//! A snapshot is the last known-good item list plus the cursor and
//! `Last-Modified` marker. It is read once when a pipeline starts, to seed
//! state before the first fetch completes, and written after every merge.
//!
//! [`FileSnapshotStore`] keeps two independent artifacts per pipeline:
//!
//! ```text
//! <dir>/<name>.items.json    JSON array of items, newest first
//! <dir>/<name>.cursor.json   {"min_seen_id":..,"max_seen_id":..,"last_modified":..}
//! ```
//!
//! Each is written to a temporary file and renamed into place, so a crash
//! mid-write leaves the previous version of that artifact intact.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use feedsync_types::{Cursor, ItemId, SyncItem, SyncState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot store errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Reading or writing an artifact failed.
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// An artifact exists but does not parse.
    #[error("snapshot {path} is corrupt: {source}")]
    Corrupt {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Encoding the snapshot failed.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Injected failure (memory store).
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Durable copy of one pipeline's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T: SyncItem> {
    /// Retained items, newest first
    pub items: Vec<T>,
    /// Pagination bounds
    pub cursor: Cursor<T::Id>,
    /// Conditional-fetch marker
    pub last_modified: Option<String>,
}

impl<T: SyncItem> Snapshot<T> {
    /// Capture the persistent part of `state`.
    pub fn from_state(state: &SyncState<T>, last_modified: Option<String>) -> Self {
        Self {
            items: state.items.clone(),
            cursor: state.cursor,
            last_modified,
        }
    }

    /// State to seed a pipeline with.
    pub fn to_state(&self) -> SyncState<T> {
        SyncState::seeded(self.items.clone(), self.cursor)
    }
}

/// Durable storage of the last known-good state.
#[async_trait]
pub trait SnapshotStore<T: SyncItem>: Send + Sync {
    /// Read the snapshot. `Ok(None)` means there is none.
    async fn load(&self) -> Result<Option<Snapshot<T>>, SnapshotError>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &Snapshot<T>) -> Result<(), SnapshotError>;

    /// Delete the stored snapshot, if any.
    async fn clear(&self) -> Result<(), SnapshotError>;
}

#[derive(Serialize, Deserialize)]
#[serde(bound = "I: ItemId")]
struct CursorArtifact<I: ItemId> {
    #[serde(flatten)]
    cursor: Cursor<I>,
    #[serde(default)]
    last_modified: Option<String>,
}

/// Snapshot store backed by two JSON files.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    items_path: PathBuf,
    cursor_path: PathBuf,
}

impl FileSnapshotStore {
    /// Store artifacts for pipeline `name` under `dir`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            items_path: dir.join(format!("{}.items.json", name)),
            cursor_path: dir.join(format!("{}.cursor.json", name)),
        }
    }

    /// Path of the item list artifact.
    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    /// Path of the cursor artifact.
    pub fn cursor_path(&self) -> &Path {
        &self.cursor_path
    }

    async fn read(path: &Path) -> Result<Option<Vec<u8>>, SnapshotError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(source) => Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), SnapshotError> {
        let io_err = |source: std::io::Error| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)
    }

    async fn remove(path: &Path) -> Result<(), SnapshotError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(source) => Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait]
impl<T: SyncItem> SnapshotStore<T> for FileSnapshotStore {
    /// Missing item list means no snapshot. A missing or corrupt cursor
    /// artifact is rebuilt from the items, without a marker.
    async fn load(&self) -> Result<Option<Snapshot<T>>, SnapshotError> {
        let Some(bytes) = Self::read(&self.items_path).await? else {
            return Ok(None);
        };
        let items: Vec<T> =
            serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Corrupt {
                path: self.items_path.clone(),
                source,
            })?;

        let artifact = match Self::read(&self.cursor_path).await {
            Ok(Some(bytes)) => serde_json::from_slice::<CursorArtifact<T::Id>>(&bytes).ok(),
            _ => None,
        };

        let snapshot = match artifact {
            Some(artifact) => Snapshot {
                items,
                cursor: artifact.cursor,
                last_modified: artifact.last_modified,
            },
            None => {
                let cursor = items
                    .iter()
                    .map(SyncItem::id)
                    .fold(Cursor::none(), Cursor::observe);
                Snapshot {
                    items,
                    cursor,
                    last_modified: None,
                }
            }
        };
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot<T>) -> Result<(), SnapshotError> {
        let items = serde_json::to_vec_pretty(&snapshot.items)?;
        let cursor = serde_json::to_vec_pretty(&CursorArtifact {
            cursor: snapshot.cursor,
            last_modified: snapshot.last_modified.clone(),
        })?;

        Self::write_atomic(&self.items_path, items).await?;
        Self::write_atomic(&self.cursor_path, cursor).await
    }

    async fn clear(&self) -> Result<(), SnapshotError> {
        Self::remove(&self.items_path).await?;
        Self::remove(&self.cursor_path).await
    }
}

/// In-memory snapshot store for tests and ephemeral pipelines.
///
/// Clones share the same slot.
#[derive(Debug)]
pub struct MemorySnapshotStore<T: SyncItem> {
    inner: Arc<Mutex<MemoryInner<T>>>,
}

#[derive(Debug)]
struct MemoryInner<T: SyncItem> {
    snapshot: Option<Snapshot<T>>,
    saves: usize,
    fail_saves: bool,
    fail_loads: bool,
}

impl<T: SyncItem> MemorySnapshotStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                snapshot: None,
                saves: 0,
                fail_saves: false,
                fail_loads: false,
            })),
        }
    }

    /// Create a store already holding `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot<T>) -> Self {
        let store = Self::new();
        store.inner().snapshot = Some(snapshot);
        store
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently stored snapshot.
    pub fn snapshot(&self) -> Option<Snapshot<T>> {
        self.inner().snapshot.clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.inner().saves
    }

    /// Make every save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner().fail_saves = fail;
    }

    /// Make every load fail.
    pub fn set_fail_loads(&self, fail: bool) {
        self.inner().fail_loads = fail;
    }
}

impl<T: SyncItem> Default for MemorySnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SyncItem> Clone for MemorySnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<T: SyncItem> SnapshotStore<T> for MemorySnapshotStore<T> {
    async fn load(&self) -> Result<Option<Snapshot<T>>, SnapshotError> {
        let inner = self.inner();
        if inner.fail_loads {
            return Err(SnapshotError::Unavailable("load disabled".into()));
        }
        Ok(inner.snapshot.clone())
    }

    async fn save(&self, snapshot: &Snapshot<T>) -> Result<(), SnapshotError> {
        let mut inner = self.inner();
        if inner.fail_saves {
            return Err(SnapshotError::Unavailable("save disabled".into()));
        }
        inner.snapshot = Some(snapshot.clone());
        inner.saves += 1;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SnapshotError> {
        self.inner().snapshot = None;
        Ok(())
    }
}
