//! CLI command implementations.

pub mod clear;
pub mod status;
pub mod watch;

use feedsync_client::FileSnapshotStore;
use feedsync_types::SyncItem;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Config;

/// A feed item as the CLI sees it: an integer `id` plus whatever else the
/// server sent, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Item identifier
    pub id: i64,
    /// Remaining fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl SyncItem for FeedEntry {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }
}

/// Snapshot store for the configured pipeline.
pub fn snapshot_store(config: &Config, data_dir: &Path) -> FileSnapshotStore {
    FileSnapshotStore::new(config.snapshot.dir_or(data_dir), &config.snapshot.name)
}
