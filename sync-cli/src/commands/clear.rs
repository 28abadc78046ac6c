//! Delete the persisted snapshot.

use anyhow::{Context, Result};
use feedsync_client::SnapshotStore;
use std::path::Path;

use super::{snapshot_store, FeedEntry};
use crate::config::Config;

/// Run the clear command.
pub async fn run(config: &Config, data_dir: &Path) -> Result<()> {
    let store = snapshot_store(config, data_dir);

    SnapshotStore::<FeedEntry>::clear(&store)
        .await
        .context("Failed to delete snapshot")?;

    tracing::info!("Cleared snapshot '{}'", config.snapshot.name);
    println!("Snapshot '{}' cleared.", config.snapshot.name);
    Ok(())
}
