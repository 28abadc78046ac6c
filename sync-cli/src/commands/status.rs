//! Show the persisted snapshot.

use anyhow::{Context, Result};
use feedsync_client::SnapshotStore;
use std::path::Path;

use super::{snapshot_store, FeedEntry};
use crate::config::Config;

/// Run the status command.
pub async fn run(config: &Config, data_dir: &Path) -> Result<()> {
    let store = snapshot_store(config, data_dir);

    println!("=== feedsync status ===");
    println!();

    match &config.endpoint {
        Some(endpoint) => println!("Endpoint: {}", endpoint.url),
        None => println!("Endpoint: NOT CONFIGURED"),
    }
    println!();

    let snapshot = SnapshotStore::<FeedEntry>::load(&store)
        .await
        .context("Failed to read snapshot")?;

    println!("Snapshot:");
    println!("  Items:  {}", store.items_path().display());
    println!("  Cursor: {}", store.cursor_path().display());
    println!();

    let Some(snapshot) = snapshot else {
        println!("  NO SNAPSHOT");
        println!();
        println!("Run 'feedsync watch' to fetch the feed.");
        return Ok(());
    };

    println!("  Retained:      {} items", snapshot.items.len());
    if snapshot.cursor.is_none() {
        println!("  Bounds:        none");
    } else {
        println!(
            "  Bounds:        {}..={}",
            snapshot.cursor.min_seen_id(),
            snapshot.cursor.max_seen_id()
        );
    }
    println!(
        "  Last-Modified: {}",
        snapshot.last_modified.as_deref().unwrap_or("-")
    );
    if let Some(newest) = snapshot.items.first() {
        println!("  Newest:        {}", newest.id);
    }

    Ok(())
}
