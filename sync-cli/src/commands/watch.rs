//! Run the configured pipeline and print every published state.

use anyhow::{Context, Result};
use feedsync_client::{
    Credential, Endpoint, HttpResponse, HttpTransport, MockTransport, PipelineHandle,
    ReqwestTransport, SyncNotice, SyncPipeline, SyncState,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::{snapshot_store, FeedEntry};
use crate::config::Config;

/// Number of items printed per state.
const PREVIEW_ITEMS: usize = 5;

/// Options of the watch command.
#[derive(Debug, Default)]
pub struct WatchOptions {
    /// Credential for the endpoint.
    pub credential: Option<String>,
    /// Serve canned responses instead of calling the network.
    pub mock: bool,
    /// Stop after the first fetch result.
    pub once: bool,
}

/// Run the watch command.
pub async fn run(config: &Config, data_dir: &Path, options: WatchOptions) -> Result<()> {
    let (endpoint, transport, credential) = if options.mock {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| Endpoint::new("https://feedsync.invalid/items"));
        let credential = options.credential.unwrap_or_else(|| "mock".to_string());
        (endpoint, mock_transport()?, Some(credential))
    } else {
        let endpoint = config
            .endpoint
            .clone()
            .context("No [endpoint] configured. Add one to feedsync.toml or use --mock.")?;
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new().context("Failed to create HTTP client")?);
        (endpoint, transport, options.credential)
    };

    println!("Watching {}", endpoint.url);

    let store = Arc::new(snapshot_store(config, data_dir));
    let mut pipeline = SyncPipeline::<FeedEntry>::new(
        config.pipeline.to_pipeline_config(),
        endpoint,
        transport,
    )
    .with_snapshot_store(store);

    match credential {
        Some(credential) => pipeline = pipeline.with_credential(Credential::new(credential)),
        None => tracing::warn!("No credential supplied, waiting for one (set FEEDSYNC_CREDENTIAL)"),
    }

    let handle = pipeline.start();
    let result = watch_loop(&handle, options.once).await;

    handle.shutdown();
    let stats = handle.stats();
    tracing::info!(
        "Stopped after {} fetches ({} cached, {} not modified, {} retries, {} failures)",
        stats.fetches,
        stats.cache_hits,
        stats.not_modified,
        stats.retries,
        stats.failures
    );
    result
}

async fn watch_loop(handle: &PipelineHandle<FeedEntry>, once: bool) -> Result<()> {
    let mut states = handle.subscribe();
    let mut notices = handle.errors();

    print_state(&states.borrow_and_update());

    loop {
        tokio::select! {
            changed = states.changed() => {
                changed.context("Pipeline stopped unexpectedly")?;
                print_state(&states.borrow_and_update());
                if once && handle.stats().merges > 0 {
                    return Ok(());
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    print_notice(&notice);
                    if once {
                        anyhow::bail!("Fetch failed: {}", notice.kind);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} notices", missed);
                }
                Err(RecvError::Closed) => anyhow::bail!("Pipeline stopped unexpectedly"),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                println!();
                println!("Interrupted.");
                return Ok(());
            }
        }
    }
}

fn print_state(state: &SyncState<FeedEntry>) {
    println!();
    if state.items.is_empty() {
        println!("No items yet ({:?})", state.cursor);
    } else {
        println!("{} items ({:?})", state.items.len(), state.cursor);
    }

    for item in state.items.iter().take(PREVIEW_ITEMS) {
        match serde_json::to_string(&item.fields) {
            Ok(fields) => println!("  #{} {}", item.id, fields),
            Err(_) => println!("  #{}", item.id),
        }
    }
    if state.items.len() > PREVIEW_ITEMS {
        println!("  ... and {} more", state.items.len() - PREVIEW_ITEMS);
    }
    if let Some(kind) = state.last_error {
        println!("Last fetch failed: {}", kind);
    }
}

fn print_notice(notice: &SyncNotice) {
    eprintln!();
    eprintln!("ERROR ({}): {}", notice.kind, notice.message);
}

/// A transport that serves the same small page on every call.
fn mock_transport() -> Result<Arc<dyn HttpTransport>> {
    let page = serde_json::json!([
        { "id": 3, "text": "third" },
        { "id": 2, "text": "second" },
        { "id": 1, "text": "first" },
    ]);
    let body = serde_json::to_vec(&page).context("Failed to build mock page")?;

    let transport = MockTransport::new();
    transport.set_default_response(
        HttpResponse::ok(body).with_header("Content-Type", "application/json"),
    );
    Ok(Arc::new(transport))
}
