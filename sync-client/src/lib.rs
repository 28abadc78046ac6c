//! # feedsync-client
//!
//! Runtime side of feedsync: keeps a local, bounded, newest-first copy of a
//! paginated remote collection up to date.
//!
//! This is the library that applications use to sync a feed.
//!
//! ## Features
//!
//! - **Gated polling**: fetches only while online, unpaused and authenticated
//! - **Incremental paging**: `since_id` style cursors, conditional requests
//! - **Bounded retry**: linear backoff, credential waits, terminal notices
//! - **Response cache**: concurrent, shared between pipelines
//! - **Snapshots**: last known-good state survives restarts
//! - **Transport Abstraction**: Pluggable HTTP layer (reqwest, mock)
//!
//! ## Example
//!
//! ```ignore
//! use feedsync_client::{Endpoint, PipelineConfig, ReqwestTransport, SyncPipeline};
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let handle = SyncPipeline::<Tweet>::new(
//!     PipelineConfig::default(),
//!     Endpoint::user_timeline("rustlang"),
//!     transport,
//! )
//! .with_credential(token.into())
//! .start();
//!
//! let latest = handle.current();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod snapshot;
pub mod transport;

pub use cache::{CacheEntry, ResponseCache};
pub use config::{CredentialPlacement, Endpoint, PipelineConfig, DEFAULT_POLL_PERIOD};
pub use executor::{FetchExecutor, FetchedPage, PageSource, RawPage};
pub use pipeline::{PipelineHandle, PipelineStats, SyncNotice, SyncPipeline};
pub use snapshot::{
    FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotError, SnapshotStore,
};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, MockTransport, RecordedRequest, ReqwestTransport,
    ReqwestTransportConfig, TransportError,
};

pub use feedsync_types::{Credential, Cursor, ErrorKind, FetchError, SyncItem, SyncState};
