//! # sync-types
//!
//! Data model for the feedsync paginated polling engine.
//!
//! This crate provides the foundational types used across all feedsync crates:
//! - [`ItemId`], [`SyncItem`], [`Cursor`] - Identity and ordering types
//! - [`Credential`] - Opaque API credential with redacted debug output
//! - [`SyncState`], [`TriggerEvent`], [`GateState`] - Pipeline state and inputs
//! - [`PayloadShape`], [`decode_page`] - Response body layout
//! - [`ErrorKind`], [`FetchError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod credential;
mod envelope;
mod error;
mod ids;
mod state;

pub use credential::Credential;
pub use envelope::{decode_page, PayloadShape};
pub use error::{ErrorKind, FetchError};
pub use ids::{Cursor, ItemId, SyncItem};
pub use state::{GateState, SyncState, TriggerEvent};
