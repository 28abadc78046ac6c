//! # sync-core
//!
//! Pure logic for feedsync (no I/O, instant tests).
//!
//! This crate implements the decision-making stages of the sync pipeline
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`TriggerComposer`] turns trigger events into "sync now" decisions
//! - [`CursorStore`] folds pages into forward-only pagination bounds
//! - [`RetryPolicy`] maps a failure and attempt count to the next step
//! - [`MergeReducer`] folds a page into the accumulated state
//!
//! The actual I/O (timers, HTTP, disk) is performed by `sync-client`, which
//! drives these stages from a single task.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod gate;
pub mod reducer;
pub mod retry;

pub use cursor::CursorStore;
pub use gate::TriggerComposer;
pub use reducer::{MergeReducer, DEFAULT_MAX_RETAINED};
pub use retry::{
    RetryContext, RetryDecision, RetryPolicy, DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_ATTEMPTS,
};
