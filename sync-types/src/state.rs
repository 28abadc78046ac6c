//! Published state and trigger events.

use serde::{Deserialize, Serialize};

use crate::{Credential, Cursor, ErrorKind, SyncItem};

/// The accumulated view of one synchronized collection.
///
/// Items are newest first. Only the merge reducer produces new values; every
/// other party sees it read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: SyncItem")]
pub struct SyncState<T: SyncItem> {
    /// Retained items, newest first
    pub items: Vec<T>,
    /// Pagination bounds after the last merge
    pub cursor: Cursor<T::Id>,
    /// Kind of the last terminal failure, cleared by the next success
    pub last_error: Option<ErrorKind>,
}

impl<T: SyncItem> SyncState<T> {
    /// State of a collection that has never been synchronized.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            cursor: Cursor::none(),
            last_error: None,
        }
    }

    /// Seed state from previously persisted items and cursor.
    pub fn seeded(items: Vec<T>, cursor: Cursor<T::Id>) -> Self {
        Self {
            items,
            cursor,
            last_error: None,
        }
    }
}

impl<T: SyncItem> Default for SyncState<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// An input to the trigger composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Periodic timer fired (or a manual refresh).
    Tick,
    /// Network reachability changed.
    ConnectivityChanged(bool),
    /// A credential became available.
    CredentialAvailable(Credential),
    /// The current credential is no longer usable.
    CredentialRevoked,
    /// The caller paused or resumed syncing.
    Paused(bool),
}

/// Latest value of every gate input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateState {
    /// Network is reachable
    pub online: bool,
    /// Caller has paused syncing
    pub paused: bool,
    /// Credential to fetch with, if any
    pub credential: Option<Credential>,
}

impl GateState {
    /// The credential to fetch with, when fetching is permitted right now.
    pub fn open(&self) -> Option<&Credential> {
        if self.online && !self.paused {
            self.credential.as_ref()
        } else {
            None
        }
    }

    /// Whether fetching is permitted right now.
    pub fn is_open(&self) -> bool {
        self.open().is_some()
    }
}
