//! Cursor store for feedsync.
//!
//! This module holds the forward-only pagination bounds of one synchronized
//! collection:
//! - `max_seen_id` is the newest item already seen, so the next request asks
//!   only for newer items
//! - `min_seen_id` is the oldest boundary still eligible for older-page requests
//!
//! Bounds only widen. An empty page leaves them untouched.

use feedsync_types::{Cursor, ItemId, SyncItem};

/// Holds and updates the [`Cursor`] for one pipeline.
///
/// The store is owned by a single pipeline driver and is never shared, so
/// updates are plain `&mut self` calls.
#[derive(Debug, Clone)]
pub struct CursorStore<I: ItemId = i64> {
    cursor: Cursor<I>,
}

impl<I: ItemId> CursorStore<I> {
    /// Create a store with no observations.
    pub fn new() -> Self {
        Self {
            cursor: Cursor::none(),
        }
    }

    /// Create a store starting at a specific cursor.
    ///
    /// This is useful when resuming from a persisted snapshot.
    pub fn with_cursor(cursor: Cursor<I>) -> Self {
        Self { cursor }
    }

    /// The latest committed cursor.
    pub fn current(&self) -> Cursor<I> {
        self.cursor
    }

    /// Fold a page of items into the bounds and commit the result.
    ///
    /// Returns the committed cursor.
    pub fn advance<T>(&mut self, page: &[T]) -> Cursor<I>
    where
        T: SyncItem<Id = I>,
    {
        self.cursor = page
            .iter()
            .map(SyncItem::id)
            .fold(self.cursor, Cursor::observe);
        self.cursor
    }

    /// Forget everything and start again from `cursor`.
    pub fn reset(&mut self, cursor: Cursor<I>) {
        self.cursor = cursor;
    }
}

impl<I: ItemId> Default for CursorStore<I> {
    fn default() -> Self {
        Self::new()
    }
}
