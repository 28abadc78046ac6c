//! Merge/dedup reducer.
//!
//! Folds one successful page into the running [`SyncState`]: new items go in
//! front of the retained ones, duplicates by id keep the first (newest)
//! occurrence, the result is ordered by descending id and truncated to the
//! retention limit. The cursor store is advanced with the page.

use std::collections::HashSet;

use feedsync_types::{SyncItem, SyncState};

use crate::cursor::CursorStore;

/// Default number of retained items.
pub const DEFAULT_MAX_RETAINED: usize = 50;

/// Combines fetched pages with the accumulated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReducer {
    max_retained: usize,
}

impl MergeReducer {
    /// Create a reducer keeping at most `max_retained` items.
    pub fn new(max_retained: usize) -> Self {
        Self { max_retained }
    }

    /// Retention limit.
    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    /// Merge `page` into `state`, advancing `cursor`.
    ///
    /// An empty page yields an equal item list and leaves the cursor alone;
    /// the caller still publishes the result. Any previous error is cleared.
    pub fn reduce<T: SyncItem>(
        &self,
        state: &SyncState<T>,
        page: Vec<T>,
        cursor: &mut CursorStore<T::Id>,
    ) -> SyncState<T> {
        let cursor = cursor.advance(&page);

        let mut seen = HashSet::with_capacity(page.len() + state.items.len());
        let mut items: Vec<T> = page
            .into_iter()
            .chain(state.items.iter().cloned())
            .filter(|item| seen.insert(item.id()))
            .collect();

        items.sort_by(|a, b| b.id().cmp(&a.id()));
        items.truncate(self.max_retained);

        SyncState {
            items,
            cursor,
            last_error: None,
        }
    }
}

impl Default for MergeReducer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_types::{Cursor, ErrorKind};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Event {
        id: i64,
        version: u32,
    }

    impl SyncItem for Event {
        type Id = i64;

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn page(ids: &[i64]) -> Vec<Event> {
        ids.iter().map(|&id| Event { id, version: 1 }).collect()
    }

    fn ids(state: &SyncState<Event>) -> Vec<i64> {
        state.items.iter().map(|e| e.id).collect()
    }

    #[test]
    fn first_page_is_sorted_newest_first() {
        let reducer = MergeReducer::default();
        let mut cursor = CursorStore::new();
        let state = reducer.reduce(&SyncState::empty(), page(&[5, 6, 7]), &mut cursor);

        assert_eq!(ids(&state), vec![7, 6, 5]);
        assert_eq!(state.cursor, Cursor::new(4, 7));
    }

    #[test]
    fn newer_page_goes_in_front() {
        let reducer = MergeReducer::default();
        let mut cursor = CursorStore::new();
        let state = reducer.reduce(&SyncState::empty(), page(&[5, 6, 7]), &mut cursor);
        let state = reducer.reduce(&state, page(&[8]), &mut cursor);

        assert_eq!(ids(&state), vec![8, 7, 6, 5]);
        assert_eq!(state.cursor, Cursor::new(4, 8));
    }

    #[test]
    fn duplicates_keep_newest_copy() {
        let reducer = MergeReducer::default();
        let mut cursor = CursorStore::new();
        let state = reducer.reduce(&SyncState::empty(), page(&[1, 2]), &mut cursor);

        let updated = vec![Event { id: 2, version: 2 }];
        let state = reducer.reduce(&state, updated, &mut cursor);

        assert_eq!(ids(&state), vec![2, 1]);
        assert_eq!(state.items[0].version, 2);
    }

    #[test]
    fn merging_same_page_twice_is_idempotent() {
        let reducer = MergeReducer::default();
        let mut cursor = CursorStore::new();
        let once = reducer.reduce(&SyncState::empty(), page(&[3, 9, 4]), &mut cursor);
        let twice = reducer.reduce(&once, page(&[3, 9, 4]), &mut cursor);

        assert_eq!(once, twice);
    }

    #[test]
    fn retention_drops_oldest() {
        let reducer = MergeReducer::new(3);
        let mut cursor = CursorStore::new();
        let state = reducer.reduce(&SyncState::empty(), page(&[1, 2, 3, 4, 5]), &mut cursor);

        assert_eq!(ids(&state), vec![5, 4, 3]);
        // Cursor still covers the whole page
        assert_eq!(state.cursor, Cursor::new(0, 5));
    }

    #[test]
    fn retention_bound_holds_across_many_merges() {
        let reducer = MergeReducer::new(10);
        let mut cursor = CursorStore::new();
        let mut state = SyncState::empty();

        for start in (0..200).step_by(7) {
            let ids: Vec<i64> = (start..start + 7).collect();
            state = reducer.reduce(&state, page(&ids), &mut cursor);
            assert!(state.items.len() <= 10);
        }

        assert_eq!(state.items[0].id, 202);
    }

    #[test]
    fn empty_page_keeps_items_and_cursor() {
        let reducer = MergeReducer::default();
        let mut cursor = CursorStore::new();
        let state = reducer.reduce(&SyncState::empty(), page(&[5, 6, 7]), &mut cursor);
        let after = reducer.reduce(&state, Vec::new(), &mut cursor);

        assert_eq!(after, state);
        assert_eq!(cursor.current(), Cursor::new(4, 7));
    }

    #[test]
    fn success_clears_previous_error() {
        let reducer = MergeReducer::default();
        let mut cursor = CursorStore::new();
        let mut state = SyncState::empty();
        state.last_error = Some(ErrorKind::TransportError);

        let state = reducer.reduce(&state, page(&[1]), &mut cursor);
        assert_eq!(state.last_error, None);
    }
}
