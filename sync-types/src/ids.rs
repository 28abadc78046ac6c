//! Identity and ordering types for feedsync.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A totally-ordered identifier of a synchronized item.
///
/// Remote collections hand out increasing identifiers (tweet ids, event ids).
/// The cursor arithmetic needs the extremes of the type and the identifier
/// immediately below a given one.
pub trait ItemId:
    Copy
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Smallest representable identifier.
    const MIN: Self;
    /// Largest representable identifier.
    const MAX: Self;

    /// The identifier immediately below `self`, saturating at [`ItemId::MIN`].
    fn predecessor(self) -> Self;
}

macro_rules! impl_item_id {
    ($($t:ty),*) => {
        $(
            impl ItemId for $t {
                const MIN: Self = <$t>::MIN;
                const MAX: Self = <$t>::MAX;

                fn predecessor(self) -> Self {
                    self.saturating_sub(1)
                }
            }
        )*
    };
}

impl_item_id!(i64, u64, i32, u32);

/// A decoded unit of a synchronized collection.
///
/// Two items with the same [`SyncItem::id`] are the same item for
/// deduplication purposes, whatever their other fields say.
pub trait SyncItem: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier type of this collection.
    type Id: ItemId;

    /// Unique identifier of this item.
    fn id(&self) -> Self::Id;
}

/// Forward-only pagination bounds of one synchronized collection.
///
/// `max_seen_id` is the newest identifier already observed (requests ask only
/// for newer items). `min_seen_id` is the oldest boundary still eligible for
/// older-page requests. Both only ever widen.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound = "I: ItemId")]
pub struct Cursor<I: ItemId = i64> {
    min_seen_id: I,
    max_seen_id: I,
}

impl<I: ItemId> Cursor<I> {
    /// The cursor of a collection with no observations yet.
    ///
    /// This is the identity of [`Cursor::observe`]: observing any id from
    /// `none` yields bounds derived from that id alone.
    pub fn none() -> Self {
        Self {
            min_seen_id: I::MAX,
            max_seen_id: I::MIN,
        }
    }

    /// Create a cursor from explicit bounds.
    pub fn new(min_seen_id: I, max_seen_id: I) -> Self {
        Self {
            min_seen_id,
            max_seen_id,
        }
    }

    /// Whether nothing has been observed yet.
    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }

    /// Oldest boundary still eligible for older-page requests.
    pub fn min_seen_id(&self) -> I {
        self.min_seen_id
    }

    /// Newest identifier already observed.
    pub fn max_seen_id(&self) -> I {
        self.max_seen_id
    }

    /// Fold one observed identifier into the bounds.
    pub fn observe(self, id: I) -> Self {
        let min_seen_id = if id < self.min_seen_id {
            id.predecessor()
        } else {
            self.min_seen_id
        };
        Self {
            min_seen_id,
            max_seen_id: self.max_seen_id.max(id),
        }
    }
}

impl<I: ItemId> Default for Cursor<I> {
    fn default() -> Self {
        Self::none()
    }
}

impl<I: ItemId> fmt::Debug for Cursor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Cursor(none)")
        } else {
            write!(
                f,
                "Cursor(min={:?}, max={:?})",
                self.min_seen_id, self.max_seen_id
            )
        }
    }
}
