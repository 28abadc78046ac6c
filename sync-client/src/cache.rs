//! Response cache shared across pipelines.
//!
//! Entries are keyed by normalized URL (query pairs sorted, fragment dropped)
//! and hold the raw body of the most recent 2xx response. Writes overwrite
//! unconditionally; concurrent writers race and the last one wins, which is
//! fine for idempotent GET bodies. A miss is never an error.
//!
//! The cache itself never expires entries. The fetch executor applies a TTL
//! when one is configured, using [`CacheEntry::stored_at`].

use dashmap::DashMap;
use reqwest::Url;
use tokio::time::Instant;

/// One cached response body.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Normalized URL
    pub key: String,
    /// Raw response body
    pub payload: Vec<u8>,
    /// When the body was stored
    pub stored_at: Instant,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("payload", &format!("[{} bytes]", self.payload.len()))
            .field("stored_at", &self.stored_at)
            .finish()
    }
}

/// URL-keyed cache of raw response bodies.
///
/// Cheap to share: wrap in an `Arc` and hand the same cache to every
/// pipeline that should see it.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached body for `url`, if any.
    pub fn lookup(&self, url: &str) -> Option<Vec<u8>> {
        self.entries
            .get(&Self::normalize_key(url))
            .map(|entry| entry.payload.clone())
    }

    /// Full cached entry for `url`, if any.
    pub fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.entries
            .get(&Self::normalize_key(url))
            .map(|entry| entry.value().clone())
    }

    /// Store the body of a successful response, replacing any previous one.
    pub fn store(&self, url: &str, payload: Vec<u8>) {
        let key = Self::normalize_key(url);
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for `url`. Returns whether one existed.
    pub fn invalidate(&self, url: &str) -> bool {
        self.entries.remove(&Self::normalize_key(url)).is_some()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical form of a URL used as cache key.
    ///
    /// Strings that do not parse as absolute URLs are used verbatim.
    pub fn normalize_key(url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };

        parsed.set_fragment(None);
        let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            pairs.sort();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
        }
        parsed.to_string()
    }
}
