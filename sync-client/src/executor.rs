//! Fetch executor.
//!
//! Issues one page request parameterized by credential and cursor, and turns
//! the answer into a decoded page or a classified [`FetchError`]:
//!
//! | Outcome                              | Result                          |
//! |--------------------------------------|---------------------------------|
//! | fresh cache entry, not conditional   | cached body, no transport call  |
//! | 2xx                                  | body, written through the cache |
//! | 304 after `If-Modified-Since`        | cached body, or an empty page   |
//! | 401                                  | `InvalidCredential`             |
//! | other 4xx                            | `ClientError`                   |
//! | anything else                        | `RateLimitedOrServerError`      |
//! | no response                          | `TransportError`                |
//! | body does not decode                 | `DecodeError`, cache evicted    |
//!
//! A conditional endpoint skips the cache lookup and always sends the request,
//! with `If-Modified-Since` once a marker is known.
//!
//! The executor is cheap to clone; the pipeline driver hands a clone to each
//! in-flight request. The `Last-Modified` marker seen by a request is returned
//! with the page rather than stored, so a superseded request cannot move it.
//! Only pages carry a marker: a 2xx, or a 304 answering a conditional request.
//! Any other 3xx is a failure and its marker is dropped.

use std::sync::Arc;
use std::time::Duration;

use feedsync_types::{decode_page, Credential, Cursor, FetchError, ItemId, SyncItem};
use reqwest::Url;

use crate::cache::ResponseCache;
use crate::config::{CredentialPlacement, Endpoint};
use crate::transport::{HttpRequest, HttpTransport};

/// Where the body of a page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    /// A fresh transport response.
    Network,
    /// The response cache, without a transport call.
    Cache,
    /// A `304 Not Modified` answer to a conditional request.
    NotModified,
}

/// Undecoded result of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Request URL (cache key before normalization)
    pub url: String,
    /// Response body, possibly empty
    pub body: Vec<u8>,
    /// Where the body came from
    pub source: PageSource,
    /// `Last-Modified` value of the response, if any
    pub last_modified: Option<String>,
}

/// Decoded result of one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Where the body came from
    pub source: PageSource,
    /// `Last-Modified` value of the response, if any
    pub last_modified: Option<String>,
}

/// Performs page fetches against one endpoint.
#[derive(Clone)]
pub struct FetchExecutor {
    endpoint: Arc<Endpoint>,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<ResponseCache>,
    cache_ttl: Option<Duration>,
    last_modified: Option<String>,
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("endpoint", &self.endpoint.url)
            .field("cache_entries", &self.cache.len())
            .field("cache_ttl", &self.cache_ttl)
            .field("last_modified", &self.last_modified)
            .finish()
    }
}

impl FetchExecutor {
    /// Create an executor for `endpoint`.
    pub fn new(
        endpoint: Endpoint,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<ResponseCache>,
        cache_ttl: Option<Duration>,
    ) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            transport,
            cache,
            cache_ttl,
            last_modified: None,
        }
    }

    /// The endpoint this executor fetches from.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Last committed `Last-Modified` marker.
    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    /// Commit a new `Last-Modified` marker (or clear it).
    pub fn set_last_modified(&mut self, marker: Option<String>) {
        self.last_modified = marker;
    }

    /// Build the GET request for one page.
    ///
    /// Query parameters are emitted in sorted order. Cursor parameters are
    /// only sent once something has been observed.
    pub fn build_request<I: ItemId>(
        &self,
        credential: &Credential,
        cursor: &Cursor<I>,
    ) -> Result<HttpRequest, FetchError> {
        let mut url = Url::parse(&self.endpoint.url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", self.endpoint.url, e)))?;

        let mut params: std::collections::BTreeMap<String, String> =
            url.query_pairs().into_owned().collect();
        params.extend(self.endpoint.query.clone());

        if !cursor.is_none() {
            if let Some(name) = &self.endpoint.newer_param {
                params.insert(name.clone(), cursor.max_seen_id().to_string());
            }
            if let Some(name) = &self.endpoint.older_param {
                params.insert(name.clone(), cursor.min_seen_id().to_string());
            }
        }

        if let CredentialPlacement::QueryParam { name } = &self.endpoint.credential {
            params.insert(name.clone(), credential.as_str().to_string());
        }

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&params);
        }

        let mut request =
            HttpRequest::new(url.to_string()).with_header("Accept", "application/json");
        if self.endpoint.credential == CredentialPlacement::BearerHeader {
            request =
                request.with_header("Authorization", format!("Bearer {}", credential.as_str()));
        }
        if self.endpoint.conditional {
            if let Some(marker) = &self.last_modified {
                request = request.with_header("If-Modified-Since", marker.clone());
            }
        }
        Ok(request)
    }

    /// Fetch one page without decoding it.
    pub async fn execute<I: ItemId>(
        &self,
        credential: &Credential,
        cursor: &Cursor<I>,
    ) -> Result<RawPage, FetchError> {
        let request = self.build_request(credential, cursor)?;
        let url = request.url.clone();

        // Conditional endpoints always ask; the cache only backs a 304
        let cached = if self.endpoint.conditional {
            None
        } else {
            self.cache.entry(&url)
        };
        if let Some(entry) = cached {
            let fresh = self
                .cache_ttl
                .map_or(true, |ttl| entry.stored_at.elapsed() < ttl);
            if fresh {
                tracing::debug!("Cache hit for {}", self.endpoint.url);
                return Ok(RawPage {
                    url,
                    body: entry.payload,
                    source: PageSource::Cache,
                    last_modified: None,
                });
            }
            tracing::debug!("Cached entry for {} is stale, revalidating", self.endpoint.url);
        }

        let response = self
            .transport
            .get(&request)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let last_modified = response.header("Last-Modified").map(str::to_string);

        match response.status {
            200..=299 => {
                self.cache.store(&url, response.body.clone());
                Ok(RawPage {
                    url,
                    body: response.body,
                    source: PageSource::Network,
                    last_modified,
                })
            }
            304 if request.header("If-Modified-Since").is_some() => {
                tracing::debug!("{} not modified", self.endpoint.url);
                let body = match self.cache.lookup(&url) {
                    Some(body) => {
                        // Revalidated, restart its TTL
                        self.cache.store(&url, body.clone());
                        body
                    }
                    None => Vec::new(),
                };
                Ok(RawPage {
                    url,
                    body,
                    source: PageSource::NotModified,
                    last_modified,
                })
            }
            status => Err(FetchError::from_status(status)),
        }
    }

    /// Fetch and decode one page.
    ///
    /// A body that fails to decode is evicted from the cache so the retry
    /// goes back to the network.
    pub async fn fetch_page<T: SyncItem>(
        &self,
        credential: &Credential,
        cursor: &Cursor<T::Id>,
    ) -> Result<FetchedPage<T>, FetchError> {
        let raw = self.execute(credential, cursor).await?;

        match decode_page(&raw.body, &self.endpoint.payload) {
            Ok(items) => Ok(FetchedPage {
                items,
                source: raw.source,
                last_modified: raw.last_modified,
            }),
            Err(e) => {
                if self.cache.invalidate(&raw.url) {
                    tracing::debug!("Evicted undecodable cache entry for {}", self.endpoint.url);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, MockTransport};
    use feedsync_types::ErrorKind;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tweet {
        id: i64,
    }

    impl SyncItem for Tweet {
        type Id = i64;

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn executor(endpoint: Endpoint, transport: &MockTransport) -> FetchExecutor {
        FetchExecutor::new(
            endpoint,
            Arc::new(transport.clone()),
            Arc::new(ResponseCache::new()),
            None,
        )
    }

    fn key() -> Credential {
        Credential::new("token")
    }

    // ===========================================
    // Request Building Tests
    // ===========================================

    #[test]
    fn first_request_has_no_cursor_params() {
        let transport = MockTransport::new();
        let exec = executor(Endpoint::list_timeline("icanzilb", "RxSwift"), &transport);

        let request = exec.build_request(&key(), &Cursor::<i64>::none()).unwrap();
        assert_eq!(
            request.url,
            "https://api.twitter.com/1.1/lists/statuses.json?owner_screen_name=icanzilb&slug=RxSwift"
        );
        assert_eq!(request.header("Authorization"), Some("Bearer token"));
    }

    #[test]
    fn cursor_params_are_sorted_into_query() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("https://api.test/items")
            .with_query("user", "a")
            .with_cursor_params(Some("since_id"), Some("max_id"));
        let exec = executor(endpoint, &transport);

        let request = exec.build_request(&key(), &Cursor::new(4i64, 7)).unwrap();
        assert_eq!(
            request.url,
            "https://api.test/items?max_id=4&since_id=7&user=a"
        );
    }

    #[test]
    fn query_param_credential() {
        let transport = MockTransport::new();
        let exec = executor(Endpoint::city_weather("Paris"), &transport);

        let request = exec.build_request(&key(), &Cursor::<i64>::none()).unwrap();
        assert!(request.url.contains("appid=token"));
        assert!(request.url.contains("q=Paris"));
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn conditional_header_sent_when_marker_known() {
        let transport = MockTransport::new();
        let mut exec = executor(Endpoint::repo_events("ReactiveX/RxSwift"), &transport);

        let request = exec.build_request(&key(), &Cursor::<i64>::none()).unwrap();
        assert_eq!(request.header("If-Modified-Since"), None);

        exec.set_last_modified(Some("Wed, 21 Oct 2015 07:28:00 GMT".into()));
        let request = exec.build_request(&key(), &Cursor::<i64>::none()).unwrap();
        assert_eq!(
            request.header("If-Modified-Since"),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[test]
    fn bad_endpoint_url_is_client_error() {
        let transport = MockTransport::new();
        let exec = executor(Endpoint::new("not a url"), &transport);
        let err = exec.build_request(&key(), &Cursor::<i64>::none()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientError);
    }

    // ===========================================
    // Classification Tests
    // ===========================================

    #[tokio::test]
    async fn success_decodes_page() {
        let transport = MockTransport::new();
        transport.queue_json(r#"[{"id":7},{"id":6}]"#);
        let exec = executor(Endpoint::new("https://api.test/items"), &transport);

        let page: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(page.items, vec![Tweet { id: 7 }, Tweet { id: 6 }]);
        assert_eq!(page.source, PageSource::Network);
    }

    #[tokio::test]
    async fn statuses_are_classified() {
        let cases = [
            (401, ErrorKind::InvalidCredential),
            (403, ErrorKind::ClientError),
            (404, ErrorKind::ClientError),
            (500, ErrorKind::RateLimitedOrServerError),
            (503, ErrorKind::RateLimitedOrServerError),
            (304, ErrorKind::RateLimitedOrServerError),
        ];

        for (status, kind) in cases {
            let transport = MockTransport::new();
            transport.queue_status(status);
            let exec = executor(Endpoint::new("https://api.test/items"), &transport);

            let err = exec
                .fetch_page::<Tweet>(&key(), &Cursor::none())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), kind, "status {}", status);
        }
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let transport = MockTransport::new();
        transport.queue_failure("refused");
        let exec = executor(Endpoint::new("https://api.test/items"), &transport);

        let err = exec
            .fetch_page::<Tweet>(&key(), &Cursor::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    // ===========================================
    // Cache Tests
    // ===========================================

    #[tokio::test]
    async fn cache_hit_avoids_transport() {
        let transport = MockTransport::new();
        let cache = Arc::new(ResponseCache::new());
        let exec = FetchExecutor::new(
            Endpoint::new("https://api.test/items"),
            Arc::new(transport.clone()),
            Arc::clone(&cache),
            None,
        );
        let url = exec
            .build_request(&key(), &Cursor::<i64>::none())
            .unwrap()
            .url;

        cache.store(&url, br#"[{"id":1}]"#.to_vec());
        cache.store(&url, br#"[{"id":2}]"#.to_vec());

        let page: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(page.items, vec![Tweet { id: 2 }]);
        assert_eq!(page.source, PageSource::Cache);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn success_writes_through_cache() {
        let transport = MockTransport::new();
        transport.queue_json(r#"[{"id":1}]"#);
        let exec = executor(Endpoint::new("https://api.test/items"), &transport);

        exec.fetch_page::<Tweet>(&key(), &Cursor::none()).await.unwrap();
        let again: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();

        assert_eq!(again.source, PageSource::Cache);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let transport = MockTransport::new();
        transport.queue_status(500);
        transport.queue_json("[]");
        let exec = executor(Endpoint::new("https://api.test/items"), &transport);

        assert!(exec.fetch_page::<Tweet>(&key(), &Cursor::none()).await.is_err());
        assert!(exec.fetch_page::<Tweet>(&key(), &Cursor::none()).await.is_ok());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn decode_failure_evicts_cache_entry() {
        let transport = MockTransport::new();
        transport.queue_json(r#"[{"id":"#);
        transport.queue_json(r#"[{"id":3}]"#);
        let exec = executor(Endpoint::new("https://api.test/items"), &transport);

        let err = exec
            .fetch_page::<Tweet>(&key(), &Cursor::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        // Retry goes to the network, not the poisoned entry
        let page: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(page.items, vec![Tweet { id: 3 }]);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_is_refetched() {
        let transport = MockTransport::new();
        transport.queue_json(r#"[{"id":1}]"#);
        transport.queue_json(r#"[{"id":2}]"#);
        let exec = FetchExecutor::new(
            Endpoint::new("https://api.test/items"),
            Arc::new(transport.clone()),
            Arc::new(ResponseCache::new()),
            Some(Duration::from_secs(60)),
        );

        exec.fetch_page::<Tweet>(&key(), &Cursor::none()).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let cached: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(cached.source, PageSource::Cache);

        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(fresh.source, PageSource::Network);
        assert_eq!(fresh.items, vec![Tweet { id: 2 }]);
        assert_eq!(transport.call_count(), 2);
    }

    // ===========================================
    // Conditional Fetch Tests
    // ===========================================

    #[tokio::test]
    async fn last_modified_is_returned_not_stored() {
        let transport = MockTransport::new();
        transport.queue_response(
            HttpResponse::ok(b"[]".to_vec()).with_header("Last-Modified", "Mon, 01 Jan 2024"),
        );
        let exec = executor(Endpoint::repo_events("a/b"), &transport);

        let page: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(page.last_modified.as_deref(), Some("Mon, 01 Jan 2024"));
        assert_eq!(exec.last_modified(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn not_modified_serves_cached_body() {
        let transport = MockTransport::new();
        transport.queue_response(
            HttpResponse::ok(br#"[{"id":9}]"#.to_vec()).with_header("Last-Modified", "T1"),
        );
        transport.queue_status(304);
        let mut exec = FetchExecutor::new(
            Endpoint::repo_events("a/b"),
            Arc::new(transport.clone()),
            Arc::new(ResponseCache::new()),
            Some(Duration::from_secs(1)),
        );

        let first: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        exec.set_last_modified(first.last_modified);
        tokio::time::advance(Duration::from_secs(2)).await;

        let second: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(second.source, PageSource::NotModified);
        assert_eq!(second.items, vec![Tweet { id: 9 }]);
        assert_eq!(
            transport.last_request().unwrap().header("If-Modified-Since"),
            Some("T1")
        );
    }

    #[tokio::test]
    async fn conditional_endpoint_skips_never_expiring_cache() {
        let transport = MockTransport::new();
        transport.queue_response(
            HttpResponse::ok(br#"[{"id":9}]"#.to_vec()).with_header("Last-Modified", "T1"),
        );
        transport.queue_status(304);
        let mut exec = executor(Endpoint::repo_events("a/b"), &transport);

        let first: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(first.source, PageSource::Network);
        exec.set_last_modified(first.last_modified);

        let second: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(second.source, PageSource::NotModified);
        assert_eq!(second.items, vec![Tweet { id: 9 }]);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(
            transport.last_request().unwrap().header("If-Modified-Since"),
            Some("T1")
        );
    }

    #[tokio::test]
    async fn redirect_is_failure_and_drops_marker() {
        let transport = MockTransport::new();
        transport.queue_response(HttpResponse::status(302).with_header("Last-Modified", "T9"));
        let mut exec = executor(Endpoint::repo_events("a/b"), &transport);
        exec.set_last_modified(Some("T0".into()));

        let err = exec
            .fetch_page::<Tweet>(&key(), &Cursor::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitedOrServerError);
        assert_eq!(exec.last_modified(), Some("T0"));
    }

    #[tokio::test]
    async fn not_modified_without_cache_is_empty_page() {
        let transport = MockTransport::new();
        transport.queue_status(304);
        let mut exec = executor(Endpoint::repo_events("a/b"), &transport);
        exec.set_last_modified(Some("T0".into()));

        let page: FetchedPage<Tweet> = exec.fetch_page(&key(), &Cursor::none()).await.unwrap();
        assert_eq!(page.source, PageSource::NotModified);
        assert!(page.items.is_empty());
    }
}
