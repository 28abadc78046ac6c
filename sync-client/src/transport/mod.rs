//! Transport abstraction for feedsync.
//!
//! This module provides a pluggable HTTP layer that abstracts the client
//! library doing the actual request (reqwest, mock for testing).
//!
//! # Design
//!
//! The engine only ever issues idempotent GETs, so the trait is a single
//! method: `get()` takes a fully built request (URL with query, headers) and
//! resolves to the raw status, headers and body. Classifying the status is the
//! fetch executor's job, not the transport's. A transport error means no HTTP
//! response was obtained at all.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_response(HttpResponse::ok(br#"[{"id":1}]"#.to_vec()));
//! let response = transport.get(&HttpRequest::new("https://api.test/items")).await?;
//! assert_eq!(response.status, 200);
//! ```

mod http;
mod mock;

pub use self::http::{ReqwestTransport, ReqwestTransportConfig};
pub use self::mock::{MockTransport, RecordedRequest};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request URL could not be used.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Reading the response body failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,
}

/// One HTTP GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL including the query string
    pub url: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Create a request without extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Raw HTTP response.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Raw body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response with the given status and no body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A 200 response carrying `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

// Bodies can be large, don't dump them into logs
impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &format!("[{} bytes]", self.body.len()))
            .finish()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Transport trait for issuing HTTP GET requests.
///
/// Implementations handle the underlying HTTP client (reqwest, mock, etc).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and return whatever the server answered.
    ///
    /// Non-2xx statuses are `Ok`; only failures to obtain a response are `Err`.
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let response = HttpResponse::ok(Vec::new()).with_header("Last-Modified", "yesterday");
        assert_eq!(response.header("last-modified"), Some("yesterday"));
        assert_eq!(response.header("etag"), None);

        let request = HttpRequest::new("http://x").with_header("If-Modified-Since", "then");
        assert_eq!(request.header("IF-MODIFIED-SINCE"), Some("then"));
    }

    #[test]
    fn response_debug_hides_body() {
        let response = HttpResponse::ok(b"secret body".to_vec());
        let debug = format!("{:?}", response);
        assert!(debug.contains("[11 bytes]"));
        assert!(!debug.contains("secret"));
    }
}
