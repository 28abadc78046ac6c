//! Mock transport for testing.
//!
//! Allows queueing responses and capturing issued requests for verification.

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A request seen by the mock, with the (possibly virtual) time it arrived.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request as issued
    pub request: HttpRequest,
    /// When `get()` was called
    pub at: Instant,
}

/// Mock transport for testing.
///
/// Responses are served in queue order. When the queue is empty the default
/// response is served if one is set, otherwise the call fails with
/// [`TransportError::ConnectionFailed`].
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    calls: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    requests: Vec<RecordedRequest>,
    response_queue: VecDeque<Result<HttpResponse, TransportError>>,
    default_response: Option<HttpResponse>,
    latency: Option<Duration>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response to be returned by the next `get()` call.
    pub fn queue_response(&self, response: HttpResponse) {
        self.inner().response_queue.push_back(Ok(response));
    }

    /// Queue a 200 response with a JSON body.
    pub fn queue_json(&self, body: &str) {
        self.queue_response(HttpResponse::ok(body.as_bytes().to_vec()));
    }

    /// Queue a bodyless response with the given status.
    pub fn queue_status(&self, status: u16) {
        self.queue_response(HttpResponse::status(status));
    }

    /// Cause the next queued `get()` to fail at the connection level.
    pub fn queue_failure(&self, error: &str) {
        self.inner()
            .response_queue
            .push_back(Err(TransportError::ConnectionFailed(error.to_string())));
    }

    /// Response served whenever the queue is empty.
    pub fn set_default_response(&self, response: HttpResponse) {
        self.inner().default_response = Some(response);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner().latency = Some(latency);
    }

    /// Number of `get()` calls so far.
    pub fn call_count(&self) -> usize {
        self.inner().requests.len()
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner().requests.clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.inner().requests.last().map(|r| r.request.clone())
    }

    /// Wait until at least `count` calls were made.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.calls.notified();
            if self.call_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Clear all state (requests, queue, defaults).
    pub fn reset(&self) {
        *self.inner() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            calls: Arc::clone(&self.calls),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let (outcome, latency) = {
            let mut inner = self.inner();
            inner.requests.push(RecordedRequest {
                request: request.clone(),
                at: Instant::now(),
            });

            let outcome = match inner.response_queue.pop_front() {
                Some(outcome) => outcome,
                None => inner
                    .default_response
                    .clone()
                    .ok_or_else(|| TransportError::ConnectionFailed("no queued response".into())),
            };
            (outcome, inner.latency)
        };
        self.calls.notify_waiters();

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn serves_queued_responses_in_order() {
        let transport = MockTransport::new();
        transport.queue_json("[1]");
        transport.queue_status(503);

        let request = HttpRequest::new("https://api.test/items");
        let first = transport.get(&request).await.unwrap();
        let second = transport.get(&request).await.unwrap();

        assert_eq!(first.status, 200);
        assert_eq!(first.body, b"[1]");
        assert_eq!(second.status, 503);
    }

    #[tokio::test]
    async fn records_requests() {
        let transport = MockTransport::new();
        transport.set_default_response(HttpResponse::ok(b"[]".to_vec()));

        transport
            .get(&HttpRequest::new("https://api.test/a").with_header("Authorization", "Bearer k"))
            .await
            .unwrap();
        transport
            .get(&HttpRequest::new("https://api.test/b"))
            .await
            .unwrap();

        assert_eq!(transport.call_count(), 2);
        let requests = transport.requests();
        assert_eq!(requests[0].request.header("authorization"), Some("Bearer k"));
        assert_eq!(
            transport.last_request().map(|r| r.url),
            Some("https://api.test/b".to_string())
        );
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn empty_queue_without_default_fails() {
        let transport = MockTransport::new();
        let result = transport.get(&HttpRequest::new("https://api.test")).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        // Failed calls still count
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn queued_failure_then_success() {
        let transport = MockTransport::new();
        transport.queue_failure("network unreachable");
        transport.queue_json("[]");

        let request = HttpRequest::new("https://api.test");
        assert!(transport.get(&request).await.is_err());
        assert_eq!(transport.get(&request).await.unwrap().status, 200);
    }

    // ===========================================
    // Timing Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn latency_delays_response() {
        let transport = MockTransport::new();
        transport.set_latency(Duration::from_secs(5));
        transport.queue_json("[]");

        let start = Instant::now();
        transport.get(&HttpRequest::new("https://api.test")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn wait_for_calls_returns_once_reached() {
        let transport = MockTransport::new();
        transport.set_default_response(HttpResponse::ok(b"[]".to_vec()));

        let waiter = transport.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_calls(2).await });

        let request = HttpRequest::new("https://api.test");
        transport.get(&request).await.unwrap();
        transport.get(&request).await.unwrap();

        handle.await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.queue_json("[]");
        transport2
            .get(&HttpRequest::new("https://api.test"))
            .await
            .unwrap();

        assert_eq!(transport1.call_count(), 1);
    }

    #[tokio::test]
    async fn reset_clears_all() {
        let transport = MockTransport::new();
        transport.set_default_response(HttpResponse::ok(b"[]".to_vec()));
        transport
            .get(&HttpRequest::new("https://api.test"))
            .await
            .unwrap();

        transport.reset();

        assert_eq!(transport.call_count(), 0);
        assert!(transport
            .get(&HttpRequest::new("https://api.test"))
            .await
            .is_err());
    }
}
