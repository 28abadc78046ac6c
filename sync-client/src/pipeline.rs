//! Sync pipeline - the driver that runs the pure stages against real I/O.
//!
//! One pipeline synchronizes one remote collection. A single spawned task
//! owns every mutable piece (gate, cursor, state, retry context) and reacts
//! to four kinds of wake-up:
//!
//! 1. the in-flight fetch finished
//! 2. a retry backoff elapsed
//! 3. a caller control (pause, credential, connectivity, refresh)
//! 4. the periodic tick
//!
//! At most one fetch is in flight. A trigger arriving while one is in flight
//! replaces it and the older result is never seen. A trigger arriving while a
//! retry backoff is pending is absorbed by that retry.
//!
//! # Example
//!
//! ```ignore
//! use feedsync_client::{Endpoint, PipelineConfig, ReqwestTransport, SyncPipeline};
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let handle = SyncPipeline::<Tweet>::new(PipelineConfig::default(), Endpoint::user_timeline("rustlang"), transport)
//!     .with_credential("token".into())
//!     .start();
//!
//! let mut states = handle.subscribe();
//! while states.changed().await.is_ok() {
//!     println!("{} tweets", states.borrow().items.len());
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use feedsync_core::{
    CursorStore, MergeReducer, RetryContext, RetryDecision, RetryPolicy, TriggerComposer,
};
use feedsync_types::{Credential, ErrorKind, FetchError, SyncItem, SyncState, TriggerEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

use crate::cache::ResponseCache;
use crate::config::{Endpoint, PipelineConfig};
use crate::executor::{FetchExecutor, FetchedPage, PageSource};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::transport::HttpTransport;

/// Capacity of the terminal error channel.
const NOTICE_CAPACITY: usize = 16;

/// A terminal failure, surfaced once the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotice {
    /// Classification of the last failure
    pub kind: ErrorKind,
    /// User-presentable message
    pub message: String,
}

impl SyncNotice {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}

/// Counters of one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Fetches started (including superseded ones)
    pub fetches: u64,
    /// Fetches served from the response cache
    pub cache_hits: u64,
    /// Fetches answered with 304
    pub not_modified: u64,
    /// Retries scheduled (backoff or credential wait)
    pub retries: u64,
    /// Terminal failures surfaced
    pub failures: u64,
    /// Pages merged into the state
    pub merges: u64,
    /// Time from the first failure to the page that ended the latest retry
    pub last_recovery: Option<Duration>,
}

/// Builder for a pipeline. Nothing runs until [`SyncPipeline::start`].
pub struct SyncPipeline<T: SyncItem> {
    config: PipelineConfig,
    endpoint: Endpoint,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<ResponseCache>,
    store: Option<Arc<dyn SnapshotStore<T>>>,
    credential: Option<Credential>,
}

impl<T: SyncItem> SyncPipeline<T> {
    /// Create a pipeline with a private response cache and no snapshot store.
    pub fn new(config: PipelineConfig, endpoint: Endpoint, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            endpoint,
            transport,
            cache: Arc::new(ResponseCache::new()),
            store: None,
            credential: None,
        }
    }

    /// Share a response cache with other pipelines.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Persist state to `store` and seed from it at startup.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore<T>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start with a credential already available.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Spawn the driver task. Must be called within a tokio runtime.
    pub fn start(self) -> PipelineHandle<T> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SyncState::empty());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        let stats = Arc::new(Mutex::new(PipelineStats::default()));

        let mut composer = TriggerComposer::new(self.config.start_online);
        if let Some(credential) = self.credential {
            // Seeding only; the first tick does the fetching
            composer.on_event(TriggerEvent::CredentialAvailable(credential));
        }

        let driver = Driver {
            composer,
            cursor: CursorStore::new(),
            reducer: MergeReducer::new(self.config.max_retained),
            policy: self.config.retry,
            executor: FetchExecutor::new(
                self.endpoint,
                self.transport,
                self.cache,
                self.config.cache_ttl,
            ),
            store: self.store,
            state: SyncState::empty(),
            state_tx,
            notice_tx: notice_tx.clone(),
            stats: Arc::clone(&stats),
            retry: None,
            fetch: None,
            fetch_generation: 0,
            backoff: None,
        };

        let ticker = if self.config.poll_period.is_zero() {
            None
        } else {
            let mut ticker = tokio::time::interval_at(
                Instant::now() + self.config.initial_delay,
                self.config.poll_period,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        };

        let task = tokio::spawn(driver.run(events_rx, ticker));

        PipelineHandle {
            events: events_tx,
            state: state_rx,
            notices: notice_tx,
            stats,
            task,
        }
    }
}

/// Control surface of a running pipeline.
///
/// Dropping the handle stops the pipeline.
pub struct PipelineHandle<T: SyncItem> {
    events: mpsc::UnboundedSender<TriggerEvent>,
    state: watch::Receiver<SyncState<T>>,
    notices: broadcast::Sender<SyncNotice>,
    stats: Arc<Mutex<PipelineStats>>,
    task: JoinHandle<()>,
}

impl<T: SyncItem> PipelineHandle<T> {
    /// Stream of published states. The latest value is available immediately.
    pub fn subscribe(&self) -> watch::Receiver<SyncState<T>> {
        self.state.clone()
    }

    /// Stream of terminal failures, from now on.
    pub fn errors(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Latest published state.
    pub fn current(&self) -> SyncState<T> {
        self.state.borrow().clone()
    }

    /// Pause or resume syncing. An in-flight fetch still completes.
    pub fn set_paused(&self, paused: bool) {
        self.send(TriggerEvent::Paused(paused));
    }

    /// Make a credential available. An empty one counts as none.
    pub fn supply_credential(&self, credential: Credential) {
        self.send(TriggerEvent::CredentialAvailable(credential));
    }

    /// Withdraw the current credential.
    pub fn revoke_credential(&self) {
        self.send(TriggerEvent::CredentialRevoked);
    }

    /// Report network reachability.
    pub fn set_online(&self, online: bool) {
        self.send(TriggerEvent::ConnectivityChanged(online));
    }

    /// Ask for a fetch now, subject to the gate.
    pub fn refresh(&self) {
        self.send(TriggerEvent::Tick);
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> PipelineStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the driver task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pipeline: cancels the in-flight request, any pending backoff
    /// and the ticker. Persisted snapshots are left as they are.
    pub fn shutdown(&self) {
        self.task.abort();
    }

    fn send(&self, event: TriggerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Pipeline stopped, dropping control event");
        }
    }
}

impl<T: SyncItem> Drop for PipelineHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<FetchedPage<T>, FetchError>> + Send>>;

/// Await the future in `slot`, or never resolve if the slot is empty.
async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct Driver<T: SyncItem> {
    composer: TriggerComposer,
    cursor: CursorStore<T::Id>,
    reducer: MergeReducer,
    policy: RetryPolicy,
    executor: FetchExecutor,
    store: Option<Arc<dyn SnapshotStore<T>>>,
    state: SyncState<T>,
    state_tx: watch::Sender<SyncState<T>>,
    notice_tx: broadcast::Sender<SyncNotice>,
    stats: Arc<Mutex<PipelineStats>>,
    retry: Option<RetryContext>,
    fetch: Option<FetchFuture<T>>,
    /// Credential generation the in-flight fetch started with.
    fetch_generation: u64,
    backoff: Option<Pin<Box<Sleep>>>,
}

impl<T: SyncItem> Driver<T> {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TriggerEvent>,
        mut ticker: Option<Interval>,
    ) {
        tracing::info!("Pipeline started for {}", self.executor.endpoint().url);
        self.seed().await;

        loop {
            tokio::select! {
                biased;

                result = poll_slot(&mut self.fetch) => {
                    self.fetch = None;
                    self.on_fetch_result(result).await;
                }
                () = poll_slot(&mut self.backoff) => {
                    self.backoff = None;
                    self.on_backoff_elapsed();
                }
                event = events.recv() => match event {
                    Some(event) => self.on_trigger(event),
                    None => break,
                },
                () = next_tick(&mut ticker) => self.on_trigger(TriggerEvent::Tick),
            }
        }

        tracing::info!("Pipeline stopped for {}", self.executor.endpoint().url);
    }

    async fn seed(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        match store.load().await {
            Ok(Some(snapshot)) => {
                tracing::info!(
                    "Seeded {} items from snapshot ({:?})",
                    snapshot.items.len(),
                    snapshot.cursor
                );
                self.cursor.reset(snapshot.cursor);
                self.executor.set_last_modified(snapshot.last_modified.clone());
                self.state = snapshot.to_state();
                self.publish();
            }
            Ok(None) => tracing::debug!("No snapshot, starting empty"),
            Err(e) => tracing::warn!("Ignoring unreadable snapshot: {}", e),
        }
    }

    fn on_trigger(&mut self, event: TriggerEvent) {
        tracing::trace!("Trigger {:?}", event);
        let Some(credential) = self.composer.on_event(event) else {
            return;
        };

        if self.backoff.is_some() {
            tracing::debug!("Trigger absorbed by pending retry");
            return;
        }
        if self.fetch.is_some() {
            tracing::debug!("Superseding in-flight fetch");
        }
        self.start_fetch(credential);
    }

    fn on_backoff_elapsed(&mut self) {
        match self.composer.gate().open().cloned() {
            Some(credential) => self.start_fetch(credential),
            None => tracing::debug!("Backoff elapsed with gate closed, retry waits for a trigger"),
        }
    }

    fn start_fetch(&mut self, credential: Credential) {
        let executor = self.executor.clone();
        let cursor = self.cursor.current();
        let attempt = self.retry.as_ref().map_or(0, |ctx| ctx.attempt + 1);

        tracing::debug!(
            "Fetching {} ({:?}, attempt {})",
            executor.endpoint().url,
            cursor,
            attempt + 1
        );
        self.bump(|stats| stats.fetches += 1);
        self.fetch_generation = self.composer.credential_generation();
        self.fetch = Some(Box::pin(async move {
            executor.fetch_page::<T>(&credential, &cursor).await
        }));
    }

    async fn on_fetch_result(&mut self, result: Result<FetchedPage<T>, FetchError>) {
        match result {
            Ok(page) => self.on_page(page).await,
            Err(error) => self.on_failure(error),
        }
    }

    async fn on_page(&mut self, page: FetchedPage<T>) {
        match page.source {
            PageSource::Cache => self.bump(|stats| stats.cache_hits += 1),
            PageSource::NotModified => self.bump(|stats| stats.not_modified += 1),
            PageSource::Network => {}
        }
        if page.last_modified.is_some() {
            self.executor.set_last_modified(page.last_modified);
        }
        if let Some(ctx) = self.retry.take() {
            let elapsed = Instant::from_std(ctx.started_at).elapsed();
            tracing::info!(
                "Recovered after {} failed attempts in {:?}",
                ctx.attempt + 1,
                elapsed
            );
            self.bump(|stats| stats.last_recovery = Some(elapsed));
        }

        let count = page.items.len();
        self.state = self
            .reducer
            .reduce(&self.state, page.items, &mut self.cursor);
        self.bump(|stats| stats.merges += 1);
        tracing::debug!(
            "Merged {} items, retaining {} ({:?})",
            count,
            self.state.items.len(),
            self.state.cursor
        );
        // A published state is already durable
        self.persist().await;
        self.publish();
    }

    fn on_failure(&mut self, error: FetchError) {
        let kind = error.kind();
        let ctx = match self.retry.take() {
            Some(mut ctx) => {
                ctx.record_failure(kind);
                ctx
            }
            None => RetryContext::new(kind, Instant::now().into_std()),
        };
        let attempt = ctx.attempt;
        let started_at = ctx.started_at;
        let decision = ctx.decide(&self.policy);
        self.retry = Some(ctx);

        match decision {
            RetryDecision::Backoff(delay) => {
                tracing::warn!(
                    "Fetch failed ({}), retrying in {:?} (attempt {}/{})",
                    error,
                    delay,
                    attempt + 1,
                    self.policy.max_attempts
                );
                self.bump(|stats| stats.retries += 1);
                self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
            }
            RetryDecision::AwaitCredential => {
                self.bump(|stats| stats.retries += 1);
                if self.composer.credential_generation() == self.fetch_generation {
                    tracing::warn!("Credential rejected, waiting for a new one");
                    self.composer.reject_credential();
                } else if let Some(credential) = self.composer.gate().open().cloned() {
                    tracing::info!("Credential rejected, retrying with the newer one");
                    self.start_fetch(credential);
                } else {
                    tracing::debug!("Credential rejected, newer one waits for the gate");
                }
            }
            RetryDecision::GiveUp => {
                tracing::error!(
                    "Fetch failed ({}), giving up after {} attempts in {:?}",
                    error,
                    attempt + 1,
                    Instant::from_std(started_at).elapsed()
                );
                self.retry = None;
                if kind == ErrorKind::InvalidCredential
                    && self.composer.credential_generation() == self.fetch_generation
                {
                    self.composer.reject_credential();
                }
                self.bump(|stats| stats.failures += 1);
                self.state.last_error = Some(kind);
                self.publish();
                // No subscribers is fine
                let _ = self.notice_tx.send(SyncNotice::new(kind));
            }
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    async fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = Snapshot::from_state(
            &self.state,
            self.executor.last_modified().map(str::to_string),
        );
        if let Err(e) = store.save(&snapshot).await {
            tracing::warn!("Failed to persist snapshot: {}", e);
        }
    }

    fn stats(&self) -> MutexGuard<'_, PipelineStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self, update: impl FnOnce(&mut PipelineStats)) {
        update(&mut self.stats());
    }
}
