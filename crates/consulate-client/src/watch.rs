//! Watches: a continuous change feed built from repeated blocking queries.
//!
//! A watch runs one background task that issues a blocking query, waits for
//! the agent to answer, decides whether the resource actually changed, and
//! feeds the new index into the next query. Only real content changes reach
//! the consumer; index-only churn is absorbed.
//!
//! ```no_run
//! use consulate_client::{ConsulClient, BlockingQueryOptions};
//!
//! # async fn example() -> consulate_client::Result<()> {
//! let client = ConsulClient::localhost()?;
//! let watcher = client.kv().watch_key("config/feature-flags", BlockingQueryOptions::new());
//! let mut updates = watcher.updates()?;
//! watcher.start()?;
//!
//! while let Some(update) = updates.recv().await {
//!     println!("index {}: {:?}", update.index, update.payload);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blocking::{
    BlockingQueryExecutor, BlockingQueryOptions, ConsistencyIndex, QueryResult, ResourceRef,
};
use crate::codec::ResourceCodec;
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning for a watch loop.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Wait requested on every blocking query after the first.
    pub wait: Duration,
    /// Consecutive retryable failures tolerated before the watch stops.
    pub retry_budget: u32,
    /// First retry delay; doubles on each consecutive failure.
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
    /// Consecutive undecodable responses tolerated before the watch stops.
    pub decode_failure_threshold: u32,
    /// Delay between requests to endpoints that report no index.
    pub poll_interval: Duration,
    /// Updates buffered between the loop and the consumer.
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(60),
            retry_budget: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(3),
            decode_failure_threshold: 3,
            poll_interval: Duration::from_secs(5),
            channel_capacity: 16,
        }
    }
}

impl WatchConfig {
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_decode_failure_threshold(mut self, threshold: u32) -> Self {
        self.decode_failure_threshold = threshold;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Change detection
// ─────────────────────────────────────────────────────────────────────────────

/// What the tracker concluded about one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First answer, or the content changed.
    Deliver,
    /// The index went backwards; delivered regardless of content.
    DeliverAfterReset { previous: ConsistencyIndex },
    /// Same index as before: the wait elapsed with nothing new.
    Unchanged,
    /// The index moved but the content is identical.
    IndexOnly,
}

impl Observation {
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            Observation::Deliver | Observation::DeliverAfterReset { .. }
        )
    }
}

/// Tracks the last index and last delivered state of one watched resource.
///
/// Synchronous and side-effect free, so the delivery rules can be tested
/// without a runtime.
pub struct ChangeTracker<C: ResourceCodec> {
    codec: Arc<C>,
    last_index: ConsistencyIndex,
    delivered: Option<C::Item>,
}

impl<C: ResourceCodec> ChangeTracker<C> {
    pub fn new(codec: Arc<C>, seed: ConsistencyIndex) -> Self {
        Self {
            codec,
            last_index: seed,
            delivered: None,
        }
    }

    pub fn last_index(&self) -> ConsistencyIndex {
        self.last_index
    }

    /// Fold one answer into the tracker.
    ///
    /// Index zero comes from endpoints without blocking support; for those
    /// only the content comparison decides.
    pub fn observe(&mut self, result: &QueryResult<C::Item>) -> Observation {
        let index = result.index;

        let Some(previous_payload) = &self.delivered else {
            self.accept(result);
            return Observation::Deliver;
        };

        if index < self.last_index {
            let previous = self.last_index;
            self.accept(result);
            return Observation::DeliverAfterReset { previous };
        }

        if index == self.last_index && !index.is_zero() {
            return Observation::Unchanged;
        }

        if self.codec.equals(previous_payload, &result.payload) {
            let moved = index != self.last_index;
            self.last_index = index;
            return if moved {
                Observation::IndexOnly
            } else {
                Observation::Unchanged
            };
        }

        self.accept(result);
        Observation::Deliver
    }

    fn accept(&mut self, result: &QueryResult<C::Item>) {
        self.last_index = result.index;
        self.delivered = Some(result.payload.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a watcher. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherState::Created => f.write_str("created"),
            WatcherState::Running => f.write_str("running"),
            WatcherState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Observable status of a watcher.
#[derive(Debug, Clone)]
pub struct WatcherStatus {
    pub state: WatcherState,
    /// Written only by the watch loop.
    pub last_index: ConsistencyIndex,
    /// Why the watch stopped, if it stopped on its own.
    pub error: Option<Error>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch loop
// ─────────────────────────────────────────────────────────────────────────────

struct WatchLoop<C: ResourceCodec> {
    executor: BlockingQueryExecutor,
    resource: ResourceRef,
    codec: Arc<C>,
    config: WatchConfig,
    initial: BlockingQueryOptions,
    tracker: ChangeTracker<C>,
    status: Arc<watch::Sender<WatcherStatus>>,
    sink: mpsc::Sender<QueryResult<C::Item>>,
    cancel: CancellationToken,
}

impl<C: ResourceCodec> WatchLoop<C> {
    async fn run(mut self) {
        tracing::debug!(path = %self.resource, "Watch started");

        let outcome = self.drive().await;

        let error = outcome.err();
        match &error {
            Some(err) => tracing::error!(path = %self.resource, error = %err, "Watch stopped"),
            None => tracing::debug!(path = %self.resource, "Watch cancelled"),
        }
        self.status.send_modify(|status| {
            status.state = WatcherState::Stopped;
            if error.is_some() {
                status.error = error;
            }
        });
    }

    /// Loop until cancelled or a terminal error. `Ok` means a clean stop.
    async fn drive(&mut self) -> Result<()> {
        let mut options = self.initial;
        let mut failures = 0u32;
        let mut decode_failures = 0u32;
        let mut backoff = self.config.initial_backoff;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                outcome = self.executor.execute(&self.resource, &options, self.codec.as_ref()) => outcome,
            };

            match outcome {
                Ok(result) => {
                    failures = 0;
                    decode_failures = 0;
                    backoff = self.config.initial_backoff;

                    let polling = result.index.is_zero();
                    if !self.handle_result(result).await {
                        return Ok(());
                    }

                    options = BlockingQueryOptions {
                        index: self.tracker.last_index(),
                        wait: self.config.wait,
                    };

                    if polling && !self.pause(self.config.poll_interval).await {
                        return Ok(());
                    }
                }
                Err(Error::Decode(message)) => {
                    decode_failures += 1;
                    tracing::warn!(
                        path = %self.resource,
                        index = %options.index,
                        attempt = decode_failures,
                        error = %message,
                        "Undecodable response, retrying at same index"
                    );
                    if decode_failures >= self.config.decode_failure_threshold {
                        return Err(Error::Decode(message));
                    }
                    if !self.pause(backoff).await {
                        return Ok(());
                    }
                    backoff = next_backoff(backoff, self.config.max_backoff);
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures >= self.config.retry_budget {
                        return Err(err);
                    }
                    if let Error::Timeout(_) = err {
                        // Nothing came back at all: ask again straight away.
                        tracing::debug!(
                            path = %self.resource,
                            index = %options.index,
                            attempt = failures,
                            "Blocking query deadline elapsed, re-issuing"
                        );
                        continue;
                    }
                    tracing::warn!(
                        path = %self.resource,
                        attempt = failures,
                        max_retries = self.config.retry_budget,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Blocking query failed, retrying"
                    );
                    if !self.pause(backoff).await {
                        return Ok(());
                    }
                    backoff = next_backoff(backoff, self.config.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply one successful answer. Returns `false` when the watch should end.
    async fn handle_result(&mut self, result: QueryResult<C::Item>) -> bool {
        let observation = self.tracker.observe(&result);
        let index = self.tracker.last_index();
        self.status.send_modify(|status| status.last_index = index);

        match observation {
            Observation::DeliverAfterReset { previous } => {
                let reset = Error::IndexReset {
                    previous,
                    current: index,
                };
                tracing::info!(path = %self.resource, "{}", reset);
            }
            Observation::IndexOnly => {
                tracing::debug!(path = %self.resource, index = %index, "Index moved without content change");
                return true;
            }
            Observation::Unchanged => {
                tracing::trace!(path = %self.resource, index = %index, "No change");
                return true;
            }
            Observation::Deliver => {}
        }

        tracing::debug!(path = %self.resource, index = %index, "Delivering update");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.sink.send(result) => sent.is_ok(),
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumer side
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered update feed of one watcher.
///
/// Yields nothing once the watcher has been stopped, even if updates produced
/// before the stop are still buffered.
pub struct Updates<T> {
    rx: mpsc::Receiver<QueryResult<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Updates<T> {
    /// Next update, or `None` when the watch is over.
    pub async fn recv(&mut self) -> Option<QueryResult<T>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Turn the feed into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = QueryResult<T>> + Send {
        futures::stream::unfold(self, |mut updates| async move {
            updates.recv().await.map(|item| (item, updates))
        })
    }
}

impl<T> fmt::Debug for Updates<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updates")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to one running (or runnable) watch.
///
/// Dropping the handle stops the watch.
pub struct WatcherHandle<T> {
    resource: ResourceRef,
    pending: Mutex<Option<BoxFuture<'static, ()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    updates: Mutex<Option<Updates<T>>>,
    status: Arc<watch::Sender<WatcherStatus>>,
    cancel: CancellationToken,
}

impl<T: Clone + Send + Sync + 'static> WatcherHandle<T> {
    /// Create a watcher in the `Created` state. Nothing is sent until
    /// [`start`](Self::start).
    pub fn new<C>(
        executor: BlockingQueryExecutor,
        resource: ResourceRef,
        initial: BlockingQueryOptions,
        codec: C,
        config: WatchConfig,
    ) -> Self
    where
        C: ResourceCodec<Item = T>,
    {
        let (status, _) = watch::channel(WatcherStatus {
            state: WatcherState::Created,
            last_index: initial.index,
            error: None,
        });
        let status = Arc::new(status);
        let cancel = CancellationToken::new();
        let (sink, rx) = mpsc::channel(config.channel_capacity.max(1));
        let codec = Arc::new(codec);

        let watch_loop = WatchLoop {
            executor,
            resource: resource.clone(),
            tracker: ChangeTracker::new(codec.clone(), initial.index),
            codec,
            config,
            initial,
            status: status.clone(),
            sink,
            cancel: cancel.clone(),
        };

        Self {
            resource,
            pending: Mutex::new(Some(watch_loop.run().boxed())),
            task: Mutex::new(None),
            updates: Mutex::new(Some(Updates {
                rx,
                cancel: cancel.clone(),
            })),
            status,
            cancel,
        }
    }

    /// Start the watch loop.
    ///
    /// No-op when already running; fails once stopped.
    pub fn start(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        match self.state() {
            WatcherState::Running => return Ok(()),
            WatcherState::Stopped => {
                return Err(Error::InvalidState(format!(
                    "watch on {} is stopped; create a new watcher",
                    self.resource
                )));
            }
            WatcherState::Created => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::InvalidState("no tokio runtime to run the watch".to_string()))?;
        let Some(future) = pending.take() else {
            return Err(Error::InvalidState(format!(
                "watch on {} has no loop to start",
                self.resource
            )));
        };

        self.status
            .send_modify(|status| status.state = WatcherState::Running);
        *self.task.lock() = Some(runtime.spawn(future));
        Ok(())
    }

    /// Stop the watch. Idempotent.
    ///
    /// An in-flight query is abandoned; nothing is delivered after this
    /// returns.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.pending.lock().take();
        self.status
            .send_modify(|status| status.state = WatcherState::Stopped);
    }

    /// Take the update feed. Only one consumer per watcher.
    pub fn updates(&self) -> Result<Updates<T>> {
        self.updates.lock().take().ok_or_else(|| {
            Error::InvalidState(format!(
                "updates for {} were already taken",
                self.resource
            ))
        })
    }

    /// Deliver updates to a callback, one at a time, in order.
    ///
    /// Takes the update feed, so it excludes [`updates`](Self::updates).
    pub fn on_update<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(QueryResult<T>) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::InvalidState("no tokio runtime to run the callback".to_string()))?;
        let mut updates = self.updates()?;
        runtime.spawn(async move {
            while let Some(update) = updates.recv().await {
                callback(update);
            }
        });
        Ok(())
    }

    pub fn state(&self) -> WatcherState {
        self.status.borrow().state
    }

    pub fn last_index(&self) -> ConsistencyIndex {
        self.status.borrow().last_index
    }

    /// Terminal error, if the watch stopped on its own.
    pub fn error(&self) -> Option<Error> {
        self.status.borrow().error.clone()
    }

    /// Snapshot of the watcher status.
    pub fn status(&self) -> WatcherStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<WatcherStatus> {
        self.status.subscribe()
    }

    /// Wait until the watch is stopped; returns the terminal error, if any.
    pub async fn stopped(&self) -> Option<Error> {
        let mut rx = self.status.subscribe();
        // The `Ref` borrows `rx`, so release it before returning.
        let error = match rx
            .wait_for(|status| status.state == WatcherState::Stopped)
            .await
        {
            Ok(status) => status.error.clone(),
            Err(_) => None,
        };
        error
    }

    /// Stop and wait for the loop task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

impl<T> Drop for WatcherHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> fmt::Debug for WatcherHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.borrow();
        f.debug_struct("WatcherHandle")
            .field("resource", &self.resource)
            .field("state", &status.state)
            .field("last_index", &status.last_index)
            .finish()
    }
}
