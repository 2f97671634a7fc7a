//! Blocking queries: one long-poll request against a consistency index.
//!
//! The agent holds a request carrying `index=N` open until the resource's
//! index moves past `N` or the `wait` duration elapses, then answers with the
//! current state and index. [`BlockingQueryExecutor`] issues exactly one such
//! request and turns the answer into a [`QueryResult`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::ResourceCodec;
use crate::error::{Error, Result};
use crate::transport::{Method, Transport, TransportRequest};

/// Longest wait the agent honours.
pub const MAX_WAIT: Duration = Duration::from_secs(600);

/// Wait the agent applies when a blocking request names no `wait`.
pub const AGENT_DEFAULT_WAIT: Duration = Duration::from_secs(300);

/// Margin added to the requested wait before the client gives up on a request.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// Deadline for non-blocking requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Index and options
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque recency tag the agent attaches to every read.
///
/// Zero means "no history": a request at index zero returns immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsistencyIndex(u64);

impl ConsistencyIndex {
    pub const ZERO: ConsistencyIndex = ConsistencyIndex(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ConsistencyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConsistencyIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Parameters of one blocking request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockingQueryOptions {
    /// Last index the caller has seen; zero for "answer immediately".
    pub index: ConsistencyIndex,
    /// How long the agent may hold the request; zero for the agent default.
    pub wait: Duration,
}

impl BlockingQueryOptions {
    /// Non-blocking options (index 0, no wait).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = ConsistencyIndex::new(index);
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Whether the agent will hold this request open.
    pub fn is_blocking(&self) -> bool {
        !self.index.is_zero()
    }

    /// The wait the agent will actually apply.
    pub fn effective_wait(&self) -> Duration {
        if self.wait.is_zero() {
            AGENT_DEFAULT_WAIT
        } else {
            self.wait.min(MAX_WAIT)
        }
    }

    /// `index`/`wait` query parameters; empty for non-blocking requests.
    pub fn query(&self) -> Vec<(String, String)> {
        if !self.is_blocking() {
            return Vec::new();
        }
        let mut query = vec![("index".to_string(), self.index.to_string())];
        if !self.wait.is_zero() {
            query.push(("wait".to_string(), format_wait(self.wait.min(MAX_WAIT))));
        }
        query
    }
}

/// Render a wait duration the way the agent parses it (`90s`, `250ms`).
pub fn format_wait(wait: Duration) -> String {
    if wait.subsec_millis() == 0 {
        format!("{}s", wait.as_secs())
    } else {
        format!("{}ms", wait.as_millis())
    }
}

/// A decoded resource state and the index it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult<T> {
    pub payload: T,
    pub index: ConsistencyIndex,
}

impl<T> QueryResult<T> {
    pub fn new(payload: T, index: u64) -> Self {
        Self {
            payload,
            index: ConsistencyIndex::new(index),
        }
    }

    /// Transform the payload, keeping the index.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        QueryResult {
            payload: f(self.payload),
            index: self.index,
        }
    }
}

/// Endpoint a blocking query reads: path under `/v1/` plus fixed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ResourceRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Add a fixed query parameter (e.g. `recurse`).
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn extend_query(mut self, params: Vec<(String, String)>) -> Self {
        self.query.extend(params);
        self
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Issues single blocking queries through a shared transport.
#[derive(Clone)]
pub struct BlockingQueryExecutor {
    transport: Arc<dyn Transport>,
    grace: Duration,
    request_timeout: Duration,
}

impl BlockingQueryExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            grace: DEFAULT_GRACE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the margin added to the wait before a request is abandoned.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Set the deadline for non-blocking requests.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The transport this executor sends through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Client-side deadline for a request with these options.
    ///
    /// Always strictly greater than the wait: the agent adds up to
    /// `wait / 16` of jitter on top of it.
    pub fn deadline(&self, options: &BlockingQueryOptions) -> Duration {
        if !options.is_blocking() {
            return self.request_timeout;
        }
        let wait = options.effective_wait();
        wait + wait / 16 + self.grace
    }

    /// Run one query and decode the answer.
    ///
    /// A missing index header yields index zero: the endpoint does not
    /// support blocking and the caller has to poll.
    pub async fn execute<C: ResourceCodec>(
        &self,
        resource: &ResourceRef,
        options: &BlockingQueryOptions,
        codec: &C,
    ) -> Result<QueryResult<C::Item>> {
        let deadline = self.deadline(options);
        let request = TransportRequest::new(Method::Get, resource.path.clone())
            .extend_query(resource.query.iter().cloned())
            .extend_query(options.query())
            .timeout(deadline);

        tracing::debug!(
            path = %resource.path,
            index = %options.index,
            wait_ms = options.wait.as_millis() as u64,
            "Issuing blocking query"
        );

        let response = tokio::time::timeout(deadline, self.transport.send(request))
            .await
            .map_err(|_| Error::Timeout(deadline))??;

        let index = response.index();
        let payload = if response.is_success() {
            codec.decode(&response.body)?
        } else if response.status == 404 && response.has_index() {
            // Absent resource, e.g. a key that does not exist yet.
            codec.decode(&[])?
        } else {
            return Err(Error::Api {
                status: response.status,
                message: response.text(),
            });
        };

        tracing::trace!(path = %resource.path, index = %index, "Blocking query answered");
        Ok(QueryResult { payload, index })
    }
}

impl fmt::Debug for BlockingQueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueryExecutor")
            .field("grace", &self.grace)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, KeyValueCodec};
    use crate::transport::{MockReply, MockTransport, TransportResponse};
    use serde_json::json;

    fn executor(mock: &Arc<MockTransport>) -> BlockingQueryExecutor {
        BlockingQueryExecutor::new(mock.clone())
    }

    #[test]
    fn test_options_query_params() {
        assert!(BlockingQueryOptions::new().query().is_empty());

        let opts = BlockingQueryOptions::new()
            .with_index(42)
            .with_wait(Duration::from_secs(60));
        assert_eq!(
            opts.query(),
            vec![
                ("index".to_string(), "42".to_string()),
                ("wait".to_string(), "60s".to_string())
            ]
        );

        let opts = BlockingQueryOptions::new().with_index(1);
        assert_eq!(opts.query(), vec![("index".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_wait_is_clamped() {
        let opts = BlockingQueryOptions::new()
            .with_index(1)
            .with_wait(Duration::from_secs(3600));
        assert_eq!(opts.effective_wait(), MAX_WAIT);
        assert_eq!(opts.query()[1].1, "600s");
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(Duration::from_secs(5)), "5s");
        assert_eq!(format_wait(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_deadline_exceeds_wait() {
        let exec = BlockingQueryExecutor::new(Arc::new(MockTransport::default()))
            .with_grace(Duration::from_secs(5));

        let opts = BlockingQueryOptions::new()
            .with_index(3)
            .with_wait(Duration::from_secs(160));
        assert_eq!(exec.deadline(&opts), Duration::from_secs(175));

        assert_eq!(
            exec.deadline(&BlockingQueryOptions::new()),
            DEFAULT_REQUEST_TIMEOUT
        );

        let default_wait = BlockingQueryOptions::new().with_index(3);
        assert!(exec.deadline(&default_wait) > AGENT_DEFAULT_WAIT);
    }

    #[tokio::test]
    async fn test_execute_decodes_payload_and_index() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(
            12,
            json!(["a", "b"]),
        )]));
        let result = executor(&mock)
            .execute(
                &ResourceRef::new("kv/app").with_query("keys", ""),
                &BlockingQueryOptions::new().with_index(10),
                &JsonCodec::<Vec<String>>::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.payload, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(result.index, ConsistencyIndex::new(12));

        let sent = &mock.requests()[0];
        assert_eq!(sent.path, "kv/app");
        assert_eq!(sent.query_value("keys"), Some(""));
        assert_eq!(sent.query_value("index"), Some("10"));
        assert!(sent.timeout.is_some());
    }

    #[tokio::test]
    async fn test_execute_missing_index_is_zero() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(200, "[]"),
        )]));
        let result = executor(&mock)
            .execute(
                &ResourceRef::new("agent/members"),
                &BlockingQueryOptions::new(),
                &JsonCodec::<Vec<String>>::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.index, ConsistencyIndex::ZERO);
    }

    #[tokio::test]
    async fn test_execute_404_with_index_is_absent_key() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(404, "").with_index(8),
        )]));
        let result = executor(&mock)
            .execute(
                &ResourceRef::new("kv/missing"),
                &BlockingQueryOptions::new(),
                &KeyValueCodec,
            )
            .await
            .unwrap();
        assert_eq!(result.payload, None);
        assert_eq!(result.index, ConsistencyIndex::new(8));
    }

    #[tokio::test]
    async fn test_execute_error_taxonomy() {
        let mock = Arc::new(MockTransport::new(vec![
            MockReply::transport_error("connection refused"),
            MockReply::Respond(TransportResponse::new(200, "{oops").with_index(3)),
            MockReply::Respond(TransportResponse::new(403, "ACL not found")),
        ]));
        let exec = executor(&mock);
        let resource = ResourceRef::new("catalog/services");
        let codec = JsonCodec::<Vec<String>>::new();
        let opts = BlockingQueryOptions::new();

        let err = exec.execute(&resource, &opts, &codec).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        let err = exec.execute(&resource, &opts, &codec).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = exec.execute(&resource, &opts, &codec).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 403, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out_after_deadline() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Hang]));
        let exec = executor(&mock).with_grace(Duration::from_secs(1));
        let opts = BlockingQueryOptions::new()
            .with_index(5)
            .with_wait(Duration::from_secs(16));

        let err = exec
            .execute(&ResourceRef::new("kv/foo"), &opts, &KeyValueCodec)
            .await
            .unwrap_err();
        match err {
            Error::Timeout(after) => assert_eq!(after, Duration::from_secs(18)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
