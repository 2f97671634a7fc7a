//! Transport adapter: one request/response exchange with the agent.
//!
//! Everything above this layer (executor, watch loop, endpoint wrappers) talks
//! to the agent through the [`Transport`] trait, so tests can script the agent
//! with [`MockTransport`] instead of a live HTTP server.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::blocking::ConsistencyIndex;
use crate::error::{Error, Result};

/// Response header carrying the agent's consistency index.
pub const INDEX_HEADER: &str = "x-consul-index";

/// HTTP method of a transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single request to the agent's HTTP API.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below `/v1/` (e.g. `kv/foo`).
    pub path: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Raw request body.
    pub body: Option<Vec<u8>>,
    /// Per-request deadline, if the caller wants one enforced by the transport.
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    /// Create a request with no query parameters or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters.
    pub fn extend_query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Look up the first value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response from the agent.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Create a response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// A 200 response carrying a JSON body and an index header.
    pub fn json(index: u64, value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string()).with_index(index)
    }

    /// Attach an `X-Consul-Index` header.
    pub fn with_index(self, index: u64) -> Self {
        self.with_header(INDEX_HEADER, index.to_string())
    }

    /// Attach a header (name is lowercased).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the agent sent an index header at all.
    pub fn has_index(&self) -> bool {
        self.header(INDEX_HEADER).is_some()
    }

    /// The consistency index reported by the agent; absent or garbled → 0.
    pub fn index(&self) -> ConsistencyIndex {
        self.header(INDEX_HEADER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(ConsistencyIndex::new)
            .unwrap_or_default()
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Capability to perform one request/response exchange with the agent.
///
/// Implementations must support concurrent independent requests: one
/// transport is shared by every watcher created from a client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the complete response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP transport
// ─────────────────────────────────────────────────────────────────────────────

/// reqwest-backed transport.
///
/// The inner `reqwest::Client` owns the connection pool; cloning this
/// transport (or the client holding it) shares that pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    datacenter: Option<String>,
}

impl HttpTransport {
    /// Create a transport over an existing reqwest client.
    ///
    /// `base_url` must end with `/` so relative joins keep its path.
    pub fn new(http: reqwest::Client, base_url: Url, datacenter: Option<String>) -> Self {
        Self {
            http,
            base_url,
            datacenter,
        }
    }

    /// The agent base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the full URL for an API path.
    ///
    /// Each `/`-separated segment is percent-encoded, so keys containing
    /// `?`, `#` or `%` address the key itself rather than leaking into the
    /// query string or fragment.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("cannot use {} as a base URL", self.base_url)))?
            .pop_if_empty()
            .push("v1")
            .extend(path.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = self.url(&request.path)?;

        let mut builder = self
            .http
            .request(request.method.into(), url)
            .query(&request.query);
        if let Some(dc) = &self.datacenter {
            if request.query_value("dc").is_none() {
                builder = builder.query(&[("dc", dc.as_str())]);
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let deadline = request.timeout.unwrap_or_default();
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::Timeout(deadline)
            } else {
                Error::Transport(e.to_string())
            }
        };

        let response = builder.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_err)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock transport
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockReply, MockTransport};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::{Transport, TransportRequest, TransportResponse};
    use crate::error::{Error, Result};

    /// One scripted agent reply.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Return this response.
        Respond(TransportResponse),
        /// Fail with this error.
        Fail(Error),
        /// Never answer.
        Hang,
        /// Wait, then play the inner reply.
        Delay(Duration, Box<MockReply>),
    }

    impl MockReply {
        /// A 200 JSON reply with an index header.
        pub fn json(index: u64, value: serde_json::Value) -> Self {
            MockReply::Respond(TransportResponse::json(index, &value))
        }

        /// A transport-level failure.
        pub fn transport_error(message: &str) -> Self {
            MockReply::Fail(Error::Transport(message.to_string()))
        }

        /// Delay this reply.
        pub fn after(self, delay: Duration) -> Self {
            MockReply::Delay(delay, Box::new(self))
        }
    }

    /// Scripted transport for tests.
    ///
    /// Replies are played in order. When the script runs dry, requests wait
    /// until more replies are pushed, which looks like an idle long-poll to
    /// the caller.
    #[derive(Default)]
    pub struct MockTransport {
        replies: Mutex<VecDeque<MockReply>>,
        request_log: Mutex<Vec<TransportRequest>>,
        pushed: Notify,
    }

    impl MockTransport {
        /// Create a transport that plays `replies` in order.
        pub fn new(replies: Vec<MockReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                request_log: Mutex::new(Vec::new()),
                pushed: Notify::new(),
            }
        }

        /// Queue another reply.
        pub fn push(&self, reply: MockReply) {
            self.replies.lock().push_back(reply);
            self.pushed.notify_one();
        }

        /// All requests received so far.
        pub fn requests(&self) -> Vec<TransportRequest> {
            self.request_log.lock().clone()
        }

        /// Number of requests received so far.
        pub fn request_count(&self) -> usize {
            self.request_log.lock().len()
        }

        async fn next_reply(&self) -> MockReply {
            loop {
                let next = self.replies.lock().pop_front();
                match next {
                    Some(reply) => return reply,
                    None => self.pushed.notified().await,
                }
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.request_log.lock().push(request);

            let mut reply = self.next_reply().await;
            loop {
                match reply {
                    MockReply::Respond(response) => return Ok(response),
                    MockReply::Fail(err) => return Err(err),
                    MockReply::Hang => futures::future::pending::<()>().await,
                    MockReply::Delay(delay, inner) => {
                        tokio::time::sleep(delay).await;
                        reply = *inner;
                    }
                }
            }
        }
    }
}
