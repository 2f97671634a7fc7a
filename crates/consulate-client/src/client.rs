//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{AgentApi, CatalogApi, EventsApi, HealthApi, KvApi, SessionsApi, StatusApi};
use crate::blocking::{
    BlockingQueryExecutor, BlockingQueryOptions, QueryResult, ResourceRef, DEFAULT_GRACE,
};
use crate::codec::{JsonCodec, ResourceCodec};
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};
use crate::watch::{WatchConfig, WatcherHandle};

/// Default timeout for non-blocking requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default agent address.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8500";

/// Header carrying the ACL token.
const TOKEN_HEADER: &str = "x-consul-token";

/// Consul agent API client.
///
/// Cheap to clone; all clones share one transport (and its connection pool).
///
/// # Example
///
/// ```no_run
/// use consulate_client::ConsulClient;
///
/// # async fn example() -> consulate_client::Result<()> {
/// let client = ConsulClient::builder()
///     .address("http://consul.example.com:8500")
///     .token("secret")
///     .build()?;
///
/// client.kv().put("foo", "bar").await?;
/// let entry = client.kv().get("foo").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConsulClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// Agent base URL.
    pub(crate) base_url: Url,
    /// Single-query executor over the shared transport.
    pub(crate) executor: BlockingQueryExecutor,
    /// Timeout for non-blocking requests.
    pub(crate) timeout: Duration,
    /// Settings applied to every watch created from this client.
    pub(crate) watch_config: WatchConfig,
}

impl ConsulClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client for the local agent on the default port.
    pub fn localhost() -> Result<Self> {
        Self::builder().address(DEFAULT_ADDRESS).build()
    }

    /// Get the agent base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Settings used for watches created from this client.
    pub fn watch_config(&self) -> &WatchConfig {
        &self.inner.watch_config
    }

    /// The executor used for blocking reads.
    pub fn executor(&self) -> &BlockingQueryExecutor {
        &self.inner.executor
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the key/value store API.
    pub fn kv(&self) -> KvApi {
        KvApi::new(self.clone())
    }

    /// Access the catalog API.
    pub fn catalog(&self) -> CatalogApi {
        CatalogApi::new(self.clone())
    }

    /// Access the local agent API.
    pub fn agent(&self) -> AgentApi {
        AgentApi::new(self.clone())
    }

    /// Access the health API.
    pub fn health(&self) -> HealthApi {
        HealthApi::new(self.clone())
    }

    /// Access the sessions API.
    pub fn sessions(&self) -> SessionsApi {
        SessionsApi::new(self.clone())
    }

    /// Access the user events API.
    pub fn events(&self) -> EventsApi {
        EventsApi::new(self.clone())
    }

    /// Access the cluster status API.
    pub fn status(&self) -> StatusApi {
        StatusApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Watches
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a watcher for any resource.
    ///
    /// The watcher is returned in the `Created` state; call `start` on it.
    pub fn watch<C: ResourceCodec>(
        &self,
        resource: ResourceRef,
        initial: BlockingQueryOptions,
        codec: C,
    ) -> WatcherHandle<C::Item> {
        WatcherHandle::new(
            self.inner.executor.clone(),
            resource,
            initial,
            codec,
            self.inner.watch_config.clone(),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one (possibly blocking) read.
    pub(crate) async fn query<C: ResourceCodec>(
        &self,
        resource: &ResourceRef,
        options: &BlockingQueryOptions,
        codec: &C,
    ) -> Result<QueryResult<C::Item>> {
        self.inner.executor.execute(resource, options, codec).await
    }

    /// Make a non-blocking JSON GET.
    pub(crate) async fn get<T>(&self, resource: &ResourceRef) -> Result<T>
    where
        T: DeserializeOwned + PartialEq + Default + Clone + Send + Sync + 'static,
    {
        let result = self
            .query(resource, &BlockingQueryOptions::new(), &JsonCodec::<T>::new())
            .await?;
        Ok(result.payload)
    }

    /// Make a PUT request with a raw body.
    pub(crate) async fn put(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse> {
        let mut request = TransportRequest::new(Method::Put, path).extend_query(query);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.send(request).await
    }

    /// Make a PUT request with a JSON body.
    pub(crate) async fn put_json<B>(&self, path: &str, body: &B) -> Result<TransportResponse>
    where
        B: serde::Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body).map_err(|e| Error::Encode(e.to_string()))?;
        self.put(path, Vec::new(), Some(body)).await
    }

    /// Make a DELETE request.
    pub(crate) async fn delete(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<TransportResponse> {
        self.send(TransportRequest::new(Method::Delete, path).extend_query(query))
            .await
    }

    /// Send a request and reject non-success statuses.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let request = request.timeout(self.inner.timeout);
        let deadline = self.inner.timeout;
        let response = tokio::time::timeout(
            deadline,
            self.inner.executor.transport().send(request),
        )
        .await
        .map_err(|_| Error::Timeout(deadline))??;

        if response.is_success() {
            Ok(response)
        } else {
            Err(Error::Api {
                status: response.status,
                message: response.text(),
            })
        }
    }
}

/// Decode a JSON response body.
pub(crate) fn decode_json<T: DeserializeOwned>(response: &TransportResponse) -> Result<T> {
    Ok(serde_json::from_slice(&response.body)?)
}

impl std::fmt::Debug for ConsulClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsulClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Builder for creating a ConsulClient.
pub struct ClientBuilder {
    address: Option<String>,
    token: Option<String>,
    datacenter: Option<String>,
    timeout: Duration,
    grace: Duration,
    user_agent: Option<String>,
    watch_config: WatchConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            address: None,
            token: None,
            datacenter: None,
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
            user_agent: None,
            watch_config: WatchConfig::default(),
            transport: None,
        }
    }

    /// Set the agent address (`host:port` or a full URL).
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the ACL token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the datacenter every request targets.
    pub fn datacenter(mut self, dc: impl Into<String>) -> Self {
        self.datacenter = Some(dc.into());
        self
    }

    /// Set the timeout for non-blocking requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the margin added to a blocking query's wait before it is abandoned.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the watch loop tuning.
    pub fn watch_config(mut self, config: WatchConfig) -> Self {
        self.watch_config = config;
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ConsulClient> {
        let address = self
            .address
            .ok_or_else(|| Error::Config("address is required".to_string()))?;
        let base_url = parse_address(&address)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

                if let Some(token) = &self.token {
                    let value = HeaderValue::from_str(token)
                        .map_err(|_| Error::Config("Invalid ACL token".to_string()))?;
                    headers.insert(TOKEN_HEADER, value);
                }

                let user_agent = self
                    .user_agent
                    .unwrap_or_else(|| format!("consulate/{}", env!("CARGO_PKG_VERSION")));

                let http = reqwest::Client::builder()
                    .default_headers(headers)
                    .user_agent(user_agent)
                    .build()
                    .map_err(|e| Error::Config(e.to_string()))?;

                Arc::new(HttpTransport::new(
                    http,
                    base_url.clone(),
                    self.datacenter.clone(),
                ))
            }
        };

        let executor = BlockingQueryExecutor::new(transport)
            .with_grace(self.grace)
            .with_request_timeout(self.timeout);

        Ok(ConsulClient {
            inner: Arc::new(ClientInner {
                base_url,
                executor,
                timeout: self.timeout,
                watch_config: self.watch_config,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an agent address, defaulting the scheme to `http` and normalizing
/// the trailing slash.
fn parse_address(address: &str) -> Result<Url> {
    let address = address.trim();
    let mut url = if address.contains("://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{}", address))?
    };
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}
