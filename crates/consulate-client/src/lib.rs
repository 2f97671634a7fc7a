//! HTTP client for the Consul agent API, built around blocking queries.
//!
//! Every read can be issued as a blocking query: the agent holds the request
//! open until the resource's consistency index moves past the one supplied,
//! or until the wait elapses. Watches turn that into a continuous feed of
//! content changes.
//!
//! # Example
//!
//! ```no_run
//! use consulate_client::{BlockingQueryOptions, ConsulClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = ConsulClient::builder()
//!     .address("127.0.0.1:8500")
//!     .build()?;
//!
//! // Plain read
//! let entry = client.kv().get("service/web/config").await?;
//! println!("{:?}", entry.and_then(|kv| kv.value_str().map(String::from)));
//!
//! // One blocking read: returns once the index passes 42 or after 30s
//! let result = client
//!     .catalog()
//!     .services_with_options(
//!         BlockingQueryOptions::new()
//!             .with_index(42)
//!             .with_wait(std::time::Duration::from_secs(30)),
//!     )
//!     .await?;
//! println!("index {} services {}", result.index, result.payload.len());
//!
//! // Continuous watch
//! let watcher = client.health().watch_service("web", true, Default::default());
//! let mut updates = watcher.updates()?;
//! watcher.start()?;
//! while let Some(update) = updates.recv().await {
//!     println!("{} healthy instances", update.payload.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **KV**: get, list, keys, put (with CAS and locks), delete, watch
//! - **Catalog**: datacenters, nodes, services, service instances, watch
//! - **Agent**: service and check registration, TTL updates, members
//! - **Health**: service health, checks by state, watch
//! - **Sessions**: create, destroy, renew, info, list, watch
//! - **Events**: fire, list, watch
//! - **Status**: leader, peers

pub mod api;
pub mod blocking;
pub mod client;
pub mod codec;
pub mod error;
pub mod transport;
pub mod types;
pub mod watch;

pub use blocking::{
    BlockingQueryExecutor, BlockingQueryOptions, ConsistencyIndex, QueryResult, ResourceRef,
    AGENT_DEFAULT_WAIT, MAX_WAIT,
};
pub use client::{ClientBuilder, ConsulClient, DEFAULT_ADDRESS};
pub use codec::{DecodeError, JsonCodec, KeyValueCodec, KeyValueListCodec, KeysCodec, ResourceCodec};
pub use error::{Error, Result};
pub use transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};
pub use types::*;
pub use watch::{
    ChangeTracker, Observation, Updates, WatchConfig, WatcherHandle, WatcherState, WatcherStatus,
};

#[cfg(feature = "testing")]
pub use transport::{MockReply, MockTransport};
