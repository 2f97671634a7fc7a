//! Catalog API.

use crate::blocking::{BlockingQueryOptions, QueryResult, ResourceRef};
use crate::client::ConsulClient;
use crate::codec::JsonCodec;
use crate::error::Result;
use crate::types::{Node, NodeQueryOptions, Service, ServiceMap, ServiceQueryOptions};
use crate::watch::WatcherHandle;

/// Catalog API client.
pub struct CatalogApi {
    client: ConsulClient,
}

impl CatalogApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    fn nodes_resource(options: &NodeQueryOptions) -> ResourceRef {
        ResourceRef::new("catalog/nodes").extend_query(options.query())
    }

    fn service_resource(name: &str, options: &ServiceQueryOptions) -> ResourceRef {
        ResourceRef::new(format!("catalog/service/{}", name)).extend_query(options.query())
    }

    /// List known datacenters.
    pub async fn datacenters(&self) -> Result<Vec<String>> {
        self.client
            .get(&ResourceRef::new("catalog/datacenters"))
            .await
    }

    /// List all nodes.
    pub async fn nodes(&self) -> Result<Vec<Node>> {
        let result = self.nodes_with_options(&NodeQueryOptions::default()).await?;
        Ok(result.payload)
    }

    /// List nodes with sorting and blocking options.
    pub async fn nodes_with_options(
        &self,
        options: &NodeQueryOptions,
    ) -> Result<QueryResult<Vec<Node>>> {
        self.client
            .query(
                &Self::nodes_resource(options),
                &options.blocking,
                &JsonCodec::new(),
            )
            .await
    }

    /// List services and their tags.
    pub async fn services(&self) -> Result<ServiceMap> {
        let result = self
            .services_with_options(BlockingQueryOptions::new())
            .await?;
        Ok(result.payload)
    }

    /// List services with blocking options.
    pub async fn services_with_options(
        &self,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<ServiceMap>> {
        self.client
            .query(
                &ResourceRef::new("catalog/services"),
                &options,
                &JsonCodec::new(),
            )
            .await
    }

    /// List the instances of a service.
    pub async fn service_nodes(&self, name: &str) -> Result<Vec<Service>> {
        let result = self
            .service_nodes_with_options(name, &ServiceQueryOptions::default())
            .await?;
        Ok(result.payload)
    }

    /// List the instances of a service with tag, sorting and blocking options.
    pub async fn service_nodes_with_options(
        &self,
        name: &str,
        options: &ServiceQueryOptions,
    ) -> Result<QueryResult<Vec<Service>>> {
        self.client
            .query(
                &Self::service_resource(name, options),
                &options.blocking,
                &JsonCodec::new(),
            )
            .await
    }

    /// Watch the node list.
    pub fn watch_nodes(&self, options: NodeQueryOptions) -> WatcherHandle<Vec<Node>> {
        self.client.watch(
            Self::nodes_resource(&options),
            options.blocking,
            JsonCodec::new(),
        )
    }

    /// Watch the service list.
    pub fn watch_services(&self, initial: BlockingQueryOptions) -> WatcherHandle<ServiceMap> {
        self.client.watch(
            ResourceRef::new("catalog/services"),
            initial,
            JsonCodec::new(),
        )
    }

    /// Watch the instances of one service.
    pub fn watch_service_nodes(
        &self,
        name: &str,
        options: ServiceQueryOptions,
    ) -> WatcherHandle<Vec<Service>> {
        self.client.watch(
            Self::service_resource(name, &options),
            options.blocking,
            JsonCodec::new(),
        )
    }
}
