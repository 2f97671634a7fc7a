//! Health API.

use crate::blocking::{BlockingQueryOptions, QueryResult, ResourceRef};
use crate::client::ConsulClient;
use crate::codec::JsonCodec;
use crate::error::Result;
use crate::types::{CheckStatus, HealthCheck, ServiceEntry, ServiceQueryOptions};
use crate::watch::WatcherHandle;

/// Health API client.
pub struct HealthApi {
    client: ConsulClient,
}

impl HealthApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    fn service_resource(name: &str, passing: bool, options: &ServiceQueryOptions) -> ResourceRef {
        let resource =
            ResourceRef::new(format!("health/service/{}", name)).extend_query(options.query());
        if passing {
            resource.with_query("passing", "")
        } else {
            resource
        }
    }

    fn state_resource(state: CheckStatus) -> ResourceRef {
        ResourceRef::new(format!("health/state/{}", state))
    }

    /// Instances of a service with their node and checks. With `passing`,
    /// only instances whose checks all pass.
    pub async fn service_nodes(&self, name: &str, passing: bool) -> Result<Vec<ServiceEntry>> {
        let result = self
            .service_nodes_with_options(name, passing, &ServiceQueryOptions::default())
            .await?;
        Ok(result.payload)
    }

    pub async fn service_nodes_with_options(
        &self,
        name: &str,
        passing: bool,
        options: &ServiceQueryOptions,
    ) -> Result<QueryResult<Vec<ServiceEntry>>> {
        self.client
            .query(
                &Self::service_resource(name, passing, options),
                &options.blocking,
                &JsonCodec::new(),
            )
            .await
    }

    /// Checks currently in the given state (`Any` for all).
    pub async fn checks_in_state(&self, state: CheckStatus) -> Result<Vec<HealthCheck>> {
        let result = self
            .checks_in_state_with_options(state, BlockingQueryOptions::new())
            .await?;
        Ok(result.payload)
    }

    pub async fn checks_in_state_with_options(
        &self,
        state: CheckStatus,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<Vec<HealthCheck>>> {
        self.client
            .query(&Self::state_resource(state), &options, &JsonCodec::new())
            .await
    }

    /// Watch the health of one service's instances.
    pub fn watch_service(
        &self,
        name: &str,
        passing: bool,
        options: ServiceQueryOptions,
    ) -> WatcherHandle<Vec<ServiceEntry>> {
        self.client.watch(
            Self::service_resource(name, passing, &options),
            options.blocking,
            JsonCodec::new(),
        )
    }

    /// Watch checks in a given state.
    pub fn watch_checks(
        &self,
        state: CheckStatus,
        initial: BlockingQueryOptions,
    ) -> WatcherHandle<Vec<HealthCheck>> {
        self.client
            .watch(Self::state_resource(state), initial, JsonCodec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{MockReply, MockTransport};
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>) -> ConsulClient {
        ConsulClient::builder()
            .address("http://127.0.0.1:8500")
            .transport(mock.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_passing_filter() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(
            9,
            json!([{
                "Node": {"Node": "n1", "Address": "10.0.0.1"},
                "Service": {"ID": "web-1", "Service": "web", "Port": 80},
                "Checks": [{"Node": "n1", "CheckID": "serfHealth", "Status": "passing"}]
            }]),
        )]));

        let entries = client(&mock)
            .health()
            .service_nodes("web", true)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].aggregate_status(), CheckStatus::Passing);

        let sent = &mock.requests()[0];
        assert_eq!(sent.path, "health/service/web");
        assert_eq!(sent.query_value("passing"), Some(""));
    }

    #[tokio::test]
    async fn test_checks_in_state_path() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(
            3,
            json!([{"Node": "n1", "CheckID": "mem", "Status": "critical"}]),
        )]));

        let checks = client(&mock)
            .health()
            .checks_in_state(CheckStatus::Critical)
            .await
            .unwrap();
        assert_eq!(checks[0].status, CheckStatus::Critical);
        assert_eq!(mock.requests()[0].path, "health/state/critical");
    }

    #[tokio::test]
    async fn test_watch_checks_reports_status_flip() {
        let mock = Arc::new(MockTransport::new(vec![
            MockReply::json(5, json!([{"CheckID": "mem", "Status": "passing"}])),
            MockReply::json(6, json!([{"CheckID": "mem", "Status": "critical"}])),
        ]));
        let watcher = client(&mock)
            .health()
            .watch_checks(CheckStatus::Any, BlockingQueryOptions::new());
        let mut updates = watcher.updates().unwrap();
        watcher.start().unwrap();

        assert_eq!(
            updates.recv().await.unwrap().payload[0].status,
            CheckStatus::Passing
        );
        assert_eq!(
            updates.recv().await.unwrap().payload[0].status,
            CheckStatus::Critical
        );
        assert_eq!(mock.requests()[1].query_value("index"), Some("5"));
    }
}
