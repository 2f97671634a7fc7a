//! User event API.

use crate::blocking::{BlockingQueryOptions, QueryResult, ResourceRef};
use crate::client::{decode_json, ConsulClient};
use crate::codec::JsonCodec;
use crate::error::Result;
use crate::types::{Event, EventOptions};
use crate::watch::WatcherHandle;

/// Event API client.
pub struct EventsApi {
    client: ConsulClient,
}

impl EventsApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    fn list_resource(name: Option<&str>) -> ResourceRef {
        let resource = ResourceRef::new("event/list");
        match name {
            Some(name) => resource.with_query("name", name),
            None => resource,
        }
    }

    /// Fire an event with no payload or filters.
    pub async fn fire(&self, name: &str) -> Result<Event> {
        self.fire_with_options(name, &EventOptions::default()).await
    }

    /// Fire an event. Returns the event as recorded by the agent.
    pub async fn fire_with_options(&self, name: &str, options: &EventOptions) -> Result<Event> {
        let response = self
            .client
            .put(
                &format!("event/fire/{}", name),
                options.query(),
                options.payload.clone(),
            )
            .await?;
        decode_json(&response)
    }

    /// Recent events known to the agent, optionally filtered by name.
    pub async fn list(&self, name: Option<&str>) -> Result<Vec<Event>> {
        let result = self
            .list_with_options(name, BlockingQueryOptions::new())
            .await?;
        Ok(result.payload)
    }

    /// List events with blocking options.
    ///
    /// The event index is a hash of the newest event IDs, not a Raft index,
    /// so it may decrease; the watch loop treats that as a reset.
    pub async fn list_with_options(
        &self,
        name: Option<&str>,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<Vec<Event>>> {
        self.client
            .query(&Self::list_resource(name), &options, &JsonCodec::new())
            .await
    }

    /// Watch the event list.
    pub fn watch(
        &self,
        name: Option<&str>,
        initial: BlockingQueryOptions,
    ) -> WatcherHandle<Vec<Event>> {
        self.client
            .watch(Self::list_resource(name), initial, JsonCodec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{MockReply, MockTransport, TransportResponse};
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>) -> ConsulClient {
        ConsulClient::builder()
            .address("http://127.0.0.1:8500")
            .transport(mock.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fire_with_payload_and_filters() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(
                200,
                json!({"ID": "e1", "Name": "deploy", "Payload": "djI=", "ServiceFilter": "web"})
                    .to_string(),
            ),
        )]));

        let event = client(&mock)
            .events()
            .fire_with_options(
                "deploy",
                &EventOptions {
                    service: Some("web".to_string()),
                    payload: Some(b"v2".to_vec()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(event.payload_str(), Some("v2"));

        let sent = &mock.requests()[0];
        assert_eq!(sent.path, "event/fire/deploy");
        assert_eq!(sent.query_value("service"), Some("web"));
        assert_eq!(sent.body.as_deref(), Some(b"v2".as_slice()));
    }

    #[tokio::test]
    async fn test_list_filters_by_name() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(
            0,
            json!([{"ID": "e1", "Name": "deploy"}]),
        )]));

        let events = client(&mock).events().list(Some("deploy")).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(mock.requests()[0].query_value("name"), Some("deploy"));
    }
}
