//! Local agent API.

use std::collections::BTreeMap;

use crate::blocking::ResourceRef;
use crate::client::ConsulClient;
use crate::error::Result;
use crate::types::{AgentService, CheckOptions, Member, ServiceOptions};

/// Agent API client.
///
/// Registrations made here are local to the agent the client talks to.
pub struct AgentApi {
    client: ConsulClient,
}

impl AgentApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    /// Services registered with this agent, keyed by service ID.
    pub async fn services(&self) -> Result<BTreeMap<String, AgentService>> {
        self.client
            .get(&ResourceRef::new("agent/services"))
            .await
    }

    /// Gossip pool members seen by this agent.
    pub async fn members(&self) -> Result<Vec<Member>> {
        self.client.get(&ResourceRef::new("agent/members")).await
    }

    /// Register a service (and its optional check).
    pub async fn register_service(&self, options: &ServiceOptions) -> Result<()> {
        self.client
            .put_json("agent/service/register", options)
            .await?;
        Ok(())
    }

    /// Remove a service registration.
    pub async fn deregister_service(&self, id: &str) -> Result<()> {
        self.client
            .put(&format!("agent/service/deregister/{}", id), Vec::new(), None)
            .await?;
        Ok(())
    }

    /// Register a standalone check.
    pub async fn register_check(&self, options: &CheckOptions) -> Result<()> {
        self.client.put_json("agent/check/register", options).await?;
        Ok(())
    }

    /// Remove a check.
    pub async fn deregister_check(&self, id: &str) -> Result<()> {
        self.client
            .put(&format!("agent/check/deregister/{}", id), Vec::new(), None)
            .await?;
        Ok(())
    }

    /// Mark a TTL check as passing.
    pub async fn pass_check(&self, id: &str, note: Option<&str>) -> Result<()> {
        self.update_ttl("pass", id, note).await
    }

    /// Mark a TTL check as warning.
    pub async fn warn_check(&self, id: &str, note: Option<&str>) -> Result<()> {
        self.update_ttl("warn", id, note).await
    }

    /// Mark a TTL check as critical.
    pub async fn fail_check(&self, id: &str, note: Option<&str>) -> Result<()> {
        self.update_ttl("fail", id, note).await
    }

    async fn update_ttl(&self, verb: &str, id: &str, note: Option<&str>) -> Result<()> {
        let query = note
            .map(|n| vec![("note".to_string(), n.to_string())])
            .unwrap_or_default();
        self.client
            .put(&format!("agent/check/{}/{}", verb, id), query, None)
            .await?;
        Ok(())
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
    async fn test_register_service_sends_json() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(200, ""),
        )]));
        let agent = client(&mock).agent();

        agent
            .register_service(&ServiceOptions {
                id: Some("web-1".to_string()),
                name: "web".to_string(),
                port: Some(8080),
                ..Default::default()
            })
            .await
            .unwrap();

        let sent = &mock.requests()[0];
        assert_eq!(sent.path, "agent/service/register");
        let body: serde_json::Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["Name"], "web");
        assert_eq!(body["Port"], 8080);
    }

    #[tokio::test]
    async fn test_ttl_update_carries_note() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(200, ""),
        )]));
        client(&mock)
            .agent()
            .warn_check("service:web-1", Some("slow"))
            .await
            .unwrap();

        let sent = &mock.requests()[0];
        assert_eq!(sent.path, "agent/check/warn/service:web-1");
        assert_eq!(sent.query_value("note"), Some("slow"));
    }

    #[tokio::test]
    async fn test_services_keyed_by_id() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(
                200,
                json!({"web-1": {"ID": "web-1", "Service": "web", "Port": 80}}).to_string(),
            ),
        )]));
        let services = client(&mock).agent().services().await.unwrap();
        assert_eq!(services["web-1"].service, "web");
    }
}
