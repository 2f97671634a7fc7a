//! Session API.

use crate::blocking::{BlockingQueryOptions, QueryResult, ResourceRef};
use crate::client::{decode_json, ConsulClient};
use crate::codec::JsonCodec;
use crate::error::Result;
use crate::types::{Session, SessionCreated, SessionOptions};
use crate::watch::WatcherHandle;

/// Session API client.
pub struct SessionsApi {
    client: ConsulClient,
}

impl SessionsApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    fn node_resource(node: &str) -> ResourceRef {
        ResourceRef::new(format!("session/node/{}", node))
    }

    /// Create a session with agent defaults. Returns its ID.
    pub async fn create(&self) -> Result<String> {
        self.create_with_options(&SessionOptions::default()).await
    }

    /// Create a session. Returns its ID.
    pub async fn create_with_options(&self, options: &SessionOptions) -> Result<String> {
        let response = self.client.put_json("session/create", options).await?;
        let created: SessionCreated = decode_json(&response)?;
        Ok(created.id)
    }

    /// Invalidate a session, releasing or deleting its locks.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        self.client
            .put(&format!("session/destroy/{}", id), Vec::new(), None)
            .await?;
        Ok(())
    }

    /// Look up one session; `None` if it does not exist.
    pub async fn info(&self, id: &str) -> Result<Option<Session>> {
        let sessions: Vec<Session> = self
            .client
            .get(&ResourceRef::new(format!("session/info/{}", id)))
            .await?;
        Ok(sessions.into_iter().next())
    }

    /// Renew a TTL session. Returns the renewed session, or `None` if it
    /// already expired.
    pub async fn renew(&self, id: &str) -> Result<Option<Session>> {
        let response = self
            .client
            .put(&format!("session/renew/{}", id), Vec::new(), None)
            .await;
        match response {
            Ok(response) => {
                let sessions: Vec<Session> = decode_json(&response)?;
                Ok(sessions.into_iter().next())
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List all sessions.
    pub async fn list(&self) -> Result<Vec<Session>> {
        let result = self.list_with_options(BlockingQueryOptions::new()).await?;
        Ok(result.payload)
    }

    pub async fn list_with_options(
        &self,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<Vec<Session>>> {
        self.client
            .query(
                &ResourceRef::new("session/list"),
                &options,
                &JsonCodec::new(),
            )
            .await
    }

    /// List sessions belonging to a node.
    pub async fn list_node(&self, node: &str) -> Result<Vec<Session>> {
        let result = self
            .list_node_with_options(node, BlockingQueryOptions::new())
            .await?;
        Ok(result.payload)
    }

    pub async fn list_node_with_options(
        &self,
        node: &str,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<Vec<Session>>> {
        self.client
            .query(&Self::node_resource(node), &options, &JsonCodec::new())
            .await
    }

    /// Watch all sessions.
    pub fn watch(&self, initial: BlockingQueryOptions) -> WatcherHandle<Vec<Session>> {
        self.client.watch(
            ResourceRef::new("session/list"),
            initial,
            JsonCodec::new(),
        )
    }

    /// Watch the sessions of one node.
    pub fn watch_node(
        &self,
        node: &str,
        initial: BlockingQueryOptions,
    ) -> WatcherHandle<Vec<Session>> {
        self.client
            .watch(Self::node_resource(node), initial, JsonCodec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{MockReply, MockTransport, TransportResponse};
    use crate::types::SessionBehavior;
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>) -> ConsulClient {
        ConsulClient::builder()
            .address("http://127.0.0.1:8500")
            .transport(mock.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_returns_id() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(200, r#"{"ID":"adf4238a-882b-9ddc-4a9d-5b6758e4159e"}"#),
        )]));
        let sessions = client(&mock).sessions();

        let id = sessions
            .create_with_options(&SessionOptions {
                name: Some("lock".to_string()),
                behavior: Some(SessionBehavior::Delete),
                ttl: Some("30s".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(id, "adf4238a-882b-9ddc-4a9d-5b6758e4159e");

        let sent = &mock.requests()[0];
        let body: serde_json::Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["Behavior"], "delete");
        assert_eq!(body["TTL"], "30s");
    }

    #[tokio::test]
    async fn test_info_missing_session() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(4, json!([]))]));
        let info = client(&mock).sessions().info("gone").await.unwrap();
        assert!(info.is_none());
        assert_eq!(mock.requests()[0].path, "session/info/gone");
    }

    #[tokio::test]
    async fn test_renew_expired_session() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(404, "Session id 'x' not found"),
        )]));
        let renewed = client(&mock).sessions().renew("x").await.unwrap();
        assert!(renewed.is_none());
    }

    #[tokio::test]
    async fn test_watch_node_path() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(
            2,
            json!([{"ID": "s1", "Node": "n1"}]),
        )]));
        let watcher = client(&mock)
            .sessions()
            .watch_node("n1", BlockingQueryOptions::new());
        let mut updates = watcher.updates().unwrap();
        watcher.start().unwrap();

        let first = updates.recv().await.unwrap();
        assert_eq!(first.payload[0].id, "s1");
        assert_eq!(mock.requests()[0].path, "session/node/n1");
    }
}
