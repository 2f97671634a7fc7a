//! Cluster status API.

use crate::blocking::ResourceRef;
use crate::client::ConsulClient;
use crate::error::Result;

/// Status API client.
pub struct StatusApi {
    client: ConsulClient,
}

impl StatusApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    /// Raft leader address (`ip:port`), empty when there is no leader.
    pub async fn leader(&self) -> Result<String> {
        self.client.get(&ResourceRef::new("status/leader")).await
    }

    /// Raft peer addresses.
    pub async fn peers(&self) -> Result<Vec<String>> {
        self.client.get(&ResourceRef::new("status/peers")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::{MockReply, MockTransport, TransportResponse};

    #[tokio::test]
    async fn test_leader_and_peers() {
        let mock = Arc::new(MockTransport::new(vec![
            MockReply::Respond(TransportResponse::new(200, r#""10.0.0.1:8300""#)),
            MockReply::Respond(TransportResponse::new(
                200,
                r#"["10.0.0.1:8300","10.0.0.2:8300"]"#,
            )),
        ]));
        let client = ConsulClient::builder()
            .address("http://127.0.0.1:8500")
            .transport(mock.clone())
            .build()
            .unwrap();

        assert_eq!(client.status().leader().await.unwrap(), "10.0.0.1:8300");
        assert_eq!(client.status().peers().await.unwrap().len(), 2);
    }
}
