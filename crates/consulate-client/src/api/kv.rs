//! Key/value store API.

use crate::blocking::{BlockingQueryOptions, QueryResult, ResourceRef};
use crate::client::{decode_json, ConsulClient};
use crate::codec::{KeyValueCodec, KeyValueListCodec, KeysCodec};
use crate::error::Result;
use crate::types::{KeyValue, KvPutOptions};
use crate::watch::WatcherHandle;

/// Key/value API client.
pub struct KvApi {
    client: ConsulClient,
}

fn key_path(key: &str) -> String {
    format!("kv/{}", key.trim_start_matches('/'))
}

impl KvApi {
    pub(crate) fn new(client: ConsulClient) -> Self {
        Self { client }
    }

    fn key_resource(key: &str) -> ResourceRef {
        ResourceRef::new(key_path(key))
    }

    fn prefix_resource(prefix: &str) -> ResourceRef {
        ResourceRef::new(key_path(prefix)).with_query("recurse", "")
    }

    /// Get a single key; `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let result = self.get_with_options(key, BlockingQueryOptions::new()).await?;
        Ok(result.payload)
    }

    /// Get a single key with blocking options.
    pub async fn get_with_options(
        &self,
        key: &str,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<Option<KeyValue>>> {
        self.client
            .query(&Self::key_resource(key), &options, &KeyValueCodec)
            .await
    }

    /// Get every entry under a prefix.
    pub async fn list(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let result = self
            .list_with_options(prefix, BlockingQueryOptions::new())
            .await?;
        Ok(result.payload)
    }

    /// Get every entry under a prefix with blocking options.
    pub async fn list_with_options(
        &self,
        prefix: &str,
        options: BlockingQueryOptions,
    ) -> Result<QueryResult<Vec<KeyValue>>> {
        self.client
            .query(
                &Self::prefix_resource(prefix),
                &options,
                &KeyValueListCodec::new(),
            )
            .await
    }

    /// List key names under a prefix.
    pub async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let resource = ResourceRef::new(key_path(prefix)).with_query("keys", "");
        let result = self
            .client
            .query(&resource, &BlockingQueryOptions::new(), &KeysCodec::new())
            .await?;
        Ok(result.payload)
    }

    /// Write a key. Returns whether the write was applied.
    pub async fn put(&self, key: &str, value: impl AsRef<[u8]>) -> Result<bool> {
        self.put_with_options(key, value, &KvPutOptions::default())
            .await
    }

    /// Write a key with check-and-set or lock options.
    ///
    /// Returns `false` when a `cas`, `acquire` or `release` condition was
    /// not met.
    pub async fn put_with_options(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        options: &KvPutOptions,
    ) -> Result<bool> {
        let response = self
            .client
            .put(
                &key_path(key),
                options.query(),
                Some(value.as_ref().to_vec()),
            )
            .await?;
        decode_json(&response)
    }

    /// Delete a single key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.client.delete(&key_path(key), Vec::new()).await?;
        Ok(())
    }

    /// Delete every key under a prefix.
    pub async fn delete_tree(&self, prefix: &str) -> Result<()> {
        self.client
            .delete(
                &key_path(prefix),
                vec![("recurse".to_string(), String::new())],
            )
            .await?;
        Ok(())
    }

    /// Watch a single key. The payload is `None` while the key is absent.
    pub fn watch_key(
        &self,
        key: &str,
        initial: BlockingQueryOptions,
    ) -> WatcherHandle<Option<KeyValue>> {
        self.client
            .watch(Self::key_resource(key), initial, KeyValueCodec)
    }

    /// Watch every entry under a prefix.
    pub fn watch_prefix(
        &self,
        prefix: &str,
        initial: BlockingQueryOptions,
    ) -> WatcherHandle<Vec<KeyValue>> {
        self.client.watch(
            Self::prefix_resource(prefix),
            initial,
            KeyValueListCodec::new(),
        )
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

    #[test]
    fn test_key_path() {
        assert_eq!(key_path("foo/bar"), "kv/foo/bar");
        assert_eq!(key_path("/foo"), "kv/foo");
    }

    #[tokio::test]
    async fn test_get_existing_and_missing() {
        let mock = Arc::new(MockTransport::new(vec![
            MockReply::json(7, json!([{"Key": "foo", "Value": "YmFy", "ModifyIndex": 7}])),
            MockReply::Respond(TransportResponse::new(404, "").with_index(7)),
        ]));
        let kv = client(&mock).kv();

        let entry = kv.get("foo").await.unwrap().unwrap();
        assert_eq!(entry.value_str(), Some("bar"));
        assert!(kv.get("nope").await.unwrap().is_none());
        assert_eq!(mock.requests()[1].path, "kv/nope");
    }

    #[tokio::test]
    async fn test_get_with_blocking_options() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::json(
            12,
            json!([{"Key": "foo", "Value": null}]),
        )]));
        let kv = client(&mock).kv();

        let result = kv
            .get_with_options("foo", BlockingQueryOptions::new().with_index(11))
            .await
            .unwrap();
        assert_eq!(result.index.value(), 12);
        assert_eq!(mock.requests()[0].query_value("index"), Some("11"));
    }

    #[tokio::test]
    async fn test_put_with_cas() {
        let mock = Arc::new(MockTransport::new(vec![MockReply::Respond(
            TransportResponse::new(200, "false"),
        )]));
        let kv = client(&mock).kv();

        let applied = kv
            .put_with_options(
                "foo",
                "bar",
                &KvPutOptions {
                    cas: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!applied);

        let sent = &mock.requests()[0];
        assert_eq!(sent.query_value("cas"), Some("3"));
        assert_eq!(sent.body.as_deref(), Some(b"bar".as_slice()));
    }

    #[tokio::test]
    async fn test_list_and_keys_use_query_flags() {
        let mock = Arc::new(MockTransport::new(vec![
            MockReply::json(3, json!([{"Key": "app/a"}, {"Key": "app/b"}])),
            MockReply::json(3, json!(["app/a", "app/b"])),
        ]));
        let kv = client(&mock).kv();

        assert_eq!(kv.list("app").await.unwrap().len(), 2);
        assert_eq!(kv.keys("app").await.unwrap(), vec!["app/a", "app/b"]);

        let requests = mock.requests();
        assert_eq!(requests[0].query_value("recurse"), Some(""));
        assert_eq!(requests[1].query_value("keys"), Some(""));
    }

    #[tokio::test]
    async fn test_watch_key_sees_creation() {
        let mock = Arc::new(MockTransport::new(vec![
            MockReply::Respond(TransportResponse::new(404, "").with_index(4)),
            MockReply::json(5, json!([{"Key": "flag", "Value": "b24=", "ModifyIndex": 5}])),
        ]));
        let watcher = client(&mock)
            .kv()
            .watch_key("flag", BlockingQueryOptions::new());
        let mut updates = watcher.updates().unwrap();
        watcher.start().unwrap();

        assert_eq!(updates.recv().await.unwrap().payload, None);
        let created = updates.recv().await.unwrap();
        assert_eq!(created.payload.unwrap().value_str(), Some("on"));
    }
}
