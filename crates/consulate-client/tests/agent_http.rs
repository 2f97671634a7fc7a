//! Client behaviour against a fake agent speaking real HTTP.

use std::time::Duration;

use consulate_client::{BlockingQueryOptions, ConsulClient, Error, WatchConfig, WatcherState};
use serde_json::json;
use wiremock::matchers::{body_string, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn kv_body(key: &str, value_b64: &str, modify_index: u64) -> serde_json::Value {
    json!([{
        "Key": key,
        "Value": value_b64,
        "Flags": 0,
        "CreateIndex": 1,
        "ModifyIndex": modify_index,
        "LockIndex": 0
    }])
}

#[tokio::test]
async fn sends_token_and_datacenter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/app/name"))
        .and(header("x-consul-token", "secret"))
        .and(query_param("dc", "dc2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", "7")
                .set_body_json(kv_body("app/name", "d2Vi", 7)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ConsulClient::builder()
        .address(server.uri())
        .token("secret")
        .datacenter("dc2")
        .build()
        .unwrap();

    let entry = client.kv().get("app/name").await.unwrap().unwrap();
    assert_eq!(entry.value_str(), Some("web"));
}

#[tokio::test]
async fn blocking_read_sends_index_and_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog/services"))
        .and(query_param("index", "41"))
        .and(query_param("wait", "30s"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", "42")
                .set_body_json(json!({"consul": [], "web": ["v1"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ConsulClient::builder().address(server.uri()).build().unwrap();
    let result = client
        .catalog()
        .services_with_options(
            BlockingQueryOptions::new()
                .with_index(41)
                .with_wait(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    assert_eq!(result.index.value(), 42);
    assert_eq!(result.payload["web"], vec!["v1"]);
}

#[tokio::test]
async fn missing_key_with_index_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/nope"))
        .respond_with(ResponseTemplate::new(404).insert_header("X-Consul-Index", "12"))
        .mount(&server)
        .await;

    let client = ConsulClient::builder().address(server.uri()).build().unwrap();
    let result = client
        .kv()
        .get_with_options("nope", BlockingQueryOptions::new())
        .await
        .unwrap();

    assert!(result.payload.is_none());
    assert_eq!(result.index.value(), 12);
}

#[tokio::test]
async fn put_sends_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/kv/app/name"))
        .and(query_param("cas", "0"))
        .and(body_string("web"))
        .respond_with(ResponseTemplate::new(200).set_body_string("true"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ConsulClient::builder().address(server.uri()).build().unwrap();
    let applied = client
        .kv()
        .put_with_options(
            "app/name",
            "web",
            &consulate_client::KvPutOptions {
                cas: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(applied);
}

#[tokio::test]
async fn reserved_characters_stay_in_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/app/flag%3Fon"))
        .and(query_param_is_missing("on"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", "3")
                .set_body_json(kv_body("app/flag?on", "eWVz", 3)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/kv/app/a%23b"))
        .and(body_string("x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("true"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ConsulClient::builder().address(server.uri()).build().unwrap();
    let entry = client.kv().get("app/flag?on").await.unwrap().unwrap();
    assert_eq!(entry.key, "app/flag?on");
    assert!(client.kv().put("app/a#b", "x").await.unwrap());
}

#[tokio::test]
async fn acl_denial_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/secret"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let client = ConsulClient::builder().address(server.uri()).build().unwrap();
    let err = client.kv().get("secret").await.unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn slow_agent_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/status/leader"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("\"10.0.0.1:8300\"")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = ConsulClient::builder()
        .address(server.uri())
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let err = client.status().leader().await.unwrap_err();
    match &err {
        Error::Timeout(after) => assert_eq!(*after, Duration::from_millis(200)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn watch_follows_index_against_agent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/kv/feature"))
        .and(query_param_is_missing("index"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", "10")
                .set_body_json(kv_body("feature", "b2Zm", 10)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/feature"))
        .and(query_param("index", "10"))
        .and(query_param("wait", "2s"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", "11")
                .set_body_json(kv_body("feature", "b24=", 11)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/feature"))
        .and(query_param("index", "11"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", "11")
                .set_body_json(kv_body("feature", "b24=", 11))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = ConsulClient::builder()
        .address(server.uri())
        .watch_config(WatchConfig::default().with_wait(Duration::from_secs(2)))
        .build()
        .unwrap();

    let watcher = client
        .kv()
        .watch_key("feature", BlockingQueryOptions::new());
    let mut updates = watcher.updates().unwrap();
    watcher.start().unwrap();

    let first = updates.recv().await.unwrap();
    assert_eq!(first.payload.unwrap().value_str(), Some("off"));
    let second = updates.recv().await.unwrap();
    assert_eq!(second.index.value(), 11);
    assert_eq!(second.payload.unwrap().value_str(), Some("on"));

    watcher.shutdown().await;
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert!(watcher.error().is_none());
}
