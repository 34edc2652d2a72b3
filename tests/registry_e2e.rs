//! End-to-end tests against a fake registry over real HTTP.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use registry_agent::transport::{HEARTBEAT_PATH, REGISTER_PATH, SHUTDOWN_PATH};
use registry_agent::{
    HeartbeatOverrides, LoopState, RegisterOptions, RegistryClient, RegistryConfig, RegistryError,
    StaticMetrics, SystemMetrics,
};

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"code": 0, "message": "success", "data": data}))
}

fn config(server: &MockServer) -> RegistryConfig {
    RegistryConfig {
        hostname: Some("worker-1".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
        ..RegistryConfig::with_base_url(server.uri())
    }
}

async fn mount_register(server: &MockServer, interval: u64) {
    Mock::given(method("POST"))
        .and(path(REGISTER_PATH))
        .respond_with(ok(json!({
            "service_id": "svc-1",
            "token": "tok-1",
            "heartbeat_interval": interval
        })))
        .mount(server)
        .await;
}

async fn bodies_to(server: &MockServer, endpoint: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == endpoint)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_register_heartbeat_stop_lifecycle() {
    let server = MockServer::start().await;
    mount_register(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ok(json!({"status": "healthy", "drain_requested": false})))
        .mount(&server)
        .await;

    let client = RegistryClient::new(config(&server)).unwrap();
    let identity = client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap();
    assert_eq!(identity.service_id, "svc-1");
    assert_eq!(identity.token, "tok-1");

    assert!(client.start_heartbeat_loop().unwrap());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(client.stop_heartbeat_loop().await);
    assert_eq!(client.heartbeat_state(), LoopState::Stopped);

    let heartbeats = bodies_to(&server, HEARTBEAT_PATH).await;
    assert!(heartbeats.len() >= 2, "got {} heartbeats", heartbeats.len());
    for body in &heartbeats {
        assert_eq!(body["service_id"], "svc-1");
        assert_eq!(body["token"], "tok-1");
        let load = body["current_load"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&load));
    }

    let after_stop = heartbeats.len();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(bodies_to(&server, HEARTBEAT_PATH).await.len(), after_stop);
}

#[tokio::test]
async fn test_requests_carry_request_id() {
    let server = MockServer::start().await;
    mount_register(&server, 30).await;

    let client = RegistryClient::new(config(&server)).unwrap();
    client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn test_shutdown_body() {
    let server = MockServer::start().await;
    mount_register(&server, 30).await;
    Mock::given(method("POST"))
        .and(path(SHUTDOWN_PATH))
        .respond_with(ok(json!({"grace_period_seconds": 30, "message": "bye"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistryClient::builder(config(&server))
        .metrics(std::sync::Arc::new(StaticMetrics(SystemMetrics::default())))
        .build()
        .unwrap();
    client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap();

    let response = client.shutdown("Service stopping").await.unwrap();
    assert_eq!(response.grace_period_seconds, 30);

    let bodies = bodies_to(&server, SHUTDOWN_PATH).await;
    assert_eq!(
        bodies[0],
        json!({"service_id": "svc-1", "reason": "Service stopping"})
    );
}

#[tokio::test]
async fn test_drain_signal_stops_loop() {
    let server = MockServer::start().await;
    mount_register(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ok(json!({"status": "draining", "drain_requested": true})))
        .mount(&server)
        .await;

    let client = RegistryClient::builder(config(&server))
        .metrics(std::sync::Arc::new(StaticMetrics(SystemMetrics::default())))
        .build()
        .unwrap();
    client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap();
    client.start_heartbeat_loop().unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(client.heartbeat_state(), LoopState::Stopped);
    assert_eq!(bodies_to(&server, HEARTBEAT_PATH).await.len(), 1);
}

#[tokio::test]
async fn test_server_errors_do_not_stop_loop() {
    let server = MockServer::start().await;
    mount_register(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ok(json!({"status": "healthy"})))
        .mount(&server)
        .await;

    let client = RegistryClient::builder(config(&server))
        .metrics(std::sync::Arc::new(StaticMetrics(SystemMetrics::default())))
        .build()
        .unwrap();
    client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap();
    client.start_heartbeat_loop().unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let stats = client.heartbeat_stats();
    assert_eq!(stats.failures, 2);
    assert!(stats.successes >= 1);
    assert_eq!(client.heartbeat_state(), LoopState::Running);
    client.stop_heartbeat_loop().await;
}

#[tokio::test]
async fn test_rejected_heartbeat_surfaces_code() {
    let server = MockServer::start().await;
    mount_register(&server, 30).await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 4003, "message": "token expired"})),
        )
        .mount(&server)
        .await;

    let client = RegistryClient::builder(config(&server))
        .metrics(std::sync::Arc::new(StaticMetrics(SystemMetrics::default())))
        .build()
        .unwrap();
    client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap();

    let err = client
        .heartbeat(HeartbeatOverrides::default())
        .await
        .unwrap_err();
    match err {
        RegistryError::Rejected { code, message } => {
            assert_eq!(code, 4003);
            assert_eq!(message, "token expired");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_registry_fails_register() {
    let config = RegistryConfig {
        hostname: Some("worker-1".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
        register_timeout_secs: 1,
        ..RegistryConfig::with_base_url("http://127.0.0.1:9")
    };
    let client = RegistryClient::new(config).unwrap();

    let err = client
        .register("text_to_image", RegisterOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert!(client.identity().await.is_none());
}
