//! `reqwest` implementation of [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::Transport;
use crate::error::{RegistryError, Result};

const AGENT_USER_AGENT: &str = concat!("registry-agent/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Registry transport over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for the registry at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().user_agent(AGENT_USER_AGENT).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a transport that reuses an existing `reqwest` client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: Value, timeout: Duration) -> Result<Value> {
        let request_id = Uuid::new_v4().to_string();
        debug!(path, request_id = %request_id, "POST registry");

        let response = self
            .client
            .post(self.url(path))
            .header("X-Request-Id", &request_id)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, path, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body: truncate(detail.trim(), MAX_ERROR_BODY_CHARS),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_send_error(e, path, timeout))?;
        serde_json::from_str(&text).map_err(|e| {
            RegistryError::InvalidResponse(format!("{} returned non-JSON body: {}", path, e))
        })
    }
}

fn map_send_error(err: reqwest::Error, path: &str, timeout: Duration) -> RegistryError {
    if err.is_timeout() {
        RegistryError::Timeout {
            path: path.to_string(),
            timeout,
        }
    } else {
        RegistryError::Http(err)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:8080/").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
        assert_eq!(
            transport.url("/api/v1/services/register"),
            "http://localhost:8080/api/v1/services/register"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/services/heartbeat"))
            .and(header_exists("X-Request-Id"))
            .and(body_partial_json(json!({"service_id": "svc-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let value = transport
            .post_json(
                "/api/v1/services/heartbeat",
                json!({"service_id": "svc-1"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(value["code"], 0);
    }

    #[tokio::test]
    async fn test_post_json_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .post_json("/api/v1/services/register", json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            RegistryError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_json_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 0}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .post_json(
                "/api/v1/services/heartbeat",
                json!({}),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::Timeout { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_post_json_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .post_json("/api/v1/services/shutdown", json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_post_json_connection_refused() {
        // Port 9 (discard) is almost never listening on loopback.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let err = transport
            .post_json("/api/v1/services/register", json!({}), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(err.is_remote());
    }
}
