//! Registry API wire types.
//!
//! Every response is wrapped in an [`ApiResponse`] envelope; `code == 0`
//! means success and `data` carries the payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{Capabilities, PerformanceSpec, ResourceSpec};
use crate::error::{RegistryError, Result};
use crate::heartbeat::LoadSnapshot;
use crate::metrics::SystemMetrics;

/// Opaque configuration pushed by the registry.
pub type ConfigUpdate = Map<String, Value>;

// ============================================================================
// Envelope
// ============================================================================

/// Envelope around every registry response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// Unwrap an envelope: non-zero codes become [`RegistryError::Rejected`],
/// a missing payload or a payload of the wrong shape becomes
/// [`RegistryError::InvalidResponse`].
pub fn decode_envelope<T: DeserializeOwned>(path: &str, body: Value) -> Result<T> {
    let envelope: ApiResponse<Value> = serde_json::from_value(body).map_err(|e| {
        RegistryError::InvalidResponse(format!("{} returned an unexpected envelope: {}", path, e))
    })?;

    if envelope.code != 0 {
        return Err(RegistryError::Rejected {
            code: envelope.code,
            message: envelope.message,
        });
    }

    let data = envelope
        .data
        .filter(|data| !data.is_null())
        .ok_or_else(|| RegistryError::InvalidResponse(format!("{} returned no data", path)))?;

    serde_json::from_value(data).map_err(|e| {
        RegistryError::InvalidResponse(format!("{} returned unexpected data: {}", path, e))
    })
}

// ============================================================================
// Registration
// ============================================================================

/// Body of `POST /api/v1/services/register`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub service_type: String,
    pub version: String,
    pub hostname: String,
    pub ip_address: String,
    pub port: u16,
    pub capabilities: Capabilities,
    pub resources: ResourceSpec,
    pub performance: PerformanceSpec,
    /// Caller-supplied fields merged into the top level of the body.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `data` of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterResponse {
    pub service_id: String,
    pub heartbeat_interval: u64,
    pub token: String,
    #[serde(default)]
    pub config_version: Option<String>,
}

/// Identity assigned by the registry at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationIdentity {
    pub service_id: String,
    pub token: String,
    /// Seconds between heartbeats.
    pub heartbeat_interval: u64,
}

impl From<RegisterResponse> for RegistrationIdentity {
    fn from(response: RegisterResponse) -> Self {
        Self {
            service_id: response.service_id,
            token: response.token,
            heartbeat_interval: response.heartbeat_interval,
        }
    }
}

/// Optional inputs to `register`. Unset fields fall back to the client's
/// profile and configuration.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Defaults to `"1.0.0"`.
    pub version: Option<String>,
    pub capabilities: Option<Capabilities>,
    pub resources: Option<ResourceSpec>,
    pub performance: Option<PerformanceSpec>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    pub extra: Map<String, Value>,
}

impl RegisterOptions {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn resources(mut self, resources: ResourceSpec) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn performance(mut self, performance: PerformanceSpec) -> Self {
        self.performance = Some(performance);
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add a top-level field to the request body.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Body of `POST /api/v1/services/heartbeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub service_id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    /// CPU load, 0-1.
    pub current_load: f64,
    pub queue_size: u32,
    pub processed_count: u64,
    pub error_count: u64,
    /// 0-100.
    pub cpu_utilization: f64,
    /// 0-100, zero when no GPU telemetry is available.
    pub gpu_utilization: f64,
    /// Bytes.
    pub memory_usage: u64,
    pub token: String,
}

impl HeartbeatRequest {
    pub fn new(
        identity: &RegistrationIdentity,
        metrics: &SystemMetrics,
        load: LoadSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            service_id: identity.service_id.clone(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            current_load: metrics.current_load(),
            queue_size: load.queue_size,
            processed_count: load.processed_count,
            error_count: load.error_count,
            cpu_utilization: metrics.cpu_percent(),
            gpu_utilization: metrics.gpu_percent(),
            memory_usage: metrics.memory_used_bytes,
            token: identity.token.clone(),
        }
    }
}

/// `data` of a heartbeat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_update: Option<ConfigUpdate>,
    #[serde(default)]
    pub drain_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Shutdown
// ============================================================================

/// Body of `POST /api/v1/services/shutdown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownRequest {
    pub service_id: String,
    pub reason: String,
}

/// `data` of a shutdown response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownResponse {
    #[serde(default)]
    pub grace_period_seconds: u64,
    #[serde(default)]
    pub message: String,
    /// Any other fields the registry sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn identity() -> RegistrationIdentity {
        RegistrationIdentity {
            service_id: "svc-1".to_string(),
            token: "tok-1".to_string(),
            heartbeat_interval: 30,
        }
    }

    #[test]
    fn test_decode_envelope_success() {
        let data: RegisterResponse = decode_envelope(
            "/register",
            json!({
                "code": 0,
                "message": "success",
                "data": {"service_id": "svc-1", "heartbeat_interval": 5, "token": "tok-1"}
            }),
        )
        .unwrap();
        assert_eq!(data.service_id, "svc-1");
        assert_eq!(data.heartbeat_interval, 5);
        assert_eq!(data.config_version, None);
    }

    #[test]
    fn test_decode_envelope_rejected() {
        let err = decode_envelope::<RegisterResponse>(
            "/register",
            json!({"code": 1001, "message": "bad request"}),
        )
        .unwrap_err();
        match err {
            RegistryError::Rejected { code, message } => {
                assert_eq!(code, 1001);
                assert_eq!(message, "bad request");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_envelope_missing_data() {
        let err =
            decode_envelope::<HeartbeatResponse>("/heartbeat", json!({"code": 0, "data": null}))
                .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidResponse(_)));
    }

    #[test]
    fn test_decode_envelope_not_an_envelope() {
        let err = decode_envelope::<HeartbeatResponse>("/heartbeat", json!(["nope"])).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidResponse(_)));
    }

    #[test]
    fn test_register_request_flattens_extra() {
        let mut extra = Map::new();
        extra.insert("zone".to_string(), json!("us-east-1a"));
        let request = RegisterRequest {
            service_type: "text_to_image".to_string(),
            version: "1.0.0".to_string(),
            hostname: "gpu-7".to_string(),
            ip_address: "10.0.0.7".to_string(),
            port: 8080,
            capabilities: Capabilities::default(),
            resources: ResourceSpec::default(),
            performance: PerformanceSpec::default(),
            extra,
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["service_type"], "text_to_image");
        assert_eq!(value["zone"], "us-east-1a");
        assert_eq!(value["resources"]["gpu_model"], "A10");
        assert_eq!(value["performance"]["warmup_time_seconds"], 60);
    }

    #[test]
    fn test_heartbeat_request_from_sample() {
        let metrics = SystemMetrics {
            cpu_utilization: 25.0,
            memory_used_bytes: 1024,
            gpu_utilization: None,
        };
        let load = LoadSnapshot {
            queue_size: 2,
            processed_count: 40,
            error_count: 1,
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let request = HeartbeatRequest::new(&identity(), &metrics, load, now);

        assert_eq!(request.service_id, "svc-1");
        assert_eq!(request.token, "tok-1");
        assert_eq!(request.timestamp, "2026-01-02T03:04:05.000Z");
        assert_eq!(request.current_load, 0.25);
        assert_eq!(request.cpu_utilization, 25.0);
        assert_eq!(request.gpu_utilization, 0.0);
        assert_eq!(request.memory_usage, 1024);
        assert_eq!(request.queue_size, 2);
        assert_eq!(request.processed_count, 40);
        assert_eq!(request.error_count, 1);
    }

    #[test]
    fn test_heartbeat_response_signals() {
        let response: HeartbeatResponse = serde_json::from_value(json!({
            "status": "draining",
            "config_update": {"version": "v2", "config": {"max_batch_size": 2}},
            "drain_requested": true
        }))
        .unwrap();
        assert!(response.drain_requested);
        let update = response.config_update.unwrap();
        assert_eq!(update["version"], "v2");

        let quiet: HeartbeatResponse =
            serde_json::from_value(json!({"status": "healthy", "config_update": null})).unwrap();
        assert!(!quiet.drain_requested);
        assert!(quiet.config_update.is_none());
    }

    #[test]
    fn test_shutdown_response_keeps_unknown_fields() {
        let response: ShutdownResponse = serde_json::from_value(json!({
            "grace_period_seconds": 30,
            "message": "draining",
            "deadline": "2026-01-01T00:00:30Z"
        }))
        .unwrap();
        assert_eq!(response.grace_period_seconds, 30);
        assert_eq!(response.extra["deadline"], "2026-01-01T00:00:30Z");
    }
}
