//! Static service profile declared at registration.
//!
//! A [`ServiceProfile`] bundles what the service can do ([`Capabilities`]),
//! what hardware it was given ([`ResourceSpec`]) and how fast it is expected
//! to be ([`PerformanceSpec`]). The registry uses these for routing and
//! capacity planning; the agent never changes them after construction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Capabilities
// ============================================================================

/// What the service can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Model names served (e.g., "SDXL", "SD1.5").
    pub supported_models: Vec<String>,
    /// Output resolutions (e.g., "1024x1024").
    pub supported_resolutions: Vec<String>,
    /// Largest batch accepted in one request.
    pub max_batch_size: u32,
    /// Output encodings (e.g., "png").
    pub supported_formats: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supported_styles: Vec<String>,
    /// Inclusive `[min, max]` inference steps.
    pub inference_steps_range: [u32; 2],
    /// Inclusive `[min, max]` guidance scale.
    pub guidance_scale_range: [f64; 2],
    /// Free-form capabilities not covered above.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub custom_capabilities: Map<String, Value>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supported_models: Vec::new(),
            supported_resolutions: Vec::new(),
            max_batch_size: 4,
            supported_formats: vec!["png".to_string(), "jpeg".to_string()],
            supported_styles: Vec::new(),
            inference_steps_range: [10, 100],
            guidance_scale_range: [1.0, 20.0],
            custom_capabilities: Map::new(),
        }
    }
}

impl Capabilities {
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resolutions<I, S>(mut self, resolutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_resolutions = resolutions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: u32) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Add one free-form capability entry.
    pub fn with_custom(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_capabilities.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Hardware allocated to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSpec {
    pub gpu_memory: String,
    pub gpu_count: u32,
    pub gpu_model: String,
    pub cpu_cores: u32,
    pub memory: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            gpu_memory: "16GB".to_string(),
            gpu_count: 1,
            gpu_model: "A10".to_string(),
            cpu_cores: 8,
            memory: "32GB".to_string(),
        }
    }
}

// ============================================================================
// Performance
// ============================================================================

/// Declared performance characteristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSpec {
    pub estimated_latency_ms: u64,
    pub throughput_per_minute: u64,
    pub warmup_time_seconds: u64,
}

impl Default for PerformanceSpec {
    fn default() -> Self {
        Self {
            estimated_latency_ms: 2000,
            throughput_per_minute: 30,
            warmup_time_seconds: 60,
        }
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Everything the service declares about itself at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProfile {
    pub capabilities: Capabilities,
    pub resources: ResourceSpec,
    pub performance: PerformanceSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capabilities_baseline() {
        let caps = Capabilities::default();
        assert_eq!(caps.max_batch_size, 4);
        assert_eq!(caps.supported_formats, vec!["png", "jpeg"]);
        assert_eq!(caps.inference_steps_range, [10, 100]);
        assert_eq!(caps.guidance_scale_range, [1.0, 20.0]);
        assert!(caps.supported_models.is_empty());
    }

    #[test]
    fn test_capabilities_wire_shape() {
        let caps = Capabilities::default()
            .with_models(["SDXL", "SD1.5"])
            .with_resolutions(["512x512"])
            .with_custom("lora", json!(true));
        let value = serde_json::to_value(&caps).unwrap();

        assert_eq!(value["supported_models"], json!(["SDXL", "SD1.5"]));
        assert_eq!(value["inference_steps_range"], json!([10, 100]));
        assert_eq!(value["guidance_scale_range"], json!([1.0, 20.0]));
        assert_eq!(value["custom_capabilities"]["lora"], json!(true));
        // Empty optional fields are omitted.
        assert!(value.get("supported_styles").is_none());
    }

    #[test]
    fn test_resource_and_performance_baseline() {
        let resources = ResourceSpec::default();
        assert_eq!(resources.gpu_memory, "16GB");
        assert_eq!(resources.gpu_count, 1);
        assert_eq!(resources.gpu_model, "A10");
        assert_eq!(resources.cpu_cores, 8);
        assert_eq!(resources.memory, "32GB");

        let perf = PerformanceSpec::default();
        assert_eq!(perf.estimated_latency_ms, 2000);
        assert_eq!(perf.throughput_per_minute, 30);
        assert_eq!(perf.warmup_time_seconds, 60);
    }

    #[test]
    fn test_profile_partial_deserialize() {
        let profile: ServiceProfile =
            serde_json::from_str(r#"{"resources": {"gpu_count": 2}}"#).unwrap();
        assert_eq!(profile.resources.gpu_count, 2);
        assert_eq!(profile.resources.gpu_model, "A10");
        assert_eq!(profile.capabilities, Capabilities::default());
    }
}
