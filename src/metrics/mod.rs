//! Local host telemetry for heartbeats.
//!
//! [`MetricsProvider`] is the seam between the heartbeat sender and the
//! machine. [`SysinfoMetrics`] reads CPU and memory through `sysinfo` and GPU
//! utilization through a [`GpuProbe`]. Sampling never fails: anything that
//! cannot be read is reported as zero. A GPU probe that does not answer
//! within [`DEFAULT_GPU_PROBE_TIMEOUT`] is treated as unavailable.

mod gpu;
pub mod host;

pub use gpu::{parse_nvidia_smi_output, GpuProbe, NoGpu, NvidiaSmiProbe};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::System;
use tracing::warn;

/// Upper bound on one GPU probe.
pub const DEFAULT_GPU_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One reading of local resource usage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemMetrics {
    /// Global CPU utilization, 0-100.
    pub cpu_utilization: f64,
    /// Used physical memory in bytes.
    pub memory_used_bytes: u64,
    /// GPU utilization, 0-100, when a GPU could be queried.
    pub gpu_utilization: Option<f64>,
}

impl SystemMetrics {
    /// CPU load as a fraction in `[0, 1]`.
    pub fn current_load(&self) -> f64 {
        (self.cpu_utilization / 100.0).clamp(0.0, 1.0)
    }

    /// CPU utilization clamped to `[0, 100]`.
    pub fn cpu_percent(&self) -> f64 {
        self.cpu_utilization.clamp(0.0, 100.0)
    }

    /// GPU utilization clamped to `[0, 100]`, zero when unavailable.
    pub fn gpu_percent(&self) -> f64 {
        self.gpu_utilization.unwrap_or(0.0).clamp(0.0, 100.0)
    }
}

/// Source of live resource metrics.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn sample(&self) -> SystemMetrics;
}

/// Metrics read from the local machine.
pub struct SysinfoMetrics {
    system: Arc<Mutex<System>>,
    gpu: Arc<dyn GpuProbe>,
    gpu_timeout: Duration,
}

impl SysinfoMetrics {
    /// Provider with the `nvidia-smi` GPU probe.
    pub fn new() -> Self {
        Self::with_gpu_probe(Arc::new(NvidiaSmiProbe::new()))
    }

    pub fn with_gpu_probe(gpu: Arc<dyn GpuProbe>) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Arc::new(Mutex::new(system)),
            gpu,
            gpu_timeout: DEFAULT_GPU_PROBE_TIMEOUT,
        }
    }

    /// Bound each GPU probe by `timeout` instead of the default.
    pub fn with_gpu_timeout(mut self, timeout: Duration) -> Self {
        self.gpu_timeout = timeout;
        self
    }

    /// CPU percent and used memory bytes.
    fn read_host(system: &Mutex<System>) -> (f64, u64) {
        let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu();
        system.refresh_memory();
        (
            f64::from(system.global_cpu_info().cpu_usage()),
            system.used_memory(),
        )
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProvider for SysinfoMetrics {
    async fn sample(&self) -> SystemMetrics {
        let system = Arc::clone(&self.system);
        // sysinfo refreshes block.
        let host = tokio::task::spawn_blocking(move || Self::read_host(&system));
        let gpu = tokio::time::timeout(self.gpu_timeout, self.gpu.utilization());
        let (host, gpu) = tokio::join!(host, gpu);

        let (cpu_utilization, memory_used_bytes) = host.unwrap_or_else(|e| {
            warn!("Metrics sampling task failed: {}", e);
            (0.0, 0)
        });
        let gpu_utilization = gpu.unwrap_or_else(|_| {
            warn!("GPU probe did not answer within {:?}", self.gpu_timeout);
            None
        });

        SystemMetrics {
            cpu_utilization,
            memory_used_bytes,
            gpu_utilization,
        }
    }
}

/// Fixed metrics, for tests and for hosts where sampling is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticMetrics(pub SystemMetrics);

#[async_trait]
impl MetricsProvider for StaticMetrics {
    async fn sample(&self) -> SystemMetrics {
        self.0
    }
}
