//! Best-effort GPU utilization probes.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Reads GPU utilization as a percentage.
///
/// `None` means no GPU telemetry is available on this host. Callers bound
/// the call with a timeout and drop the future when it expires.
#[async_trait]
pub trait GpuProbe: Send + Sync {
    async fn utilization(&self) -> Option<f64>;
}

/// Probe for hosts without a GPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGpu;

#[async_trait]
impl GpuProbe for NoGpu {
    async fn utilization(&self) -> Option<f64> {
        None
    }
}

/// Queries the first NVIDIA GPU through `nvidia-smi`.
///
/// Once the binary is found to be missing the probe stops spawning it. The
/// child is killed if the probe future is dropped before it exits.
#[derive(Debug, Default)]
pub struct NvidiaSmiProbe {
    unavailable: AtomicBool,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GpuProbe for NvidiaSmiProbe {
    async fn utilization(&self) -> Option<f64> {
        if self.unavailable.load(Ordering::Relaxed) {
            return None;
        }

        let output = match Command::new("nvidia-smi")
            .args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("nvidia-smi not found, GPU utilization will be reported as 0");
                self.unavailable.store(true, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                debug!("nvidia-smi failed to start: {}", e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("nvidia-smi exited with {}", output.status);
            return None;
        }

        parse_nvidia_smi_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `--format=csv,noheader,nounits` output: one utilization per GPU,
/// one per line. Returns the first GPU's value.
pub fn parse_nvidia_smi_output(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
}
