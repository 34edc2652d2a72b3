//! Run command: register, heartbeat until told to stop, deregister.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tracing::info;

use registry_agent::{ConfigUpdate, RegisterOptions, RegistryClient, RegistryConfig};
use registry_agent::Result as AgentResult;

/// Parse a duration like "1h", "30m", "90s" or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let secs = if let Some(hours) = s.strip_suffix('h') {
        let n: u64 = hours.parse().with_context(|| "Invalid hours value")?;
        n * 3600
    } else if let Some(mins) = s.strip_suffix('m') {
        let n: u64 = mins.parse().with_context(|| "Invalid minutes value")?;
        n * 60
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().with_context(|| "Invalid seconds value")?
    } else {
        s.parse::<u64>()
            .with_context(|| "Invalid duration. Use formats like 1h, 30m, or 90s")?
    };
    Ok(Duration::from_secs(secs))
}

pub(crate) async fn cmd_run(
    service_type: String,
    version: Option<String>,
    duration: Option<String>,
    env_file: Option<PathBuf>,
) -> Result<()> {
    let duration = duration.as_deref().map(parse_duration).transpose()?;

    let config = match env_file {
        Some(path) => RegistryConfig::from_env_file(&path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => RegistryConfig::from_env().context("Failed to load configuration")?,
    };
    println!("Registry: {}", config.base_url);

    let client = RegistryClient::new(config).context("Failed to create registry client")?;

    let drained = Arc::new(Notify::new());
    client.set_config_update_hook(Arc::new(|update: &ConfigUpdate| -> AgentResult<()> {
        info!("Applying config update: {}", serde_json::Value::Object(update.clone()));
        Ok(())
    }));
    {
        let drained = Arc::clone(&drained);
        client.set_drain_hook(Arc::new(move |_: &RegistryClient| -> AgentResult<()> {
            info!("Registry requested drain");
            drained.notify_one();
            Ok(())
        }));
    }

    let mut options = RegisterOptions::default();
    if let Some(version) = version {
        options = options.version(version);
    }
    let identity = client
        .register(&service_type, options)
        .await
        .with_context(|| format!("Failed to register as '{}'", service_type))?;

    println!("Registered: {}", identity.service_id);
    println!("Heartbeat every {}s", identity.heartbeat_interval);
    match duration {
        Some(d) => println!("Running for {:?}, Ctrl+C to stop early.", d),
        None => println!("Press Ctrl+C to stop."),
    }
    println!();

    let reason = client
        .run_with_heartbeat(async {
            let until_deadline = async {
                match duration {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "Interrupted",
                _ = drained.notified() => "Drained by registry",
                _ = until_deadline => "Run duration elapsed",
            }
        })
        .await?;

    let stats = client.heartbeat_stats();
    println!(
        "Heartbeats: {} sent, {} failed",
        stats.successes, stats.failures
    );

    let response = client
        .shutdown(reason)
        .await
        .context("Failed to deregister")?;
    println!(
        "Deregistered ({}), grace period {}s",
        reason, response.grace_period_seconds
    );

    Ok(())
}
