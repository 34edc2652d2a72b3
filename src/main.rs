use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "registry-agent")]
#[command(about = "Register a service with the registry and keep it alive", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register, heartbeat until interrupted (or for --duration), then deregister
    Run {
        /// Service type to register as
        #[arg(short = 't', long, default_value = "text_to_image")]
        service_type: String,

        /// Service version reported at registration
        #[arg(long)]
        version: Option<String>,

        /// Stop after this long instead of waiting for Ctrl+C (e.g. 90s, 5m)
        #[arg(short, long)]
        duration: Option<String>,

        /// Load configuration from this .env file instead of the environment
        #[arg(long)]
        env_file: Option<std::path::PathBuf>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Some(Commands::Version) | None => {
            println!("registry-agent {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run {
            service_type,
            version,
            duration,
            env_file,
        }) => {
            cli::run::cmd_run(service_type, version, duration, env_file).await?;
        }
    }

    Ok(())
}
