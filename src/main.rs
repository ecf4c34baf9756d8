//! # Akuflow
//!
//! Retention email scheduler for the Akuflow learning platform.
//!
//! Usage:
//!   akuflow serve                      # HTTP trigger + admin API (default 127.0.0.1:3000)
//!   akuflow serve --port 8080          # Custom port
//!   akuflow run                        # Run the job once, print the JSON report
//!   akuflow run --dry-run              # Same, but only log the emails
//!   akuflow migrate                    # Create tables and exit

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use akuflow_core::AkuflowConfig;
use akuflow_scheduler::RetentionJob;

#[derive(Parser)]
#[command(
    name = "akuflow",
    version,
    about = "📬 Akuflow: lifecycle retention emails for new learners"
)]
struct Cli {
    /// Config file (default: $AKUFLOW_CONFIG or ~/.akuflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the retention job once
    Run {
        /// Log emails instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Create or update the database schema
    Migrate,
}

fn load_config(path: Option<&PathBuf>) -> Result<AkuflowConfig> {
    let config = match path {
        Some(p) => {
            let mut config = AkuflowConfig::load_from(p)?;
            config.apply_env_overrides();
            config
        }
        None => AkuflowConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "akuflow=debug,tower_http=debug"
    } else {
        "akuflow=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            akuflow_gateway::start(config).await?;
        }
        Command::Run { dry_run } => {
            if dry_run {
                config.mail.provider = "log".into();
            }
            let store = akuflow_db::open_store(&config.storage).await?;
            let sender = akuflow_mail::create_sender(&config.mail)?;
            let job = RetentionJob::new(store, sender, config.retention);
            let report = job.run_now().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Migrate => {
            // Opening a store creates its schema.
            let store = akuflow_db::open_store(&config.storage).await?;
            store.ping().await?;
            println!("✅ Schema ready ({})", store.name());
        }
    }

    Ok(())
}
