//! bipperd: passphrase-gated blob store daemon
//!
//! Usage:
//!   bipperd [--config /etc/bipper/bipper.toml] [--database bipper.sqlite]
//!
//! Serves `POST /store` and `POST /retrieve` on `daemon.listen`, and
//! Prometheus metrics plus health probes on `daemon.metrics_addr`.

mod daemon;
mod http;
mod metrics;

use anyhow::Result;
use bipper_core::config::BipperConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bipperd", version, about = "Passphrase-gated encrypted blob store")]
struct Cli {
    /// Path to bipper.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "BIPPER_CONFIG",
        default_value = "/etc/bipper/bipper.toml"
    )]
    config: PathBuf,

    /// SQLite metadata database (overrides storage.database)
    #[arg(long, env = "BIPPER_DATABASE")]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to daemon.log_level
    #[arg(long, env = "BIPPER_LOG")]
    log: Option<String>,

    /// Log format (json, text); defaults to daemon.log_format
    #[arg(long, env = "BIPPER_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BipperConfig::load(&cli.config)?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }

    let level = cli.log.unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.unwrap_or(match config.daemon.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        config_found = cli.config.exists(),
        "bipperd starting"
    );

    daemon::run(config).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
