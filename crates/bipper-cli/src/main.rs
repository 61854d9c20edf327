//! bipper: passphrase-gated vault CLI
//!
//! Commands:
//!   store <file> [--name NAME]   - seal a file, print its 24-word passphrase
//!   retrieve [--out DIR]         - recover a file from its passphrase
//!   sweep [--stale-after SECS]   - reconcile blobs against metadata
//!   config show                  - display current configuration
//!
//! Works directly on the stores named in the config file; no daemon needed.

use anyhow::{Context, Result};
use bipper_core::config::BipperConfig;
use bipper_crypto::{validate_phrase, Bip39Generator, KeyDeriver};
use bipper_storage::{OpendalBlobStore, SqliteMetadataStore};
use bipper_vault::{reconcile, VaultOptions, VaultService};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

type Vault = VaultService<SqliteMetadataStore, OpendalBlobStore>;

/// Name used when a stored filename has no usable final component
const FALLBACK_NAME: &str = "bipper-retrieved";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "bipper",
    version,
    about = "Passphrase-gated encrypted file vault",
    long_about = "bipper: seal files under a one-time 24-word passphrase and recover them with it"
)]
struct Cli {
    /// Path to bipper.toml configuration file
    #[arg(long, short = 'c', env = "BIPPER_CONFIG", default_value = "/etc/bipper/bipper.toml")]
    config: PathBuf,

    /// SQLite metadata database (overrides storage.database)
    #[arg(long, env = "BIPPER_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal a file and print the passphrase that recovers it
    Store {
        /// File to seal
        file: PathBuf,
        /// Filename to record instead of the file's own name
        #[arg(long, short = 'n')]
        name: Option<String>,
    },

    /// Recover a file from its passphrase
    ///
    /// The passphrase is read from BIPPER_PASSPHRASE or prompted for without echo.
    Retrieve {
        /// Directory to write the recovered file into
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
        /// Overwrite an existing file of the same name
        #[arg(long)]
        force: bool,
    },

    /// Remove orphaned blobs and stale uploads; report records without blobs
    Sweep {
        /// Age in seconds after which an uncommitted upload is abandoned
        /// (default: vault.stale_upload_secs)
        #[arg(long)]
        stale_after: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = BipperConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }

    match cli.command {
        Commands::Store { file, name } => cmd_store(&config, &file, name.as_deref()).await,
        Commands::Retrieve { out, force } => cmd_retrieve(&config, &out, force).await,
        Commands::Sweep { stale_after } => cmd_sweep(&config, stale_after).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

/// Diagnostics go to stderr so stdout stays clean for the passphrase.
fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("BIPPER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Vault construction ────────────────────────────────────────────────────────

fn open_vault(config: &BipperConfig) -> Result<Vault> {
    let metadata = SqliteMetadataStore::open(&config.storage.database)
        .with_context(|| format!("opening {}", config.storage.database.display()))?;
    let operator =
        bipper_storage::build_operator(&config.storage).context("building blob operator")?;
    let deriver = KeyDeriver::from_config(&config.crypto).context("configuring key derivation")?;

    Ok(VaultService::new(
        metadata,
        OpendalBlobStore::new(operator),
        deriver,
        Bip39Generator,
        VaultOptions::from(&config.vault),
    ))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `bipper store` ────────────────────────────────────────────────────────────

async fn cmd_store(config: &BipperConfig, file: &Path, name: Option<&str>) -> Result<()> {
    let filename = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {}", file.display()))?,
    };
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let vault = open_vault(config)?;

    let pb = make_spinner("store");
    pb.set_message(format!("sealing {} ({})", filename, fmt_bytes(content.len() as u64)));
    let result = vault.commit(&filename, &content).await;
    pb.finish_and_clear();

    let phrase = result.with_context(|| format!("storing {}", file.display()))?;

    eprintln!("Stored {filename}. This passphrase is the only way to recover it:");
    println!("{}", phrase.expose_secret());
    Ok(())
}

// ── `bipper retrieve` ─────────────────────────────────────────────────────────

async fn cmd_retrieve(config: &BipperConfig, out_dir: &Path, force: bool) -> Result<()> {
    let phrase = read_passphrase()?;
    if !validate_phrase(phrase.expose_secret()) {
        eprintln!("warning: input is not a valid BIP-39 phrase; trying anyway");
    }

    let vault = open_vault(config)?;

    let pb = make_spinner("retrieve");
    pb.set_message("deriving keys");
    let result = vault.reveal(&phrase).await;
    pb.finish_and_clear();

    let revealed = result.map_err(|e| {
        tracing::debug!(error = %e, "reveal failed");
        anyhow::anyhow!(e.outcome().message())
    })?;

    let path = output_path(out_dir, &revealed.filename);
    write_output(&path, &revealed.content, force)?;

    println!(
        "{} ({})",
        path.display(),
        fmt_bytes(revealed.content.len() as u64)
    );
    Ok(())
}

fn read_passphrase() -> Result<SecretString> {
    if let Ok(phrase) = std::env::var("BIPPER_PASSPHRASE") {
        return Ok(SecretString::from(phrase));
    }
    let phrase = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    // Terminal input carries the line ending; the phrase itself is hashed verbatim
    Ok(SecretString::from(phrase.trim_end_matches(['\r', '\n']).to_string()))
}

/// Place the recovered file in `out_dir` under the final component of the
/// stored name only, so a stored name can never point outside `out_dir`.
fn output_path(out_dir: &Path, stored_name: &str) -> PathBuf {
    let name = stored_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(FALLBACK_NAME);
    out_dir.join(name)
}

fn write_output(path: &Path, content: &[u8], force: bool) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {} (use --force to overwrite)", path.display()))?;
    file.write_all(content)
        .with_context(|| format!("writing {}", path.display()))
}

// ── `bipper sweep` ────────────────────────────────────────────────────────────

async fn cmd_sweep(config: &BipperConfig, stale_after: Option<u64>) -> Result<()> {
    let vault = open_vault(config)?;
    let stale_after =
        Duration::from_secs(stale_after.unwrap_or(config.vault.stale_upload_secs));

    let report = reconcile(vault.metadata(), vault.blobs(), stale_after)
        .await
        .context("reconciling storage")?;

    println!("Sweep complete:");
    println!("  orphan blobs removed:  {}", report.orphan_blobs_removed);
    println!("  stale uploads cleared: {}", report.stale_uploads_cleared);
    println!("  records missing blobs: {}", report.missing_blobs.len());
    for address in &report.missing_blobs {
        println!("    {address}");
    }
    Ok(())
}

// ── `bipper config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &BipperConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
