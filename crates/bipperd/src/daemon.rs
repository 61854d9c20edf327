//! Daemon lifecycle: open stores, reconcile, serve the vault API and metrics

use anyhow::{Context, Result};
use bipper_core::config::BipperConfig;
use bipper_crypto::{Bip39Generator, KeyDeriver};
use bipper_storage::{OpendalBlobStore, SqliteMetadataStore};
use bipper_vault::{reconcile, VaultOptions, VaultService};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::http::{self, AppState, Vault};
use crate::metrics::{self, HealthState, VaultMetrics};

pub async fn run(config: BipperConfig) -> Result<()> {
    info!("daemon starting");

    // ── Stores ───────────────────────────────────────────────────────────
    let metadata = SqliteMetadataStore::open(&config.storage.database)
        .with_context(|| format!("opening {}", config.storage.database.display()))?;

    let operator =
        bipper_storage::build_operator(&config.storage).context("building blob operator")?;
    match bipper_storage::check_blob_health(&operator).await {
        Ok(()) => info!(backend = ?config.storage.blob_backend, "blob store: connected"),
        // Keep going; the retry layer and /readyz cover transient outages
        Err(e) => warn!(backend = ?config.storage.blob_backend, "blob store: {e}"),
    }

    let deriver = KeyDeriver::from_config(&config.crypto).context("configuring key derivation")?;
    info!(deriver = ?deriver, "key derivation ready");

    let vault: Arc<Vault> = Arc::new(VaultService::new(
        metadata.clone(),
        OpendalBlobStore::new(operator.clone()),
        deriver,
        Bip39Generator,
        VaultOptions::from(&config.vault),
    ));

    // ── Metrics ──────────────────────────────────────────────────────────
    let mut registry = Registry::default();
    let vault_metrics = VaultMetrics::new(&mut registry);
    let registry = Arc::new(registry);

    // ── Startup reconciliation ───────────────────────────────────────────
    let stale_after = Duration::from_secs(config.vault.stale_upload_secs);
    sweep(&vault, &vault_metrics, stale_after).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.daemon.metrics_listen().is_none() {
        info!("metrics listener disabled");
    }

    if let Some(addr) = config.daemon.metrics_listen().map(str::to_owned) {
        let state = HealthState {
            registry: registry.clone(),
            metadata: metadata.clone(),
            operator: operator.clone(),
        };
        let stop = stopped(shutdown_rx.clone());
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(addr, state, stop).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    if config.vault.sweep_interval_secs > 0 {
        let every = Duration::from_secs(config.vault.sweep_interval_secs);
        let vault = vault.clone();
        let vault_metrics = vault_metrics.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately; startup already swept
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep(&vault, &vault_metrics, stale_after).await,
                    _ = shutdown.changed() => break,
                }
            }
        });
        info!(interval_secs = every.as_secs(), "periodic reconciliation enabled");
    }

    // ── Vault API ────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.daemon.listen)
        .await
        .with_context(|| format!("binding {}", config.daemon.listen))?;

    let app = http::router(
        AppState {
            vault,
            metrics: vault_metrics,
        },
        config.daemon.max_upload_bytes,
    );

    notify_ready();
    info!(addr = %config.daemon.listen, "vault API: listening on /store, /retrieve");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("vault API server")?;

    info!("daemon stopped");
    Ok(())
}

async fn sweep(vault: &Vault, vault_metrics: &VaultMetrics, stale_after: Duration) {
    match reconcile(vault.metadata(), vault.blobs(), stale_after).await {
        Ok(report) => vault_metrics.observe_reconcile(&report),
        Err(e) => warn!("reconciliation failed: {e}"),
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
}

fn notify_ready() {
    // Send sd_notify(READY=1) to systemd if running as a service
    // Uses $NOTIFY_SOCKET env var; no-op if not set
    #[cfg(unix)]
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
