//! OpenDAL Operator factory for bipper blob backends

use anyhow::{Context, Result};
use bipper_core::config::{BlobBackend, StorageConfig};
use opendal::Operator;

/// Minimal config needed to build an S3 operator
struct S3Settings {
    endpoint: String,
    region: String,
    bucket: String,
    root: String,
    access_key_id: String,
    secret_access_key: String,
}

/// Build the blob operator selected by `storage.blob_backend`.
///
/// S3 credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    match cfg.blob_backend {
        BlobBackend::Fs => {
            let builder = opendal::services::Fs::default().root(&cfg.blob_root);
            let op = Operator::new(builder)
                .context("creating OpenDAL fs operator")?
                .finish();
            Ok(with_layers(op))
        }
        BlobBackend::Memory => {
            tracing::warn!("memory blob backend: sealed blobs will not survive a restart");
            memory_operator()
        }
        BlobBackend::S3 => {
            let access_key = std::env::var("AWS_ACCESS_KEY_ID")
                .context("S3 blob backend needs AWS_ACCESS_KEY_ID")?;
            let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("S3 blob backend needs AWS_SECRET_ACCESS_KEY")?;
            build_from_core_config(cfg, &access_key, &secret_key)
        }
    }
}

/// In-memory operator (tests and throwaway deployments).
pub fn memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish();
    Ok(op)
}

/// Build an S3 operator (any S3-compatible endpoint, path-style addressing).
fn build_s3_operator(cfg: &S3Settings) -> Result<Operator> {
    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .root(&cfg.root)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .finish();
    Ok(with_layers(op))
}

/// Build an S3 operator from the `[storage]` section + loaded credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
fn build_from_core_config(
    storage: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    build_s3_operator(&S3Settings {
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        root: storage.blob_root.clone(),
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
    })
}

fn with_layers(op: Operator) -> Operator {
    op.layer(opendal::layers::LoggingLayer::default()).layer(
        opendal::layers::RetryLayer::new()
            .with_max_times(5)
            .with_jitter(),
    )
}
