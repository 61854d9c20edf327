use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BipperError, BipperResult};

/// Salt shipped by earlier installations. Vaults written with it only open
/// when the same salt is configured.
pub const DEFAULT_SALT_HEX: &str = "d6ef7d0cc9974be1";

/// Top-level configuration (loaded from bipper.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BipperConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub vault: VaultConfig,
}

impl BipperConfig {
    /// Read and parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> BipperResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found (using defaults)");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| BipperError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listen address for /store and /retrieve
    pub listen: String,
    /// Prometheus metrics + health endpoint (unset or empty disables it)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Fs,
    Memory,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite metadata database
    pub database: PathBuf,
    /// Where sealed blobs live
    pub blob_backend: BlobBackend,
    /// Root directory (fs) or key prefix (s3) for blobs
    pub blob_root: String,
    /// S3 endpoint (s3 backend only)
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket
    pub bucket: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Scrypt,
    Argon2id,
}

/// Key derivation configuration. The salt and cost parameters are part of the
/// persisted layout: changing them makes every existing phrase unresolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub kdf: KdfAlgorithm,
    /// Installation-wide salt, hex encoded
    pub salt: String,
    /// scrypt cost: N = 2^log_n
    pub scrypt_log_n: u8,
    pub scrypt_r: u32,
    pub scrypt_p: u32,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl CryptoConfig {
    pub fn salt_bytes(&self) -> BipperResult<Vec<u8>> {
        let salt = hex::decode(&self.salt)
            .map_err(|e| BipperError::Config(format!("crypto.salt is not hex: {e}")))?;
        if salt.is_empty() {
            return Err(BipperError::Config("crypto.salt must not be empty".into()));
        }
        Ok(salt)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Fresh phrases to try when a lookup key collides
    pub commit_attempts: u32,
    /// Staged uploads older than this are considered abandoned
    pub stale_upload_secs: u64,
    /// Periodic reconciliation interval (0 = only at startup)
    pub sweep_interval_secs: u64,
}

impl DaemonConfig {
    /// The metrics listener address, if the listener is enabled.
    pub fn metrics_listen(&self) -> Option<&str> {
        self.metrics_addr.as_deref().filter(|addr| !addr.trim().is_empty())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            metrics_addr: None,
            log_level: "info".into(),
            log_format: "text".into(),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("bipper.sqlite"),
            blob_backend: BlobBackend::Fs,
            blob_root: "store/".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "bipper".into(),
            enforce_tls: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf: KdfAlgorithm::Scrypt,
            salt: DEFAULT_SALT_HEX.into(),
            scrypt_log_n: 15,
            scrypt_r: 8,
            scrypt_p: 1,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            commit_attempts: 3,
            stale_upload_secs: 3600,
            sweep_interval_secs: 0,
        }
    }
}
