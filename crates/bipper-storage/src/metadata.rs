//! Vault metadata (SQLite): lookup key → encrypted filename + nonces
//!
//! Records are append-only. Uniqueness of the lookup key is the primary-key
//! constraint; no application-level locking beyond serialising access to the
//! single connection.
//!
//! Alongside the records lives `pending_uploads`, the write-ahead list of blob
//! addresses whose record has not been committed yet. `insert` consumes the
//! matching stage row in the same transaction that adds the record, and fails
//! if the row is gone: a stage row cleared by reconciliation means the blob
//! may already be deleted.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bipper_core::{BipperError, BipperResult, BlobAddress, LookupKey, StagedUpload, VaultRecord};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::migrations::migrations;

/// Durable keyed relation of vault records plus upload staging.
pub trait MetadataStore: Send + Sync {
    /// Insert a new record and consume its stage row. `DuplicateKey` if the
    /// lookup key is already taken, `UploadNotStaged` if the stage row is gone.
    fn insert(&self, record: &VaultRecord) -> impl Future<Output = BipperResult<()>> + Send;

    fn find_by_lookup_key(
        &self,
        key: &LookupKey,
    ) -> impl Future<Output = BipperResult<Option<VaultRecord>>> + Send;

    /// Record the intent to write a blob at `address`.
    fn stage_upload(&self, address: &BlobAddress) -> impl Future<Output = BipperResult<()>> + Send;

    /// Drop the stage row for `address`. Returns whether a row was removed;
    /// `false` means a record already consumed it (or it was never staged).
    fn abandon_upload(
        &self,
        address: &BlobAddress,
    ) -> impl Future<Output = BipperResult<bool>> + Send;

    fn staged_uploads(&self) -> impl Future<Output = BipperResult<Vec<StagedUpload>>> + Send;

    /// Blob addresses referenced by committed records.
    fn recorded_addresses(&self) -> impl Future<Output = BipperResult<Vec<BlobAddress>>> + Send;
}

/// `MetadataStore` on a single shared SQLite connection.
///
/// rusqlite is synchronous, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStore").finish_non_exhaustive()
    }
}

fn sql_err(context: &str, e: impl std::fmt::Display) -> BipperError {
    BipperError::StorageIo(format!("{context}: {e}"))
}

/// `filename` has TEXT affinity; older rows may hold the ciphertext as
/// either storage class.
fn bytes_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    match row.get_ref(idx)? {
        ValueRef::Blob(b) | ValueRef::Text(b) => Ok(b.to_vec()),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "filename".into(),
            other.data_type(),
        )),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl SqliteMetadataStore {
    /// Open (or create) the database file, enable WAL and bring the schema
    /// up to date.
    pub fn open(path: &Path) -> BipperResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| sql_err(&format!("opening {}", path.display()), e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| sql_err("enabling WAL", e))?;
        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "metadata store opened");
        Ok(store)
    }

    /// Private in-memory database (tests, throwaway deployments).
    pub fn open_in_memory() -> BipperResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| sql_err("opening in-memory db", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> BipperResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| sql_err("setting busy timeout", e))?;
        migrations()
            .to_latest(&mut conn)
            .map_err(|e| sql_err("migrating metadata schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Readiness probe: the connection answers a trivial query.
    pub async fn ping(&self) -> BipperResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| sql_err("ping", e))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> BipperResult<T>
    where
        F: FnOnce(&mut Connection) -> BipperResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| BipperError::StorageIo("metadata connection mutex poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| BipperError::Other(anyhow::anyhow!("metadata task failed: {e}")))?
    }
}

impl MetadataStore for SqliteMetadataStore {
    async fn insert(&self, record: &VaultRecord) -> BipperResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(|e| sql_err("begin", e))?;

            let address = record.blob_address();
            let unstaged = tx
                .execute(
                    "DELETE FROM pending_uploads WHERE address = ?1",
                    params![address.as_str()],
                )
                .map_err(|e| sql_err("consuming stage", e))?;
            if unstaged == 0 {
                return Err(BipperError::UploadNotStaged(address.short().to_string()));
            }

            let inserted = tx.execute(
                "INSERT INTO blobs (passphrase_hash, filename, content_nonce, filename_nonce)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.lookup_key.as_bytes().as_slice(),
                    record.encrypted_filename,
                    record.content_nonce,
                    record.filename_nonce,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(BipperError::DuplicateKey);
                }
                Err(e) => return Err(sql_err("inserting vault record", e)),
            }

            tx.commit().map_err(|e| sql_err("commit", e))
        })
        .await
    }

    async fn find_by_lookup_key(&self, key: &LookupKey) -> BipperResult<Option<VaultRecord>> {
        let key = *key;
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT filename, content_nonce, filename_nonce
                     FROM blobs WHERE passphrase_hash = ?1",
                    params![key.as_bytes().as_slice()],
                    |row| {
                        Ok((
                            bytes_column(row, 0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| sql_err("looking up vault record", e))?;

            Ok(row.map(
                |(encrypted_filename, content_nonce, filename_nonce)| VaultRecord {
                    lookup_key: key,
                    encrypted_filename,
                    content_nonce,
                    filename_nonce,
                },
            ))
        })
        .await
    }

    async fn stage_upload(&self, address: &BlobAddress) -> BipperResult<()> {
        let address = address.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pending_uploads (address, staged_at) VALUES (?1, ?2)",
                params![address.as_str(), unix_now() as i64],
            )
            .map(|_| ())
            .map_err(|e| sql_err("staging upload", e))
        })
        .await
    }

    async fn abandon_upload(&self, address: &BlobAddress) -> BipperResult<bool> {
        let address = address.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM pending_uploads WHERE address = ?1",
                params![address.as_str()],
            )
            .map(|removed| removed > 0)
            .map_err(|e| sql_err("abandoning upload", e))
        })
        .await
    }

    async fn staged_uploads(&self) -> BipperResult<Vec<StagedUpload>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT address, staged_at FROM pending_uploads")
                .map_err(|e| sql_err("listing staged uploads", e))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(|e| sql_err("listing staged uploads", e))?;

            let mut staged = Vec::new();
            for row in rows {
                let (address, staged_at) = row.map_err(|e| sql_err("reading staged upload", e))?;
                match BlobAddress::parse(&address) {
                    Some(address) => staged.push(StagedUpload {
                        address,
                        staged_at: staged_at.max(0) as u64,
                    }),
                    None => tracing::warn!(%address, "ignoring malformed staged address"),
                }
            }
            Ok(staged)
        })
        .await
    }

    async fn recorded_addresses(&self) -> BipperResult<Vec<BlobAddress>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT filename FROM blobs")
                .map_err(|e| sql_err("listing records", e))?;
            let rows = stmt
                .query_map([], |row| bytes_column(row, 0))
                .map_err(|e| sql_err("listing records", e))?;

            rows.map(|row| {
                row.map(|name| BlobAddress::from_encrypted_filename(&name))
                    .map_err(|e| sql_err("reading record", e))
            })
            .collect()
        })
        .await
    }
}
