//! Shared fixtures for vault integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bipper_core::{BipperError, BipperResult, BlobAddress, LookupKey, StagedUpload, VaultRecord};
use bipper_crypto::{Bip39Generator, KdfParams, KeyDeriver, PhraseSource};
use bipper_storage::{memory_operator, BlobStore, MetadataStore, OpendalBlobStore, SqliteMetadataStore};
use bipper_vault::{VaultOptions, VaultService};
use secrecy::SecretString;

pub const LEGACY_SALT: [u8; 8] = [0xd6, 0xef, 0x7d, 0x0c, 0xc9, 0x97, 0x4b, 0xe1];

pub const ZERO_ENTROPY_PHRASE: &str = "abandon abandon abandon abandon abandon abandon \
    abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
    abandon abandon abandon abandon abandon abandon abandon art";

/// scrypt at N = 16: same construction, test-speed cost.
pub fn fast_deriver() -> KeyDeriver {
    KeyDeriver::new(
        LEGACY_SALT.to_vec(),
        KdfParams::Scrypt {
            log_n: 4,
            r: 8,
            p: 1,
        },
    )
    .unwrap()
}

pub type MemVault<G = Bip39Generator> = VaultService<SqliteMetadataStore, OpendalBlobStore, G>;

pub fn memory_vault() -> MemVault {
    vault_with(
        SqliteMetadataStore::open_in_memory().unwrap(),
        OpendalBlobStore::new(memory_operator().unwrap()),
        Bip39Generator,
    )
}

/// Vault on a SQLite file so tests can reach the table directly.
pub fn file_vault(dir: &Path) -> MemVault {
    vault_with(
        SqliteMetadataStore::open(&dir.join("bipper.sqlite")).unwrap(),
        OpendalBlobStore::new(memory_operator().unwrap()),
        Bip39Generator,
    )
}

pub fn vault_with<M, B, G>(metadata: M, blobs: B, phrases: G) -> VaultService<M, B, G>
where
    M: MetadataStore,
    B: BlobStore,
    G: PhraseSource,
{
    VaultService::new(metadata, blobs, fast_deriver(), phrases, VaultOptions::default())
}

/// Hands out a fixed sequence of phrases, repeating the last one.
pub struct ScriptedPhrases {
    queue: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedPhrases {
    pub fn new(phrases: &[&str]) -> Self {
        Self {
            queue: Mutex::new(phrases.iter().map(|p| p.to_string()).collect()),
            last: Mutex::new(phrases.last().map(|p| p.to_string()).unwrap_or_default()),
        }
    }
}

impl PhraseSource for ScriptedPhrases {
    fn generate(&self) -> BipperResult<SecretString> {
        let next = self.queue.lock().unwrap().pop_front();
        let phrase = next.unwrap_or_else(|| self.last.lock().unwrap().clone());
        Ok(SecretString::from(phrase))
    }
}

/// A phrase source whose entropy is gone.
pub struct DeadEntropy;

impl PhraseSource for DeadEntropy {
    fn generate(&self) -> BipperResult<SecretString> {
        Err(BipperError::EntropySource("getrandom unavailable".into()))
    }
}

/// Blob store that refuses every write.
#[derive(Clone)]
pub struct FailingWrites(pub OpendalBlobStore);

impl BlobStore for FailingWrites {
    async fn write(&self, _address: &BlobAddress, _content: Vec<u8>) -> BipperResult<()> {
        Err(BipperError::StorageIo("disk full".into()))
    }
    async fn read(&self, address: &BlobAddress) -> BipperResult<Option<Vec<u8>>> {
        self.0.read(address).await
    }
    async fn delete(&self, address: &BlobAddress) -> BipperResult<()> {
        self.0.delete(address).await
    }
    async fn list(&self) -> BipperResult<Vec<BlobAddress>> {
        self.0.list().await
    }
}

/// Blob store whose deletes fail, so compensation cannot finish.
#[derive(Clone)]
pub struct StickyBlobs(pub OpendalBlobStore);

impl BlobStore for StickyBlobs {
    async fn write(&self, address: &BlobAddress, content: Vec<u8>) -> BipperResult<()> {
        self.0.write(address, content).await
    }
    async fn read(&self, address: &BlobAddress) -> BipperResult<Option<Vec<u8>>> {
        self.0.read(address).await
    }
    async fn delete(&self, _address: &BlobAddress) -> BipperResult<()> {
        Err(BipperError::StorageIo("permission denied".into()))
    }
    async fn list(&self) -> BipperResult<Vec<BlobAddress>> {
        self.0.list().await
    }
}

/// Metadata store whose inserts fail with an I/O error after `ok_inserts` successes.
#[derive(Clone)]
pub struct FailingInserts {
    pub inner: SqliteMetadataStore,
    ok_inserts: std::sync::Arc<AtomicUsize>,
}

impl FailingInserts {
    pub fn new(inner: SqliteMetadataStore, ok_inserts: usize) -> Self {
        Self {
            inner,
            ok_inserts: std::sync::Arc::new(AtomicUsize::new(ok_inserts)),
        }
    }
}

impl MetadataStore for FailingInserts {
    async fn insert(&self, record: &VaultRecord) -> BipperResult<()> {
        let remaining = self.ok_inserts.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(BipperError::StorageIo("database is locked".into()));
        }
        self.ok_inserts.store(remaining - 1, Ordering::SeqCst);
        self.inner.insert(record).await
    }
    async fn find_by_lookup_key(&self, key: &LookupKey) -> BipperResult<Option<VaultRecord>> {
        self.inner.find_by_lookup_key(key).await
    }
    async fn stage_upload(&self, address: &BlobAddress) -> BipperResult<()> {
        self.inner.stage_upload(address).await
    }
    async fn abandon_upload(&self, address: &BlobAddress) -> BipperResult<bool> {
        self.inner.abandon_upload(address).await
    }
    async fn staged_uploads(&self) -> BipperResult<Vec<StagedUpload>> {
        self.inner.staged_uploads().await
    }
    async fn recorded_addresses(&self) -> BipperResult<Vec<BlobAddress>> {
        self.inner.recorded_addresses().await
    }
}

/// Metadata store that lands a held-back record right after the stage rows
/// have been read, the way a commit finishing mid-sweep would.
pub struct InsertsDuringSweep {
    pub inner: SqliteMetadataStore,
    held: Mutex<Option<VaultRecord>>,
}

impl InsertsDuringSweep {
    pub fn new(inner: SqliteMetadataStore, held: VaultRecord) -> Self {
        Self {
            inner,
            held: Mutex::new(Some(held)),
        }
    }
}

impl MetadataStore for InsertsDuringSweep {
    async fn insert(&self, record: &VaultRecord) -> BipperResult<()> {
        self.inner.insert(record).await
    }
    async fn find_by_lookup_key(&self, key: &LookupKey) -> BipperResult<Option<VaultRecord>> {
        self.inner.find_by_lookup_key(key).await
    }
    async fn stage_upload(&self, address: &BlobAddress) -> BipperResult<()> {
        self.inner.stage_upload(address).await
    }
    async fn abandon_upload(&self, address: &BlobAddress) -> BipperResult<bool> {
        self.inner.abandon_upload(address).await
    }
    async fn staged_uploads(&self) -> BipperResult<Vec<StagedUpload>> {
        let staged = self.inner.staged_uploads().await?;
        let held = self.held.lock().unwrap().take();
        if let Some(record) = held {
            self.inner.insert(&record).await?;
        }
        Ok(staged)
    }
    async fn recorded_addresses(&self) -> BipperResult<Vec<BlobAddress>> {
        self.inner.recorded_addresses().await
    }
}

/// A record whose blob address is derived from `name_byte`.
pub fn raw_record(key_byte: u8, name_byte: u8) -> VaultRecord {
    VaultRecord {
        lookup_key: LookupKey::from_bytes([key_byte; 32]),
        encrypted_filename: vec![name_byte; 26],
        content_nonce: vec![1u8; 12],
        filename_nonce: vec![2u8; 12],
    }
}
