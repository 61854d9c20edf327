//! Vault service: commit a file under a fresh phrase, reveal it with that phrase
//!
//! Commit ordering (per attempt):
//!   1. stage the blob address in `pending_uploads`
//!   2. write the sealed content blob
//!   3. insert the record (same transaction consumes the stage row)
//!
//! A record is therefore never visible without its blob. A failure after
//! step 2 is compensated by deleting the blob; whatever compensation misses
//! is left staged for the reconciler.

use std::fmt;
use std::sync::Arc;

use bipper_core::config::VaultConfig;
use bipper_core::types::check_filename;
use bipper_core::{BipperError, BipperResult, BlobAddress, VaultRecord};
use bipper_crypto::{open, seal, Bip39Generator, DerivedKeys, KeyDeriver, PhraseSource};
use bipper_storage::{BlobStore, MetadataStore};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

/// Tunables for the commit path.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    /// Fresh phrases tried before a lookup-key collision becomes an error
    pub commit_attempts: u32,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self { commit_attempts: 3 }
    }
}

impl From<&VaultConfig> for VaultOptions {
    fn from(cfg: &VaultConfig) -> Self {
        Self {
            commit_attempts: cfg.commit_attempts,
        }
    }
}

/// A revealed secret.
pub struct Revealed {
    pub filename: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for Revealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revealed")
            .field("filename_len", &self.filename.len())
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// Orchestrates phrase generation, key derivation, sealing and both stores.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct VaultService<M, B, G = Bip39Generator> {
    metadata: M,
    blobs: B,
    deriver: Arc<KeyDeriver>,
    phrases: G,
    options: VaultOptions,
}

impl<M, B, G> VaultService<M, B, G>
where
    M: MetadataStore,
    B: BlobStore,
    G: PhraseSource,
{
    pub fn new(
        metadata: M,
        blobs: B,
        deriver: KeyDeriver,
        phrases: G,
        options: VaultOptions,
    ) -> Self {
        Self {
            metadata,
            blobs,
            deriver: Arc::new(deriver),
            phrases,
            options,
        }
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Seal `content` under a newly generated phrase and return the phrase.
    ///
    /// The phrase is the only way back to the content; it is not persisted.
    pub async fn commit(&self, filename: &str, content: &[u8]) -> BipperResult<SecretString> {
        check_filename(filename)?;

        let attempts = self.options.commit_attempts.max(1);
        for attempt in 1..=attempts {
            let phrase = self.phrases.generate()?;
            let keys = self.derive(&phrase).await?;

            let sealed_content = seal(&keys.content_key, content)?;
            let sealed_name = seal(&keys.filename_key, filename.as_bytes())?;

            let record = VaultRecord {
                lookup_key: keys.lookup_key,
                encrypted_filename: sealed_name.ciphertext,
                content_nonce: sealed_content.nonce.to_vec(),
                filename_nonce: sealed_name.nonce.to_vec(),
            };
            let address = record.blob_address();

            self.metadata.stage_upload(&address).await?;

            if let Err(e) = self.blobs.write(&address, sealed_content.ciphertext).await {
                warn!(address = %address.short(), error = %e, "blob write failed");
                self.compensate(&address).await;
                return Err(e);
            }

            match self.metadata.insert(&record).await {
                Ok(()) => {
                    info!(
                        address = %address.short(),
                        bytes = content.len(),
                        attempt,
                        "secret committed"
                    );
                    return Ok(phrase);
                }
                Err(BipperError::DuplicateKey) => {
                    warn!(attempt, attempts, "lookup key collision, retrying with a fresh phrase");
                    self.compensate(&address).await;
                }
                Err(e) => {
                    warn!(address = %address.short(), error = %e, "record insert failed");
                    self.compensate(&address).await;
                    return Err(e);
                }
            }
        }

        error!(attempts, "lookup key collided on every attempt");
        Err(BipperError::DuplicateKey)
    }

    /// Recover the filename and content sealed under `phrase`.
    ///
    /// Unknown phrases and phrases that fail authentication are reported
    /// separately here (`NotFound` / `Authentication`) but map to the same
    /// caller-visible outcome.
    pub async fn reveal(&self, phrase: &SecretString) -> BipperResult<Revealed> {
        let keys = self.derive(phrase).await?;

        let record = self
            .metadata
            .find_by_lookup_key(&keys.lookup_key)
            .await?
            .ok_or(BipperError::NotFound)?;

        // The address is derived from the encrypted filename, so authenticate
        // that first: a tampered name must fail as a bad phrase, not as a
        // missing blob.
        let name = open(
            &keys.filename_key,
            &record.encrypted_filename,
            &record.filename_nonce,
        )?;
        let filename = String::from_utf8(name).map_err(|_| BipperError::Authentication)?;

        let address = record.blob_address();
        let blob = match self.blobs.read(&address).await? {
            Some(blob) => blob,
            None => {
                error!(address = %address.short(), "vault record has no backing blob");
                return Err(BipperError::MissingBlob(address.short().to_string()));
            }
        };

        let content = open(&keys.content_key, &blob, &record.content_nonce)?;

        debug!(address = %address.short(), bytes = content.len(), "secret revealed");
        Ok(Revealed { filename, content })
    }

    /// Run the KDF off the async workers.
    async fn derive(&self, phrase: &SecretString) -> BipperResult<DerivedKeys> {
        let deriver = Arc::clone(&self.deriver);
        let bytes = Zeroizing::new(phrase.expose_secret().as_bytes().to_vec());
        tokio::task::spawn_blocking(move || deriver.derive(&bytes))
            .await
            .map_err(|e| BipperError::Other(anyhow::anyhow!("key derivation task failed: {e}")))?
    }

    /// Undo a commit attempt whose record did not land. Best effort: if the
    /// blob cannot be deleted the stage row stays for the reconciler.
    async fn compensate(&self, address: &BlobAddress) {
        if let Err(e) = self.blobs.delete(address).await {
            warn!(address = %address.short(), error = %e, "compensating delete failed, leaving upload staged");
            return;
        }
        if let Err(e) = self.metadata.abandon_upload(address).await {
            warn!(address = %address.short(), error = %e, "could not clear upload stage");
        }
    }
}
