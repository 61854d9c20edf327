use std::fmt;

use crate::error::{BipperError, BipperResult};

/// Size of the lookup key, the first slice of the derivation output.
pub const LOOKUP_KEY_SIZE: usize = 32;

/// AES-GCM tag appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Longest filename whose encrypted hex address still fits a 255-byte
/// filesystem name: `2 * (len + TAG_SIZE) <= 255`.
pub const MAX_FILENAME_BYTES: usize = 111;

/// Primary key of a vault record. Derived from the phrase, never the phrase itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupKey([u8; LOOKUP_KEY_SIZE]);

impl LookupKey {
    pub fn from_bytes(bytes: [u8; LOOKUP_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> BipperResult<Self> {
        let arr: [u8; LOOKUP_KEY_SIZE] = bytes.try_into().map_err(|_| {
            BipperError::StorageIo(format!(
                "lookup key has {} bytes (expected {LOOKUP_KEY_SIZE})",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; LOOKUP_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Enough to correlate log lines, not enough to query the table.
        write!(f, "LookupKey({}…)", hex::encode(&self.0[..4]))
    }
}

/// Location of a sealed blob: lowercase hex of the encrypted filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobAddress(String);

impl BlobAddress {
    pub fn from_encrypted_filename(encrypted_filename: &[u8]) -> Self {
        Self(hex::encode(encrypted_filename))
    }

    /// Accept an address read back from a listing. Anything that is not
    /// lowercase hex of a plausible ciphertext is not ours.
    pub fn parse(s: &str) -> Option<Self> {
        let plausible = s.len() >= 2 * TAG_SIZE
            && s.len().is_multiple_of(2)
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        plausible.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log fields.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for BlobAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted metadata for one committed secret. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub lookup_key: LookupKey,
    pub encrypted_filename: Vec<u8>,
    pub content_nonce: Vec<u8>,
    pub filename_nonce: Vec<u8>,
}

impl VaultRecord {
    pub fn blob_address(&self) -> BlobAddress {
        BlobAddress::from_encrypted_filename(&self.encrypted_filename)
    }
}

/// Write-ahead intent: a blob for `address` is about to be (or was) written
/// and its record is not yet committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub address: BlobAddress,
    /// Unix timestamp (seconds) when the stage row was written
    pub staged_at: u64,
}

/// Reject empty filenames and those whose blob address would not fit on disk.
pub fn check_filename(filename: &str) -> BipperResult<()> {
    if filename.is_empty() {
        return Err(BipperError::InvalidFilename("empty".into()));
    }
    if filename.len() > MAX_FILENAME_BYTES {
        return Err(BipperError::InvalidFilename(format!(
            "{} bytes (maximum {MAX_FILENAME_BYTES})",
            filename.len()
        )));
    }
    Ok(())
}
