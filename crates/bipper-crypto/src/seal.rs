//! AES-256-GCM sealing for content and filenames
//!
//! Stored format (binary), one pair per sealed field:
//! ```text
//! ciphertext: [N bytes: encrypted data][16 bytes: GCM tag]
//! nonce:      [12 bytes: random, stored verbatim next to the ciphertext]
//! ```
//!
//! No AAD. Content and filename use different keys, and each seal draws its
//! own nonce, so a (key, nonce) pair is never reused.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use bipper_core::{BipperError, BipperResult};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::keys::SymmetricKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// A sealed field: ciphertext with appended tag, and the nonce used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &SymmetricKey, plaintext: &[u8]) -> BipperResult<Sealed> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| BipperError::EntropySource(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| BipperError::Other(anyhow::anyhow!("AES-GCM encryption failed: {e}")))?;

    Ok(Sealed { ciphertext, nonce })
}

/// Decrypt and verify. Any mismatch (key, nonce, tag, truncated input) is
/// `Authentication`; the cause is deliberately not reported.
pub fn open(key: &SymmetricKey, ciphertext: &[u8], nonce: &[u8]) -> BipperResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE || ciphertext.len() < TAG_SIZE {
        return Err(BipperError::Authentication);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| BipperError::Authentication)
}
