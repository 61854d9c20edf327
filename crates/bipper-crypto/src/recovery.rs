//! BIP-39 phrase generation
//!
//! Every commit gets a fresh 24-word phrase. It is shown to the caller once
//! and never stored; losing it means losing the blob.

use bip39::Mnemonic;
use bipper_core::{BipperError, BipperResult};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretString;
use zeroize::Zeroizing;

/// Words in a phrase carrying 256 bits of entropy
pub const PHRASE_WORDS: usize = 24;

/// Source of fresh phrases for commits.
pub trait PhraseSource: Send + Sync {
    fn generate(&self) -> BipperResult<SecretString>;
}

/// Production source: OS randomness encoded as a BIP-39 English mnemonic.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bip39Generator;

impl PhraseSource for Bip39Generator {
    fn generate(&self) -> BipperResult<SecretString> {
        generate_phrase()
    }
}

/// Draw 256 bits from the OS RNG and encode them as a 24-word phrase.
pub fn generate_phrase() -> BipperResult<SecretString> {
    let mut entropy = Zeroizing::new([0u8; 32]);
    OsRng
        .try_fill_bytes(entropy.as_mut())
        .map_err(|e| BipperError::EntropySource(e.to_string()))?;

    let mnemonic = Mnemonic::from_entropy(entropy.as_ref())
        .map_err(|e| BipperError::EntropySource(format!("BIP-39 encoding failed: {e}")))?;

    Ok(SecretString::from(mnemonic.to_string()))
}

/// Whether `words` is a well-formed BIP-39 phrase (wordlist + checksum).
///
/// Advisory only. Reveal never consults it, so a typo costs the same
/// derivation as an unknown phrase.
pub fn validate_phrase(words: &str) -> bool {
    Mnemonic::parse_normalized(words).is_ok()
}
