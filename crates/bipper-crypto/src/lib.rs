//! bipper-crypto: key material for passphrase-gated blobs
//!
//! One phrase yields everything a vault needs:
//! ```text
//! BIP-39 phrase (24 words, 256-bit entropy)
//!   └── stretch(phrase, installation salt) → 96 bytes   (scrypt or Argon2id)
//!         ├── [0..32]   lookup key    → primary key of the metadata row
//!         ├── [32..64]  content key   → AES-256-GCM over the blob
//!         └── [64..96]  filename key  → AES-256-GCM over the filename
//! ```
//!
//! Content and filename are sealed under different keys, each with its own
//! random 96-bit nonce stored next to the ciphertext.

pub mod kdf;
pub mod keys;
pub mod recovery;
pub mod seal;

pub use kdf::{KdfParams, KeyDeriver};
pub use keys::{DerivedKeys, SymmetricKey};
pub use recovery::{generate_phrase, validate_phrase, Bip39Generator, PhraseSource};
pub use seal::{open, seal, Sealed};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = bipper_core::types::TAG_SIZE;

/// Length of one derivation: lookup key + content key + filename key
pub const DERIVED_LEN: usize = 3 * KEY_SIZE;
