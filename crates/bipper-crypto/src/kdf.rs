//! Key derivation: phrase + installation salt → 96 bytes → three keys
//!
//! The stretch is deliberately expensive. Phrase entropy is already 256 bits,
//! but the lookup key is stored in plaintext, so every guess against it must
//! cost a full derivation.

use argon2::{Algorithm, Argon2, Version};
use bipper_core::config::{CryptoConfig, KdfAlgorithm};
use bipper_core::{BipperError, BipperResult};
use zeroize::Zeroizing;

use crate::keys::DerivedKeys;
use crate::DERIVED_LEN;

/// Stretch function and cost parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdfParams {
    /// scrypt with N = 2^log_n. `log_n = 15, r = 8, p = 1` is the stored-vault layout.
    Scrypt { log_n: u8, r: u32, p: u32 },
    /// Argon2id (v0x13)
    Argon2id {
        mem_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Scrypt {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

impl From<&CryptoConfig> for KdfParams {
    fn from(cfg: &CryptoConfig) -> Self {
        match cfg.kdf {
            KdfAlgorithm::Scrypt => KdfParams::Scrypt {
                log_n: cfg.scrypt_log_n,
                r: cfg.scrypt_r,
                p: cfg.scrypt_p,
            },
            KdfAlgorithm::Argon2id => KdfParams::Argon2id {
                mem_cost_kib: cfg.argon2_mem_cost_kib,
                time_cost: cfg.argon2_time_cost,
                parallelism: cfg.argon2_parallelism,
            },
        }
    }
}

#[derive(Clone)]
enum Stretch {
    Scrypt(scrypt::Params),
    Argon2id(argon2::Params),
}

/// Deterministic phrase → key-triple derivation with validated parameters.
///
/// Construct once at startup; `derive` is then infallible except for
/// conditions the constructor already rules out.
#[derive(Clone)]
pub struct KeyDeriver {
    salt: Vec<u8>,
    stretch: Stretch,
}

impl std::fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let algorithm = match self.stretch {
            Stretch::Scrypt(_) => "scrypt",
            Stretch::Argon2id(_) => "argon2id",
        };
        f.debug_struct("KeyDeriver")
            .field("algorithm", &algorithm)
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

impl KeyDeriver {
    pub fn new(salt: Vec<u8>, params: KdfParams) -> BipperResult<Self> {
        if salt.is_empty() {
            return Err(BipperError::Kdf("salt must not be empty".into()));
        }

        let stretch = match params {
            KdfParams::Scrypt { log_n, r, p } => {
                let params = scrypt::Params::new(log_n, r, p, DERIVED_LEN)
                    .map_err(|e| BipperError::Kdf(format!("invalid scrypt params: {e}")))?;
                Stretch::Scrypt(params)
            }
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => {
                if salt.len() < argon2::MIN_SALT_LEN {
                    return Err(BipperError::Kdf(format!(
                        "Argon2id needs a salt of at least {} bytes",
                        argon2::MIN_SALT_LEN
                    )));
                }
                let params =
                    argon2::Params::new(mem_cost_kib, time_cost, parallelism, Some(DERIVED_LEN))
                        .map_err(|e| BipperError::Kdf(format!("invalid Argon2id params: {e}")))?;
                Stretch::Argon2id(params)
            }
        };

        Ok(Self { salt, stretch })
    }

    /// Build from the `[crypto]` config section.
    pub fn from_config(cfg: &CryptoConfig) -> BipperResult<Self> {
        Self::new(cfg.salt_bytes()?, KdfParams::from(cfg))
    }

    /// Stretch the phrase bytes exactly as given. No normalization: the
    /// phrase a caller types is the phrase that gets hashed.
    pub fn derive(&self, phrase: &[u8]) -> BipperResult<DerivedKeys> {
        let mut output = Zeroizing::new([0u8; DERIVED_LEN]);

        match &self.stretch {
            Stretch::Scrypt(params) => {
                scrypt::scrypt(phrase, &self.salt, params, output.as_mut())
                    .map_err(|e| BipperError::Kdf(format!("scrypt failed: {e}")))?;
            }
            Stretch::Argon2id(params) => {
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
                    .hash_password_into(phrase, &self.salt, output.as_mut())
                    .map_err(|e| BipperError::Kdf(format!("Argon2id failed: {e}")))?;
            }
        }

        Ok(DerivedKeys::split(&output))
    }
}
