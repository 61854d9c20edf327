//! Derived key types: lookup key plus two sealing keys, zeroized on drop

use bipper_core::LookupKey;
use zeroize::Zeroize;

use crate::{DERIVED_LEN, KEY_SIZE};

/// A 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The three disjoint secrets carved out of one derivation.
#[derive(Debug)]
pub struct DerivedKeys {
    pub lookup_key: LookupKey,
    pub content_key: SymmetricKey,
    pub filename_key: SymmetricKey,
}

impl DerivedKeys {
    /// Split a raw derivation output. Layout is fixed: `[0..32]` lookup,
    /// `[32..64]` content, `[64..96]` filename.
    pub fn split(output: &[u8; DERIVED_LEN]) -> Self {
        let mut lookup = [0u8; KEY_SIZE];
        let mut content = [0u8; KEY_SIZE];
        let mut filename = [0u8; KEY_SIZE];
        lookup.copy_from_slice(&output[..KEY_SIZE]);
        content.copy_from_slice(&output[KEY_SIZE..2 * KEY_SIZE]);
        filename.copy_from_slice(&output[2 * KEY_SIZE..]);

        let keys = Self {
            lookup_key: LookupKey::from_bytes(lookup),
            content_key: SymmetricKey::from_bytes(content),
            filename_key: SymmetricKey::from_bytes(filename),
        };
        content.zeroize();
        filename.zeroize();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_layout() {
        let mut output = [0u8; DERIVED_LEN];
        for (i, b) in output.iter_mut().enumerate() {
            *b = i as u8;
        }

        let keys = DerivedKeys::split(&output);

        assert_eq!(keys.lookup_key.as_bytes()[0], 0);
        assert_eq!(keys.lookup_key.as_bytes()[31], 31);
        assert_eq!(keys.content_key.as_bytes()[0], 32);
        assert_eq!(keys.content_key.as_bytes()[31], 63);
        assert_eq!(keys.filename_key.as_bytes()[0], 64);
        assert_eq!(keys.filename_key.as_bytes()[31], 95);
    }

    #[test]
    fn test_debug_redacts_key_bytes() {
        let key = SymmetricKey::from_bytes([0x41; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("65"));
    }
}
