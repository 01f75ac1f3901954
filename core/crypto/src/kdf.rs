//! Password-to-key derivation.
//!
//! The wrapped-key file format carries no KDF metadata, so the derivation
//! choice lives beside it in the store's metadata directory and every wrap
//! and unwrap of a given store uses the same variant.
//!
//! [`Kdf::Blake2b`] is a single unsalted digest of the password. It is fast
//! and keeps the wrap/unwrap protocol identical to stores created by earlier
//! releases, but offers no brute-force hardening; [`Kdf::Argon2id`] is the
//! hardened alternative for new stores.

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::keys::{MasterKey, KEY_LENGTH};
use cipherbox_common::{Error, Result};

/// Salt for Argon2id key derivation. Not secret; persisted with the KDF
/// choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salt(pub [u8; 32]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Parameters for Argon2id key derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Parameters suitable for interactive use, targeting well under a
    /// second of derivation time.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Lighter parameters for constrained machines.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// How the key wrapping a store's master key is derived from the password.
///
/// This is the explicit configuration point for the hash-vs-KDF trade-off:
/// the wrap/unwrap protocol (a single `nonce ‖ ciphertext ‖ tag` blob) is the
/// same for both variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kdf {
    /// Single Blake2b-256 digest of the password bytes.
    Blake2b,
    /// Argon2id with a per-store salt.
    Argon2id { salt: Salt, params: KdfParams },
}

impl Default for Kdf {
    fn default() -> Self {
        Kdf::Blake2b
    }
}

impl Kdf {
    /// Argon2id with a freshly generated salt.
    pub fn argon2id(params: KdfParams) -> Self {
        Kdf::Argon2id {
            salt: Salt::generate(),
            params,
        }
    }

    /// Derive the 32-byte wrapping key from a password.
    ///
    /// # Postconditions
    /// - Deterministic given the same password and the same `Kdf` value
    ///
    /// # Errors
    /// - Password empty
    /// - Invalid Argon2id parameters
    pub fn derive_key(&self, password: &str) -> Result<MasterKey> {
        if password.is_empty() {
            return Err(Error::InvalidInput("password cannot be empty".to_string()));
        }

        match self {
            Kdf::Blake2b => {
                let mut hasher = Blake2b::<U32>::new();
                hasher.update(password.as_bytes());
                let digest = hasher.finalize();

                let mut key = [0u8; KEY_LENGTH];
                key.copy_from_slice(&digest);
                Ok(MasterKey::from_bytes(key))
            }
            Kdf::Argon2id { salt, params } => {
                let argon2_params = Params::new(
                    params.memory_cost,
                    params.time_cost,
                    params.parallelism,
                    Some(KEY_LENGTH),
                )
                .map_err(|e| Error::Crypto(format!("invalid KDF parameters: {}", e)))?;

                let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

                let mut key = [0u8; KEY_LENGTH];
                argon2
                    .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key)
                    .map_err(|e| Error::Crypto(format!("key derivation failed: {}", e)))?;

                Ok(MasterKey::from_bytes(key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2b_deterministic() {
        let key1 = Kdf::Blake2b.derive_key("test-password-123").unwrap();
        let key2 = Kdf::Blake2b.derive_key("test-password-123").unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_blake2b_differs_per_password() {
        let key1 = Kdf::Blake2b.derive_key("password1").unwrap();
        let key2 = Kdf::Blake2b.derive_key("password2").unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_argon2id_deterministic() {
        let kdf = Kdf::Argon2id {
            salt: Salt([42u8; 32]),
            params: KdfParams::moderate(),
        };

        let key1 = kdf.derive_key("secure-password").unwrap();
        let key2 = kdf.derive_key("secure-password").unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_argon2id_differs_per_salt() {
        let params = KdfParams::moderate();
        let kdf1 = Kdf::Argon2id {
            salt: Salt([1u8; 32]),
            params: params.clone(),
        };
        let kdf2 = Kdf::Argon2id {
            salt: Salt([2u8; 32]),
            params,
        };

        let key1 = kdf1.derive_key("same-password").unwrap();
        let key2 = kdf2.derive_key("same-password").unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_variants_disagree() {
        let blake = Kdf::Blake2b.derive_key("password").unwrap();
        let argon = Kdf::Argon2id {
            salt: Salt([0u8; 32]),
            params: KdfParams::moderate(),
        }
        .derive_key("password")
        .unwrap();

        assert_ne!(blake.as_bytes(), argon.as_bytes());
    }

    #[test]
    fn test_empty_password_fails() {
        assert!(Kdf::Blake2b.derive_key("").is_err());
        assert!(Kdf::argon2id(KdfParams::moderate()).derive_key("").is_err());
    }

    #[test]
    fn test_serde_round_trip_preserves_derivation() {
        let kdf = Kdf::argon2id(KdfParams::moderate());
        let json = serde_json::to_string(&kdf).unwrap();
        let restored: Kdf = serde_json::from_str(&json).unwrap();

        let key1 = kdf.derive_key("password").unwrap();
        let key2 = restored.derive_key("password").unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }
}
