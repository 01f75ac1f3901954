//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use cipherbox_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt plaintext under `key` with a fresh random nonce.
///
/// # Postconditions
/// - Returns `nonce ‖ ciphertext ‖ tag`
/// - The ciphertext length equals the plaintext length, so the blob is
///   `NONCE_SIZE + plaintext.len() + TAG_SIZE` bytes
///
/// # Security
/// - The nonce is freshly random per call and never reused under a key
pub fn encrypt(key: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(blob)
}

/// Decrypt a `nonce ‖ ciphertext ‖ tag` blob.
///
/// # Errors
/// - [`Error::Authentication`] if the blob is too short to contain a nonce
///   and tag, or the tag does not verify (wrong key or corrupted/tampered
///   data). Never returns partial plaintext.
pub fn decrypt(key: &[u8; KEY_LENGTH], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Authentication);
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> [u8; KEY_LENGTH] {
        [byte; KEY_LENGTH]
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let k = key(42);
        let plaintext = b"Hello, World!";

        let blob = encrypt(&k, plaintext).unwrap();
        let decrypted = decrypt(&k, &blob).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_blob_size() {
        let k = key(42);
        let plaintext = b"Test message";

        let blob = encrypt(&k, plaintext).unwrap();

        assert_eq!(blob.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_different_nonce_each_time() {
        let k = key(42);
        let plaintext = b"Same plaintext";

        let blob1 = encrypt(&k, plaintext).unwrap();
        let blob2 = encrypt(&k, plaintext).unwrap();

        assert_ne!(&blob1[..NONCE_SIZE], &blob2[..NONCE_SIZE]);
        assert_ne!(blob1, blob2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let plaintext = b"Secret data";

        let blob = encrypt(&key(1), plaintext).unwrap();
        let result = decrypt(&key(2), &blob);

        assert!(matches!(result, Err(Error::Authentication)));
    }

    #[test]
    fn test_any_flipped_bit_fails() {
        let k = key(42);
        let blob = encrypt(&k, b"Important data").unwrap();

        for byte in 0..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(decrypt(&k, &tampered), Err(Error::Authentication)),
                    "flipping byte {} bit {} was not detected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_truncated_blob_fails() {
        let k = key(42);
        let blob = encrypt(&k, b"data").unwrap();

        assert!(matches!(
            decrypt(&k, &blob[..NONCE_SIZE + TAG_SIZE - 1]),
            Err(Error::Authentication)
        ));
        assert!(matches!(decrypt(&k, &[]), Err(Error::Authentication)));
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key(42);

        let blob = encrypt(&k, b"").unwrap();
        assert_eq!(blob.len(), NONCE_SIZE + TAG_SIZE);

        let decrypted = decrypt(&k, &blob).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_large_plaintext() {
        let k = key(42);
        let plaintext = vec![0xABu8; 1_000_000];

        let blob = encrypt(&k, &plaintext).unwrap();
        let decrypted = decrypt(&k, &blob).unwrap();

        assert_eq!(decrypted, plaintext);
    }
}
