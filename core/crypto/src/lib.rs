//! Cryptographic core for Cipherbox.
//!
//! This module provides:
//! - Password-to-key derivation (fast digest, or Argon2id per store)
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Chunked streaming encryption with random-access decode
//! - Filename/path encryption producing filesystem-safe tokens
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Decryption fails closed: a failed tag check never yields partial output

pub mod aead;
pub mod chunk;
pub mod kdf;
pub mod keys;
pub mod name;

pub use aead::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
pub use chunk::{
    physical_to_logical_size, ChunkDecoder, ChunkEncoder, CHUNK_OVERHEAD, CHUNK_SIZE,
    ENCRYPTED_CHUNK_SIZE,
};
pub use kdf::{Kdf, KdfParams, Salt};
pub use keys::{MasterKey, KEY_LENGTH};
pub use name::{
    decode_name, decode_path, encode_name, is_encrypted_name, ENCRYPTED_NAME_PREFIX,
};
