//! Filename and path encryption.
//!
//! A logical name becomes a filesystem-safe token: the UTF-8 bytes are
//! sealed as a single AEAD blob, base64-encoded, any `/` the encoding
//! produced is substituted with `_` (which is outside the base64 alphabet,
//! so the substitution reverses unambiguously), and a fixed marker prefix is
//! prepended. The marker is what distinguishes managed entries from
//! unmanaged ones sharing a directory.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::aead::{decrypt, encrypt};
use crate::keys::MasterKey;
use cipherbox_common::{Error, Result};

/// Marker prefix identifying encrypted directory entries.
pub const ENCRYPTED_NAME_PREFIX: &str = "cb1.";

/// Substitute for the path separator in base64 output.
const SEPARATOR_SUBSTITUTE: char = '_';

/// Whether a directory entry name is a managed (encrypted) token.
pub fn is_encrypted_name(name: &str) -> bool {
    name.starts_with(ENCRYPTED_NAME_PREFIX)
}

/// Encrypt a single path component into a filesystem-safe token.
pub fn encode_name(key: &MasterKey, name: &str) -> Result<String> {
    let blob = encrypt(key.as_bytes(), name.as_bytes())?;
    let text = STANDARD
        .encode(blob)
        .replace('/', &SEPARATOR_SUBSTITUTE.to_string());
    Ok(format!("{}{}", ENCRYPTED_NAME_PREFIX, text))
}

/// Decrypt a token produced by [`encode_name`].
///
/// # Errors
/// - [`Error::Authentication`] if the token is malformed (missing marker,
///   invalid base64, non-UTF-8 plaintext) or its tag fails to verify
pub fn decode_name(key: &MasterKey, token: &str) -> Result<String> {
    let body = token
        .strip_prefix(ENCRYPTED_NAME_PREFIX)
        .ok_or(Error::Authentication)?;
    let blob = STANDARD
        .decode(body.replace(SEPARATOR_SUBSTITUTE, "/"))
        .map_err(|_| Error::Authentication)?;
    let plain = decrypt(key.as_bytes(), &blob)?;
    String::from_utf8(plain).map_err(|_| Error::Authentication)
}

/// Decrypt every component of a slash-separated path.
///
/// Splits on both separator styles, skips empty components (so repeated
/// separators collapse), rejoins with `/`, and preserves a single leading
/// separator when the input was absolute.
pub fn decode_path(key: &MasterKey, path: &str) -> Result<String> {
    let absolute = path.starts_with('/');
    let components = path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .map(|c| decode_name(key, c))
        .collect::<Result<Vec<_>>>()?;

    let joined = components.join("/");
    if absolute {
        Ok(format!("/{}", joined))
    } else {
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> MasterKey {
        MasterKey::from_bytes([42u8; 32])
    }

    #[test]
    fn test_name_roundtrip() {
        let key = test_key();
        for name in ["report.pdf", "with space.txt", "ünïcödé名前.md", "a/b\\c"] {
            let token = encode_name(&key, name).unwrap();
            assert_eq!(decode_name(&key, &token).unwrap(), name, "name {:?}", name);
        }
    }

    #[test]
    fn test_token_is_filesystem_safe() {
        let key = test_key();
        // Enough repetitions that the base64 output is all but certain to
        // contain a '/' without the substitution.
        for i in 0..50 {
            let token = encode_name(&key, &format!("file-{}.bin", i)).unwrap();
            assert!(token.starts_with(ENCRYPTED_NAME_PREFIX));
            assert!(!token[ENCRYPTED_NAME_PREFIX.len()..].contains('/'));
            assert!(!token.contains('\\'));
        }
    }

    #[test]
    fn test_tokens_differ_per_call() {
        let key = test_key();
        // Fresh nonce per encryption: equal names produce distinct tokens.
        let token1 = encode_name(&key, "same.txt").unwrap();
        let token2 = encode_name(&key, "same.txt").unwrap();
        assert_ne!(token1, token2);
    }

    #[test]
    fn test_unmarked_token_rejected() {
        let key = test_key();
        assert!(matches!(
            decode_name(&key, "plain.txt"),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let key = test_key();
        let garbage = format!("{}!!not base64!!", ENCRYPTED_NAME_PREFIX);
        assert!(matches!(
            decode_name(&key, &garbage),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let key = test_key();
        let token = encode_name(&key, "secret.txt").unwrap();

        let mut bytes: Vec<char> = token.chars().collect();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = bytes.into_iter().collect();

        assert!(decode_name(&key, &tampered).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = encode_name(&test_key(), "secret.txt").unwrap();
        let other = MasterKey::from_bytes([1u8; 32]);
        assert!(matches!(
            decode_name(&other, &token),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn test_path_roundtrip_absolute() {
        let key = test_key();
        let token_a = encode_name(&key, "docs").unwrap();
        let token_b = encode_name(&key, "tax 2024.pdf").unwrap();

        let decoded = decode_path(&key, &format!("/{}/{}", token_a, token_b)).unwrap();
        assert_eq!(decoded, "/docs/tax 2024.pdf");
    }

    #[test]
    fn test_path_roundtrip_relative() {
        let key = test_key();
        let token = encode_name(&key, "notes.txt").unwrap();

        assert_eq!(decode_path(&key, &token).unwrap(), "notes.txt");
    }

    #[test]
    fn test_path_collapses_repeated_separators() {
        let key = test_key();
        let token_a = encode_name(&key, "a").unwrap();
        let token_b = encode_name(&key, "b").unwrap();

        let decoded = decode_path(&key, &format!("/{}//{}", token_a, token_b)).unwrap();
        assert_eq!(decoded, "/a/b");

        let decoded = decode_path(&key, &format!("{}\\{}", token_a, token_b)).unwrap();
        assert_eq!(decoded, "a/b");
    }

    #[test]
    fn test_empty_path() {
        let key = test_key();
        assert_eq!(decode_path(&key, "").unwrap(), "");
        assert_eq!(decode_path(&key, "/").unwrap(), "/");
    }
}
