//! Store configuration and on-disk layout.

use std::path::PathBuf;
use std::time::Duration;

use cipherbox_crypto::Kdf;

/// Wrapped master key file name in the metadata directory.
pub const KEY_FILENAME: &str = "store.key";

/// Serialized KDF choice, kept next to the key file.
pub const KDF_FILENAME: &str = "kdf.json";

/// Idle time after which the session key is cleared (15 minutes).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Configuration for opening a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory tree being served; a mixture of managed (encrypted) and
    /// unmanaged entries.
    pub content_dir: PathBuf,
    /// Directory holding the wrapped key file and rotation artifacts.
    pub meta_dir: PathBuf,
    /// Password derivation for stores that have not been initialized yet.
    /// An existing store keeps the derivation it was created with.
    pub kdf: Kdf,
    /// Idle time after which the session key is dropped.
    pub idle_timeout: Duration,
}

impl StoreConfig {
    /// Configuration with the default KDF and idle timeout.
    pub fn new(content_dir: impl Into<PathBuf>, meta_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            meta_dir: meta_dir.into(),
            kdf: Kdf::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Set the KDF used if this store is newly initialized.
    pub fn with_kdf(mut self, kdf: Kdf) -> Self {
        self.kdf = kdf;
        self
    }

    /// Set the session idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
