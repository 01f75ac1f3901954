//! Wrapped master key persistence and password rotation.
//!
//! The key file is a single AEAD blob (`nonce ‖ ciphertext ‖ tag`) sealing
//! the 32-byte master key under the password-derived key. Exactly one key
//! file exists per store under the canonical name; rotation replaces it via
//! rename-to-backup / write / delete-backup so a usable key file is
//! resolvable at every observable point.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use cipherbox_common::{Error, Result};
use cipherbox_crypto::{decrypt, encrypt, Kdf, MasterKey, KEY_LENGTH};

use crate::config::{KDF_FILENAME, KEY_FILENAME};

/// Manages the wrapped master key of one store.
pub struct KeyStore {
    key_path: PathBuf,
    kdf_path: PathBuf,
    kdf: Kdf,
    /// Serializes login and rotation against the key file.
    lock: Mutex<()>,
}

impl KeyStore {
    /// Open the key store under `meta_dir`, creating the directory.
    ///
    /// A previously persisted KDF choice takes precedence over `default_kdf`,
    /// so an existing store always unwraps with the derivation it was
    /// created with.
    pub fn open(meta_dir: &Path, default_kdf: Kdf) -> Result<Self> {
        fs::create_dir_all(meta_dir)?;

        let kdf_path = meta_dir.join(KDF_FILENAME);
        let kdf = if kdf_path.exists() {
            serde_json::from_slice(&fs::read(&kdf_path)?).map_err(|e| {
                Error::InvalidInput(format!("unreadable {}: {}", kdf_path.display(), e))
            })?
        } else {
            default_kdf
        };

        Ok(Self {
            key_path: meta_dir.join(KEY_FILENAME),
            kdf_path,
            kdf,
            lock: Mutex::new(()),
        })
    }

    /// Canonical path of the wrapped key file.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Whether a wrapped key file exists under the canonical name.
    pub fn is_initialized(&self) -> bool {
        self.key_path.exists()
    }

    /// Unwrap the master key with `password`.
    ///
    /// On an uninitialized store this generates a fresh master key, persists
    /// it wrapped under `password` together with the KDF choice, and returns
    /// it. On an initialized store a wrong password surfaces as
    /// [`Error::Authentication`]; the codec cannot distinguish that from a
    /// corrupted key file.
    pub fn login(&self, password: &str) -> Result<MasterKey> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let wrap_key = self.kdf.derive_key(password)?;

        if !self.key_path.exists() {
            let master = MasterKey::generate();
            let sealed = encrypt(wrap_key.as_bytes(), master.as_bytes())?;

            if !self.kdf_path.exists() {
                let params = serde_json::to_vec_pretty(&self.kdf)
                    .map_err(|e| Error::Crypto(format!("serializing KDF choice: {}", e)))?;
                fs::write(&self.kdf_path, params)?;
            }
            fs::write(&self.key_path, sealed)?;
            info!(path = %self.key_path.display(), "store key initialized");
            return Ok(master);
        }

        let sealed = fs::read(&self.key_path)?;
        let plain = decrypt(wrap_key.as_bytes(), &sealed)?;
        let bytes: [u8; KEY_LENGTH] = plain.try_into().map_err(|_| Error::Authentication)?;
        Ok(MasterKey::from_bytes(bytes))
    }

    /// Rewrap `master` under `new_password`, replacing the key file with
    /// rollback on failure.
    pub fn rotate(&self, master: &MasterKey, new_password: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let wrap_key = self.kdf.derive_key(new_password)?;
        let sealed = encrypt(wrap_key.as_bytes(), master.as_bytes())?;
        self.replace_key_file(&sealed, |path, bytes| Ok(fs::write(path, bytes)?))
    }

    /// Rename-to-backup, write, delete-backup. On a write failure the
    /// partial file is removed and the backup renamed back before the error
    /// surfaces as [`Error::Rotation`].
    fn replace_key_file(
        &self,
        sealed: &[u8],
        write: impl FnOnce(&Path, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let backup = self.backup_path();
        fs::rename(&self.key_path, &backup)
            .map_err(|e| Error::Rotation(format!("backing up key file: {}", e)))?;
        debug!(backup = %backup.display(), "key file moved aside");

        if let Err(e) = write(&self.key_path, sealed) {
            if self.key_path.exists() {
                let _ = fs::remove_file(&self.key_path);
            }
            fs::rename(&backup, &self.key_path)
                .map_err(|e| Error::Rotation(format!("restoring key file backup: {}", e)))?;
            return Err(Error::Rotation(format!("writing new key file: {}", e)));
        }

        fs::remove_file(&backup)
            .map_err(|e| Error::Rotation(format!("removing key file backup: {}", e)))?;
        info!("store key rewrapped");
        Ok(())
    }

    /// First unused name among `store.key_backup`, `store.key_backup2`, ….
    fn backup_path(&self) -> PathBuf {
        let mut base = self.key_path.as_os_str().to_os_string();
        base.push("_backup");

        let mut candidate = PathBuf::from(&base);
        let mut suffix = 1u32;
        while candidate.exists() {
            suffix += 1;
            let mut numbered = base.clone();
            numbered.push(suffix.to_string());
            candidate = PathBuf::from(numbered);
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> KeyStore {
        KeyStore::open(dir.path(), Kdf::default()).unwrap()
    }

    #[test]
    fn test_first_login_initializes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(!store.is_initialized());
        let master = store.login("hunter2").unwrap();
        assert!(store.is_initialized());

        // The wrapped key file is a single nonce ‖ ciphertext(32) ‖ tag blob.
        let sealed = fs::read(store.key_path()).unwrap();
        assert_eq!(
            sealed.len(),
            cipherbox_crypto::NONCE_SIZE + KEY_LENGTH + cipherbox_crypto::TAG_SIZE
        );

        // And the KDF choice was persisted next to it.
        assert!(dir.path().join(KDF_FILENAME).exists());

        let again = store.login("hunter2").unwrap();
        assert_eq!(master.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_wrong_password_is_authentication_error() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.login("correct").unwrap();

        assert!(matches!(
            store.login("incorrect"),
            Err(Error::Authentication)
        ));
    }

    #[test]
    fn test_persisted_kdf_choice_wins() {
        let dir = TempDir::new().unwrap();
        let argon = cipherbox_crypto::Kdf::argon2id(cipherbox_crypto::KdfParams::moderate());

        let store = KeyStore::open(dir.path(), argon).unwrap();
        let master = store.login("pw").unwrap();

        // Re-open with a different default; the persisted Argon2id choice
        // (including its salt) must still unwrap the key.
        let reopened = KeyStore::open(dir.path(), Kdf::Blake2b).unwrap();
        let again = reopened.login("pw").unwrap();
        assert_eq!(master.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_rotate_changes_password_keeps_master() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let master = store.login("old-password").unwrap();

        store.rotate(&master, "new-password").unwrap();

        assert!(matches!(
            store.login("old-password"),
            Err(Error::Authentication)
        ));
        let unwrapped = store.login("new-password").unwrap();
        assert_eq!(master.as_bytes(), unwrapped.as_bytes());

        // No backup left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2); // key + kdf.json
    }

    #[test]
    fn test_failed_rotation_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let master = store.login("original").unwrap();

        let result = store.replace_key_file(b"unused", |_, _| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        });
        assert!(matches!(result, Err(Error::Rotation(_))));

        // Exactly one key file under the canonical name, no backups, and the
        // original password still unwraps the original master key.
        assert!(store.is_initialized());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
        let unwrapped = store.login("original").unwrap();
        assert_eq!(master.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_failed_rotation_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let master = store.login("original").unwrap();

        // The write lands a partial file, then reports failure.
        let result = store.replace_key_file(b"new sealed bytes", |path, _| {
            fs::write(path, b"partial").unwrap();
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "interrupted",
            )))
        });
        assert!(matches!(result, Err(Error::Rotation(_))));

        let unwrapped = store.login("original").unwrap();
        assert_eq!(master.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_backup_probing_skips_existing_names() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let master = store.login("pw").unwrap();

        // A stale backup from an interrupted earlier rotation.
        let mut stale = store.key_path().as_os_str().to_os_string();
        stale.push("_backup");
        fs::write(PathBuf::from(&stale), b"stale").unwrap();

        store.rotate(&master, "new-pw").unwrap();

        // The stale backup is untouched; rotation used the next name.
        assert_eq!(fs::read(PathBuf::from(&stale)).unwrap(), b"stale");
        let unwrapped = store.login("new-pw").unwrap();
        assert_eq!(master.as_bytes(), unwrapped.as_bytes());
    }
}
