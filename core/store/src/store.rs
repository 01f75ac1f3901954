//! Store façade wiring the key manager and session to a content tree.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::info;

use cipherbox_common::{Error, Result};

use crate::config::StoreConfig;
use crate::keyfile::KeyStore;
use crate::migrate::{migrate, MigrationReport};
use crate::session::Session;

/// One encrypted store: a content tree, its wrapped key, and the session
/// holding the unwrapped key while someone is logged in.
pub struct Store {
    config: StoreConfig,
    keys: KeyStore,
    session: Session,
    /// Migration renames directories out from under in-flight walks, so
    /// only one runs at a time.
    migrate_lock: Mutex<()>,
}

impl Store {
    /// Open a store, creating the content and metadata directories.
    ///
    /// Refuses a content directory that already has entries when no wrapped
    /// key exists: a key created later could never decrypt that content.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.content_dir)?;

        let keys = KeyStore::open(&config.meta_dir, config.kdf.clone())?;
        if !keys.is_initialized() && fs::read_dir(&config.content_dir)?.next().is_some() {
            return Err(Error::InvalidInput(format!(
                "{} has content but no key file at {}; refusing to initialize a new key over it",
                config.content_dir.display(),
                keys.key_path().display()
            )));
        }

        let session = Session::new(config.idle_timeout);
        Ok(Self {
            config,
            keys,
            session,
            migrate_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Unlock the session with `password`. The first login of a fresh store
    /// initializes its wrapped key.
    pub fn login(&self, password: &str) -> Result<()> {
        let key = self.keys.login(password)?;
        self.session.unlock(key);
        info!("session unlocked");
        Ok(())
    }

    /// Clear the session key.
    pub fn logout(&self) {
        self.session.clear();
        info!("session cleared");
    }

    /// Rewrap the master key under a new password. Requires an active
    /// session; the in-memory key is unchanged.
    pub fn change_password(&self, new_password: &str) -> Result<()> {
        let key = self.session.key().ok_or(Error::Authentication)?;
        self.keys.rotate(&key, new_password)
    }

    /// Map a slash-separated request path onto the content directory.
    ///
    /// Empty and `.` components collapse; any `..` component is rejected so
    /// a request can never escape the content root.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf> {
        let mut path = self.config.content_dir.clone();
        for component in request_path.split(['/', '\\']) {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidInput(
                        "path traversal rejected".to_string(),
                    ))
                }
                c => path.push(c),
            }
        }
        Ok(path)
    }

    /// Convert every unmanaged entry under `request_path` to the encrypted
    /// layout. Requires an active session.
    pub fn migrate(&self, request_path: &str) -> Result<MigrationReport> {
        let key = self.session.key().ok_or(Error::Authentication)?;
        let root = self.resolve(request_path)?;
        let _guard = self.migrate_lock.lock().unwrap_or_else(|e| e.into_inner());
        migrate(&key, &root)
    }
}
