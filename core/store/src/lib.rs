//! Encrypted store management: wrapped-key persistence, session-scoped key
//! handling, and bulk conversion of plaintext trees to the encrypted layout.

pub mod config;
pub mod keyfile;
pub mod migrate;
pub mod session;
pub mod store;

pub use config::{StoreConfig, DEFAULT_IDLE_TIMEOUT, KDF_FILENAME, KEY_FILENAME};
pub use keyfile::KeyStore;
pub use migrate::{migrate, MigrationReport};
pub use session::Session;
pub use store::Store;
