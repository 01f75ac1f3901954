//! Common error types shared across Cipherbox crates.

pub mod error;

pub use error::{Error, Result};
