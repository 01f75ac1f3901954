//! Session-scoped master key with idle expiry.
//!
//! The server holds one `Session` per store. Handler threads read the key
//! concurrently while logout or the idle timeout clears it; reads hand out a
//! clone, so a streaming decode that captured the key before a concurrent
//! clear runs to completion.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use cipherbox_crypto::MasterKey;

/// Holds the unwrapped master key for the active login, if any.
pub struct Session {
    state: Mutex<State>,
    idle_timeout: Duration,
}

struct State {
    key: Option<MasterKey>,
    last_access: Instant,
}

impl Session {
    /// Create a locked session.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                key: None,
                last_access: Instant::now(),
            }),
            idle_timeout,
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install a freshly unwrapped key and reset the idle clock.
    pub fn unlock(&self, key: MasterKey) {
        let mut state = self.locked();
        state.key = Some(key);
        state.last_access = Instant::now();
    }

    /// Drop the key; it zeroizes on drop. Clones already handed out are
    /// unaffected.
    pub fn clear(&self) {
        self.locked().key = None;
    }

    /// Current key, or `None` when the session is locked or has been idle
    /// past the timeout. A successful read counts as activity.
    pub fn key(&self) -> Option<MasterKey> {
        let mut state = self.locked();
        if state.key.is_some() && state.last_access.elapsed() >= self.idle_timeout {
            debug!("session key expired after idle timeout");
            state.key = None;
        }
        if state.key.is_some() {
            state.last_access = Instant::now();
        }
        state.key.clone()
    }

    /// Refresh the idle clock without reading the key. Used as the chunk
    /// decoder's progress hook during long downloads.
    pub fn touch(&self) {
        self.locked().last_access = Instant::now();
    }

    /// Whether a key is currently available.
    pub fn is_active(&self) -> bool {
        self.key().is_some()
    }
}
