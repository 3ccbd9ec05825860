//! Session key-value store
//!
//! Holds the current-session identity (email, display name, avatar file
//! name) between operations. Treated as always-available: reads of an
//! unset key return the empty string, writes never fail. Writes only
//! happen at session transitions (login, logout), which the surrounding
//! flow sequences ahead of chat operations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::DerivedKey;

/// Keys of the session store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// The logged-in account's email address
    Email,
    /// The logged-in account's display name
    DisplayName,
    /// File name of the uploaded profile picture
    PictureFileName,
}

/// Process-local session state, shared by cloning
#[derive(Clone, Default)]
pub struct SessionStore {
    values: Arc<Mutex<HashMap<SessionKey, String>>>,
}

impl SessionStore {
    /// Create an empty session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a key; the empty string when unset
    pub fn get(&self, key: SessionKey) -> String {
        self.values.lock().get(&key).cloned().unwrap_or_default()
    }

    /// Set a key
    pub fn set(&self, key: SessionKey, value: impl Into<String>) {
        self.values.lock().insert(key, value.into());
    }

    /// Remove a key
    pub fn remove(&self, key: SessionKey) {
        self.values.lock().remove(&key);
    }

    /// Derived key of the current session's email.
    ///
    /// An empty session yields the (harmless, never-matching) empty key.
    pub fn current_derived_key(&self) -> DerivedKey {
        DerivedKey::from_email(&self.get(SessionKey::Email))
    }
}
