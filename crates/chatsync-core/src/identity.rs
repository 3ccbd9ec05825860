//! Derived identity keys
//!
//! The remote tree store forbids `.`, `@` and a few other characters in
//! path segments, so user records are addressed by a *derived key*: the
//! account email with `@` and `.` replaced by `-`. The same string doubles
//! as the foreign-key-like reference between records (conversation
//! entries, message sender fields, the flat users collection).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Path-safe identity key derived from an email address.
///
/// Derivation is pure and deterministic: `@` and `.` each map to `-`.
/// It is not reversible and distinct emails are assumed not to collide
/// (e.g. `a@x.com` and `a-x@com` would; registered addresses are expected
/// to be ordinary emails, for which the mapping is injective in practice).
///
/// # Example
///
/// ```
/// use chatsync_core::DerivedKey;
///
/// let key = DerivedKey::from_email("canh@gmail.com");
/// assert_eq!(key.as_str(), "canh-gmail-com");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedKey(String);

impl DerivedKey {
    /// Derive a key from an email address.
    ///
    /// Total function: malformed input simply produces a malformed (but
    /// deterministic) key. Upstream form validation is a separate concern.
    pub fn from_email(email: &str) -> Self {
        DerivedKey(email.replace('@', "-").replace('.', "-"))
    }

    /// Wrap a key that was already derived, e.g. one read back off the
    /// wire from a `sender_email` or `other_user_email` field.
    pub fn new(key: impl Into<String>) -> Self {
        DerivedKey(key.into())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DerivedKey> for String {
    fn from(key: DerivedKey) -> Self {
        key.0
    }
}
