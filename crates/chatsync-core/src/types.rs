//! Wire record types
//!
//! These structs mirror the persisted tree shapes byte-for-byte. Field
//! names are the actual stored keys, so every rename lives here and
//! nowhere else. Two quirks of the deployed data are kept on purpose:
//! the `email` field of a [`UserSummary`] and the `sender_email` /
//! `other_user_email` fields actually carry *derived keys*, and the
//! latest-message `text` is stored under the key `message`.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{ChatError, ChatResult};
use crate::store::RawValue;

/// Unique identifier for a conversation.
///
/// Rendered as `conversation_<ulid>`; ULIDs are time-ordered and
/// collision-resistant, so two threads opened within the same second by
/// the same pair of users still get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Mint a fresh conversation id
    pub fn new() -> Self {
        Self(format!("conversation_{}", Ulid::new()))
    }

    /// Wrap an id read back off the wire
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User profile node stored at the path named by the derived key.
///
/// The user's conversation list lives at the sibling path
/// `<key>/conversations`, not inside this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNode {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

/// Entry in the flat `users` collection.
///
/// `email` carries the derived key, not the raw address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    pub email: String,
}

/// Preview of the newest message, duplicated onto both participants'
/// conversation entries and overwritten on every send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestMessage {
    pub date: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(rename = "is_read")]
    pub is_read: bool,
}

/// One side's view of a conversation, stored in that user's
/// `conversations` list and pointing at the other party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    /// Other party's display name
    pub name: String,
    #[serde(rename = "other_user_email")]
    pub other_user_email: String,
    #[serde(rename = "latest_message")]
    pub latest_message: LatestMessage,
}

/// Closed set of message kinds.
///
/// Only `text` and `photo` have a working content encoding; the rest are
/// carried for wire compatibility and degrade to a raw-text echo when
/// projected for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "attributed_text")]
    AttributedText,
    #[serde(rename = "photo")]
    Photo,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "emoji")]
    Emoji,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "contact")]
    Contact,
    #[serde(rename = "linkPreview")]
    LinkPreview,
    #[serde(rename = "custom")]
    Custom,
}

/// Flat message record, one element of the append list at
/// `<conversation_id>/messages`.
///
/// Immutable once written. Ordering is list order; ids are ULIDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Literal text, or the remote URL string for `photo`
    pub content: String,
    /// RFC 3339 UTC timestamp string
    pub date: String,
    /// Sender's derived key
    #[serde(rename = "sender_email")]
    pub sender_email: String,
    #[serde(rename = "is_read")]
    pub is_read: bool,
    /// Sender's display name at send time
    pub name: String,
}

/// A structured message about to be sent, before field-mapping into the
/// flat wire record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub kind: MessageKind,
    /// Literal text, or the remote URL string for `photo`
    pub content: String,
    /// Sender's display name
    pub sender_name: String,
}

impl OutgoingMessage {
    /// Convenience constructor for a plain text message
    pub fn text(content: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.into(),
            sender_name: sender_name.into(),
        }
    }

    /// Convenience constructor for a photo message; `url` is the remote
    /// location of the already-uploaded image
    pub fn photo(url: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Photo,
            content: url.into(),
            sender_name: sender_name.into(),
        }
    }
}

/// Decode a raw tree value into a typed record, mapping serde failures
/// to [`ChatError::Decode`]
pub fn from_raw<T: serde::de::DeserializeOwned>(context: &str, raw: RawValue) -> ChatResult<T> {
    serde_json::from_value(raw).map_err(|e| ChatError::Decode(format!("{}: {}", context, e)))
}

/// Encode a typed record into a raw tree value.
///
/// Serialization of these plain structs cannot fail in practice, but the
/// error is still surfaced as [`ChatError::Decode`] rather than panicking.
pub fn to_raw<T: Serialize>(context: &str, value: &T) -> ChatResult<RawValue> {
    serde_json::to_value(value).map_err(|e| ChatError::Decode(format!("{}: {}", context, e)))
}
