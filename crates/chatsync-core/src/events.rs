//! Engine event types
//!
//! Out-of-band notifications broadcast by [`ChatEngine`](crate::ChatEngine):
//! session transitions that screens re-query on, and failures of
//! fire-and-forget side steps that never surface through an operation's
//! own result channel.

use crate::identity::DerivedKey;

/// Capacity of the engine event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events broadcast by the engine
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A login completed; screens holding a conversation feed re-issue
    /// their subscription for the new identity
    LoginSucceeded {
        /// The email that just logged in
        email: String,
    },
    /// The symmetric other-side write of a conversation creation failed,
    /// leaving the two participants' conversation lists diverged
    SagaSideFailed {
        /// Conversation whose mirror entry was not written
        conversation_id: String,
        /// The participant whose list is missing the entry
        other_key: DerivedKey,
        /// Failure description
        reason: String,
    },
    /// A background profile-picture upload failed; registration itself
    /// already succeeded
    ProfilePictureUploadFailed {
        /// File name the upload was addressed by
        file_name: String,
        /// Failure description
        reason: String,
    },
}
