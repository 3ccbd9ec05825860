//! chatsync core library
//!
//! Reactive data layer of a two-party chat client whose persistence is
//! an external realtime tree store (paths to JSON values, full-value
//! overwrite semantics, no multi-key transactions). The library is the
//! orchestration between those paths: creating conversations, appending
//! messages, keeping both participants' latest-message previews in
//! sync, and projecting the remote feeds into display models.
//!
//! ## Overview
//!
//! - [`ChatEngine`]: dependency-injected composition root
//! - [`UserDirectory`]: registration and the flat users collection
//! - [`ConversationLedger`]: the conversation/message sagas and feeds
//! - [`store`]: gateway traits plus in-memory fakes
//! - [`project`]: wire record to display model
//!
//! ## Quick Start
//!
//! ```
//! use chatsync_core::{ChatEngine, DerivedKey, OutgoingMessage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chatsync_core::ChatError> {
//! let engine = ChatEngine::in_memory();
//! engine.register_user("Alice", "Anders", "a@x.com", None).await?;
//! engine.login("a@x.com", "Alice Anders");
//!
//! let ledger = engine.ledger();
//! let id = ledger
//!     .create_new_conversation(
//!         &DerivedKey::from_email("b@x.com"),
//!         "Bob Breck",
//!         OutgoingMessage::text("hi", "Alice Anders"),
//!     )
//!     .await?;
//! ledger
//!     .deliver(
//!         &id,
//!         &DerivedKey::from_email("b@x.com"),
//!         OutgoingMessage::text("how are you?", "Alice Anders"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod identity;
pub mod ledger;
pub mod projection;
pub mod store;
pub mod types;

// Re-exports
pub use directory::{ChatUser, UserDirectory};
pub use engine::ChatEngine;
pub use error::{ChatError, ChatResult};
pub use events::{ChatEvent, EVENT_CHANNEL_CAPACITY};
pub use feed::{ConversationFeed, FeedState};
pub use identity::DerivedKey;
pub use ledger::{ConversationLedger, Feed};
pub use projection::{project, DisplayBody, DisplayMessage, DisplayMetrics, PHOTO_HEIGHT};
pub use store::{
    upload_batch, BlobStore, MemoryBlobStore, MemoryTreeStore, RawValue, SessionKey, SessionStore,
    TreeStore, TreeSubscription, TreeVersion,
};
pub use types::{
    ConversationEntry, ConversationId, LatestMessage, MessageKind, MessageRecord, OutgoingMessage,
    UserNode, UserSummary,
};
