//! Main ChatEngine - the entry point of the chatsync core
//!
//! The engine is an explicitly constructed composition root: it owns the
//! gateway handles, the session state, and the event broadcast channel,
//! and hands out the [`UserDirectory`] and [`ConversationLedger`]
//! facades wired to the same collaborators. There is no ambient global;
//! every consumer gets the engine (or a facade) passed in.
//!
//! # Example
//!
//! ```
//! use chatsync_core::{ChatEngine, DerivedKey, OutgoingMessage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chatsync_core::ChatError> {
//! let engine = ChatEngine::in_memory();
//! engine.register_user("Alice", "Anders", "a@x.com", None).await?;
//! engine.register_user("Bob", "Breck", "b@x.com", None).await?;
//! engine.login("a@x.com", "Alice Anders");
//!
//! let id = engine
//!     .ledger()
//!     .create_new_conversation(
//!         &DerivedKey::from_email("b@x.com"),
//!         "Bob Breck",
//!         OutgoingMessage::text("hi", "Alice Anders"),
//!     )
//!     .await?;
//!
//! let mut feed = engine.ledger().subscribe_messages(&id).await?;
//! let messages = feed.recv().await.unwrap()?;
//! assert_eq!(messages[0].content(), "hi");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::directory::{ChatUser, UserDirectory};
use crate::error::ChatResult;
use crate::events::{ChatEvent, EVENT_CHANNEL_CAPACITY};
use crate::feed::ConversationFeed;
use crate::ledger::ConversationLedger;
use crate::projection::DisplayMetrics;
use crate::store::{
    BlobStore, MemoryBlobStore, MemoryTreeStore, SessionKey, SessionStore, TreeStore,
};

/// Composition root of the chat data layer
pub struct ChatEngine {
    tree: Arc<dyn TreeStore>,
    blobs: Arc<dyn BlobStore>,
    session: SessionStore,
    events: broadcast::Sender<ChatEvent>,
    metrics: DisplayMetrics,
}

impl ChatEngine {
    /// Build an engine over the given gateways
    pub fn new(tree: Arc<dyn TreeStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tree,
            blobs,
            session: SessionStore::new(),
            events,
            metrics: DisplayMetrics::default(),
        }
    }

    /// Engine over fresh in-memory fakes, for tests and demos
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryTreeStore::new()),
            Arc::new(MemoryBlobStore::new()),
        )
    }

    /// Override the display geometry used by message projection
    pub fn with_display_metrics(mut self, metrics: DisplayMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// The user directory facade
    pub fn directory(&self) -> UserDirectory {
        UserDirectory::new(
            Arc::clone(&self.tree),
            Arc::clone(&self.blobs),
            self.session.clone(),
            self.events.clone(),
        )
    }

    /// The conversation ledger facade
    pub fn ledger(&self) -> ConversationLedger {
        ConversationLedger::new(
            Arc::clone(&self.tree),
            self.session.clone(),
            self.events.clone(),
            self.metrics,
        )
    }

    /// The session key-value store
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Subscribe to engine events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Register a user and, when `picture` is given, start the
    /// background avatar upload
    pub async fn register_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        picture: Option<Vec<u8>>,
    ) -> ChatResult<bool> {
        let user = ChatUser {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        };
        self.directory().insert_user(&user, picture).await
    }

    /// Record a completed login in the session and notify feeds.
    ///
    /// Session writes happen only at these transition points, sequenced
    /// ahead of chat operations by the surrounding flow.
    pub fn login(&self, email: &str, display_name: &str) {
        self.session.set(SessionKey::Email, email);
        self.session.set(SessionKey::DisplayName, display_name);
        info!(email, "login recorded");
        let _ = self.events.send(ChatEvent::LoginSucceeded {
            email: email.to_string(),
        });
    }

    /// Clear the session
    pub fn logout(&self) {
        self.session.remove(SessionKey::Email);
        self.session.remove(SessionKey::DisplayName);
        self.session.remove(SessionKey::PictureFileName);
        info!("logout recorded");
    }

    /// Spawn a conversation feed bound to the current (and future)
    /// session identity
    pub fn conversation_feed(&self) -> ConversationFeed {
        ConversationFeed::spawn(self.ledger(), self.session.clone(), self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_round_trip() {
        let engine = ChatEngine::in_memory();
        let mut events = engine.subscribe_events();

        engine.login("a@x.com", "Alice Anders");
        assert_eq!(engine.session().get(SessionKey::Email), "a@x.com");
        assert_eq!(engine.session().current_derived_key().as_str(), "a-x-com");
        assert!(matches!(
            events.try_recv(),
            Ok(ChatEvent::LoginSucceeded { .. })
        ));

        engine.logout();
        assert_eq!(engine.session().get(SessionKey::Email), "");
    }

    #[tokio::test]
    async fn test_facades_share_one_tree() {
        let engine = ChatEngine::in_memory();
        engine.register_user("Alice", "Anders", "a@x.com", None).await.unwrap();

        let key = crate::DerivedKey::from_email("a@x.com");
        assert!(engine.directory().user_exists(&key).await.unwrap());
    }
}
