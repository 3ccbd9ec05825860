//! User directory service
//!
//! Maintains the per-user profile nodes and the flat `users` collection
//! the new-conversation search screen lists. Registration also kicks off
//! the profile picture upload as a background task so the blob round
//! trip never blocks the registration result.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::identity::DerivedKey;
use crate::store::{self, paths, BlobStore, SessionKey, SessionStore, TreeStore};
use crate::types::{from_raw, to_raw, UserNode, UserSummary};

/// A registering or registered account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ChatUser {
    /// Path-safe identity key of this account
    pub fn derived_key(&self) -> DerivedKey {
        DerivedKey::from_email(&self.email)
    }

    /// Display name, `"<first> <last>"`
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Blob file name of this account's avatar
    pub fn profile_picture_file_name(&self) -> String {
        format!("{}_profile_picture.png", self.derived_key())
    }
}

/// Directory of registered users
#[derive(Clone)]
pub struct UserDirectory {
    tree: Arc<dyn TreeStore>,
    blobs: Arc<dyn BlobStore>,
    session: SessionStore,
    events: broadcast::Sender<ChatEvent>,
}

impl UserDirectory {
    pub(crate) fn new(
        tree: Arc<dyn TreeStore>,
        blobs: Arc<dyn BlobStore>,
        session: SessionStore,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            tree,
            blobs,
            session,
            events,
        }
    }

    /// Whether a user node exists at `key`.
    ///
    /// Absence of data is not an error; this only fails if the read
    /// itself does.
    pub async fn user_exists(&self, key: &DerivedKey) -> ChatResult<bool> {
        Ok(self.tree.read_once(&paths::user(key)).await?.is_some())
    }

    /// Register a user.
    ///
    /// Returns `Ok(false)` without touching anything when the key is
    /// already taken. Otherwise writes the profile node, appends a
    /// `{name, email}` summary to the flat `users` collection, and (when
    /// `picture` is given) uploads the avatar on a spawned background
    /// task. Upload failures never fail the registration; they are
    /// logged and reported as
    /// [`ChatEvent::ProfilePictureUploadFailed`].
    pub async fn insert_user(&self, user: &ChatUser, picture: Option<Vec<u8>>) -> ChatResult<bool> {
        let key = user.derived_key();
        if self.user_exists(&key).await? {
            debug!(key = %key, "user already registered");
            return Ok(false);
        }

        let node = UserNode {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        };
        self.tree.write(&paths::user(&key), to_raw("user node", &node)?).await?;

        if let Some(data) = picture {
            self.spawn_picture_upload(user, data);
        }

        let summary = UserSummary {
            name: user.display_name(),
            email: key.as_str().to_string(),
        };
        store::update_list::<UserSummary, _>(
            self.tree.as_ref(),
            &paths::users(),
            "users collection",
            |users| {
                let mut users = users.unwrap_or_default();
                users.push(summary.clone());
                Ok(users)
            },
        )
        .await?;

        debug!(key = %key, "user registered");
        Ok(true)
    }

    /// Fetch the directory, minus the current session's own entry.
    ///
    /// An unwritten collection is an empty directory; a malformed one is
    /// [`ChatError::Decode`].
    pub async fn get_all_users(&self) -> ChatResult<Vec<UserSummary>> {
        let own_key = self.session.current_derived_key();
        let users: Vec<UserSummary> = match self.tree.read_once(&paths::users()).await? {
            Some(raw) => from_raw("users collection", raw)?,
            None => Vec::new(),
        };
        Ok(users
            .into_iter()
            .filter(|u| u.email != own_key.as_str())
            .collect())
    }

    /// Read back a user's profile node
    pub async fn get_user(&self, key: &DerivedKey) -> ChatResult<UserNode> {
        match self.tree.read_once(&paths::user(key)).await? {
            Some(raw) => from_raw("user node", raw),
            None => Err(ChatError::NotFound(format!("user node missing: {}", key))),
        }
    }

    /// Fire-and-forget avatar upload. Success records the file name in
    /// the session so the profile screen can resolve the URL later.
    fn spawn_picture_upload(&self, user: &ChatUser, data: Vec<u8>) {
        let blobs = Arc::clone(&self.blobs);
        let session = self.session.clone();
        let events = self.events.clone();
        let file_name = user.profile_picture_file_name();

        tokio::spawn(async move {
            match blobs.upload(data, &file_name).await {
                Ok(url) => {
                    session.set(SessionKey::PictureFileName, &file_name);
                    debug!(%file_name, %url, "profile picture uploaded");
                }
                Err(e) => {
                    warn!(%file_name, error = %e, "profile picture upload failed");
                    let _ = events.send(ChatEvent::ProfilePictureUploadFailed {
                        file_name,
                        reason: e.to_string(),
                    });
                }
            }
        });
    }
}
