//! Conversation ledger
//!
//! The orchestration core: creates conversations, appends messages, and
//! keeps both participants' latest-message previews in step, all against
//! the external tree store. Each public operation is a short saga of
//! dependent async steps; nothing is retried beyond the compare-and-swap
//! loop that guards list writes, and no failure is fatal to the process.
//!
//! Cross-user layout for one conversation between `a-x-com` and
//! `b-x-com`:
//!
//! ```text
//! a-x-com/conversations      [ { id, name: "Bob",   other_user_email: "b-x-com", latest_message } ]
//! b-x-com/conversations      [ { id, name: "Alice", other_user_email: "a-x-com", latest_message } ]
//! <id>/messages              [ message records, append order ]
//! ```
//!
//! The two `conversations` paths are independent; the mirror entry on
//! the other user's list is written by a spawned task whose failure is
//! reported on the engine event channel, never in the caller's result.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::identity::DerivedKey;
use crate::projection::{project, DisplayMessage, DisplayMetrics};
use crate::store::{self, paths, SessionKey, SessionStore, TreeStore};
use crate::types::{
    from_raw, to_raw, ConversationEntry, ConversationId, LatestMessage, MessageRecord,
    OutgoingMessage,
};

/// Retry budget for the latest-message compare-and-swap loop
const MAX_CAS_RETRIES: usize = 8;

/// Continuous decoded feed from one observed tree path.
///
/// A decode failure is emitted as the final item and ends the feed; it
/// is not retried. Dropping the feed aborts the decode task and
/// unsubscribes.
pub struct Feed<T> {
    rx: mpsc::UnboundedReceiver<ChatResult<T>>,
    task: JoinHandle<()>,
}

impl<T> Feed<T> {
    /// Next emission, or `None` once the feed has ended
    pub async fn recv(&mut self) -> Option<ChatResult<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for Feed<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The conversation ledger
#[derive(Clone)]
pub struct ConversationLedger {
    tree: Arc<dyn TreeStore>,
    session: SessionStore,
    events: broadcast::Sender<ChatEvent>,
    metrics: DisplayMetrics,
}

impl ConversationLedger {
    pub(crate) fn new(
        tree: Arc<dyn TreeStore>,
        session: SessionStore,
        events: broadcast::Sender<ChatEvent>,
        metrics: DisplayMetrics,
    ) -> Self {
        Self {
            tree,
            session,
            events,
            metrics,
        }
    }

    /// Open a new thread with `other_key` and post its first message.
    ///
    /// Steps:
    /// 1. Require the current user's node to exist, then append an entry
    ///    pointing at the other user to the current user's conversation
    ///    list (creating the list).
    /// 2. Write the first message under the fresh conversation id. A
    ///    failure here leaves the summary from step 1 dangling and is
    ///    surfaced as [`ChatError::PartialSaga`]; step 1 is not rolled
    ///    back.
    /// 3. Spawn the symmetric append onto the other user's list. Its
    ///    failure only surfaces as [`ChatEvent::SagaSideFailed`];
    ///    callers wanting strong convergence subscribe to the event
    ///    channel.
    pub async fn create_new_conversation(
        &self,
        other_key: &DerivedKey,
        other_name: &str,
        first_message: OutgoingMessage,
    ) -> ChatResult<ConversationId> {
        let own_key = self.session.current_derived_key();
        if self.tree.read_once(&paths::user(&own_key)).await?.is_none() {
            return Err(ChatError::NotFound(format!(
                "user node missing: {}",
                own_key
            )));
        }

        let conversation_id = ConversationId::new();
        let record = self.build_record(&first_message);
        let latest = LatestMessage {
            date: record.date.clone(),
            text: record.content.clone(),
            is_read: false,
        };

        // Step 1: our own side of the thread
        let own_entry = ConversationEntry {
            id: conversation_id.as_str().to_string(),
            name: other_name.to_string(),
            other_user_email: other_key.as_str().to_string(),
            latest_message: latest.clone(),
        };
        store::update_list::<ConversationEntry, _>(
            self.tree.as_ref(),
            &paths::conversations(&own_key),
            "conversations list",
            |entries| {
                let mut entries = entries.unwrap_or_default();
                entries.push(own_entry.clone());
                Ok(entries)
            },
        )
        .await?;

        // Step 2: the message body under the fresh conversation id
        let body = to_raw("message list", &vec![record])?;
        if let Err(e) = self.tree.write(&paths::messages(&conversation_id), body).await {
            return Err(ChatError::PartialSaga(format!(
                "conversation {} summary committed but message body write failed: {}",
                conversation_id, e
            )));
        }

        // Step 3: the mirror entry on the other side, fire-and-forget
        self.spawn_other_side_entry(&conversation_id, other_key, latest);

        debug!(id = %conversation_id, other = %other_key, "conversation created");
        Ok(conversation_id)
    }

    /// Append a message to an existing conversation.
    ///
    /// An absent message list is [`ChatError::NotFound`]: sends only go
    /// to threads that were actually created. The compare-and-swap loop
    /// in [`store::update_list`] keeps two near-simultaneous senders from
    /// overwriting each other's append.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        message: OutgoingMessage,
    ) -> ChatResult<()> {
        let record = self.build_record(&message);
        let path = paths::messages(conversation_id);
        let id = conversation_id.clone();

        store::update_list::<MessageRecord, _>(
            self.tree.as_ref(),
            &path,
            "message list",
            move |records| match records {
                Some(mut records) => {
                    records.push(record.clone());
                    Ok(records)
                }
                None => Err(ChatError::NotFound(format!(
                    "no messages to fetch: {}",
                    id
                ))),
            },
        )
        .await?;
        Ok(())
    }

    /// Overwrite the latest-message preview on `for_key`'s copy of the
    /// conversation.
    ///
    /// A last-write, not an append: repeating the call with the same
    /// preview leaves the entry unchanged. An entry that is not found is
    /// a silent no-op, not an error.
    pub async fn update_latest_message(
        &self,
        for_key: &DerivedKey,
        conversation_id: &ConversationId,
        latest: LatestMessage,
    ) -> ChatResult<()> {
        let path = paths::conversations(for_key);

        for attempt in 0..MAX_CAS_RETRIES {
            let (raw, version) = self.tree.read_versioned(&path).await?;
            let mut entries: Vec<ConversationEntry> = match raw {
                Some(raw) => from_raw("conversations list", raw)?,
                // Nothing to update and nothing worth creating
                None => {
                    debug!(%for_key, id = %conversation_id, "no conversation list, preview update skipped");
                    return Ok(());
                }
            };

            match entries.iter_mut().find(|e| e.id == conversation_id.as_str()) {
                Some(entry) => entry.latest_message = latest.clone(),
                None => {
                    debug!(%for_key, id = %conversation_id, "conversation entry not found, preview update skipped")
                }
            }

            let raw = to_raw("conversations list", &entries)?;
            if self.tree.compare_and_swap(&path, version, raw).await? {
                return Ok(());
            }
            debug!(%path, attempt, "preview write conflicted, retrying");
        }

        Err(ChatError::Conflict(format!(
            "{}: still conflicting after {} attempts",
            path, MAX_CAS_RETRIES
        )))
    }

    /// The full send: append the message, then refresh the preview on
    /// both participants' conversation entries. Success means all three
    /// steps succeeded; the first failure wins.
    pub async fn deliver(
        &self,
        conversation_id: &ConversationId,
        other_key: &DerivedKey,
        message: OutgoingMessage,
    ) -> ChatResult<()> {
        let own_key = self.session.current_derived_key();
        let latest = LatestMessage {
            date: Utc::now().to_rfc3339(),
            text: message.content.clone(),
            is_read: false,
        };

        self.send_message(conversation_id, message).await?;
        self.update_latest_message(&own_key, conversation_id, latest.clone())
            .await?;
        self.update_latest_message(other_key, conversation_id, latest)
            .await?;
        Ok(())
    }

    /// Continuous feed of `for_key`'s conversation list.
    ///
    /// Emits on every remote change; an unwritten path is an empty list.
    pub async fn subscribe_conversations(
        &self,
        for_key: &DerivedKey,
    ) -> ChatResult<Feed<Vec<ConversationEntry>>> {
        let sub = self.tree.observe(&paths::conversations(for_key)).await?;
        Ok(spawn_feed(sub, |raw| from_raw("conversations list", raw)))
    }

    /// Continuous feed of a conversation's history, projected for
    /// display
    pub async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> ChatResult<Feed<Vec<DisplayMessage>>> {
        let sub = self.tree.observe(&paths::messages(conversation_id)).await?;
        let metrics = self.metrics;
        Ok(spawn_feed(sub, move |raw| {
            let records: Vec<MessageRecord> = from_raw("message list", raw)?;
            Ok(records.iter().map(|r| project(r, &metrics)).collect())
        }))
    }

    /// Field-map a structured outgoing message into the flat wire record
    fn build_record(&self, message: &OutgoingMessage) -> MessageRecord {
        MessageRecord {
            id: Ulid::new().to_string(),
            kind: message.kind,
            content: message.content.clone(),
            date: Utc::now().to_rfc3339(),
            sender_email: self.session.current_derived_key().as_str().to_string(),
            is_read: false,
            name: message.sender_name.clone(),
        }
    }

    fn spawn_other_side_entry(
        &self,
        conversation_id: &ConversationId,
        other_key: &DerivedKey,
        latest: LatestMessage,
    ) {
        let tree = Arc::clone(&self.tree);
        let events = self.events.clone();
        let own_key = self.session.current_derived_key();
        let own_name = self.session.get(SessionKey::DisplayName);
        let other_key = other_key.clone();
        let conversation_id = conversation_id.clone();

        tokio::spawn(async move {
            let mirror = ConversationEntry {
                id: conversation_id.as_str().to_string(),
                name: own_name,
                other_user_email: own_key.as_str().to_string(),
                latest_message: latest,
            };
            let result = store::update_list::<ConversationEntry, _>(
                tree.as_ref(),
                &paths::conversations(&other_key),
                "conversations list",
                |entries| {
                    let mut entries = entries.unwrap_or_default();
                    entries.push(mirror.clone());
                    Ok(entries)
                },
            )
            .await;

            if let Err(e) = result {
                warn!(id = %conversation_id, other = %other_key, error = %e,
                    "other-side conversation entry failed, lists diverged");
                let _ = events.send(ChatEvent::SagaSideFailed {
                    conversation_id: conversation_id.as_str().to_string(),
                    other_key,
                    reason: e.to_string(),
                });
            }
        });
    }
}

/// Spawn the observe → decode → emit pump behind a [`Feed`].
///
/// `decode` sees the raw value of a written path; an unwritten path
/// short-circuits to an empty list without touching the decoder.
fn spawn_feed<T, F>(mut sub: store::TreeSubscription, decode: F) -> Feed<Vec<T>>
where
    T: Send + 'static,
    F: Fn(store::RawValue) -> ChatResult<Vec<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(snapshot) = sub.recv().await {
            let item = match snapshot {
                Some(raw) => decode(raw),
                None => Ok(Vec::new()),
            };
            let failed = item.is_err();
            if tx.send(item).is_err() || failed {
                break;
            }
        }
    });
    Feed { rx, task }
}
