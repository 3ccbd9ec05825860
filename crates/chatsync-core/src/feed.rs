//! Per-screen conversation feed
//!
//! The conversations screen binds to one [`ConversationFeed`]: a task
//! that holds the ledger subscription for the current session identity,
//! re-issues it whenever a login completes, and publishes the latest
//! list through a watch channel. Teardown is tied to the feed's drop,
//! which matches the owning screen's lifetime.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::ChatEvent;
use crate::ledger::{ConversationLedger, Feed};
use crate::store::SessionStore;
use crate::types::ConversationEntry;

/// Snapshot of what the conversations screen renders
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    /// Current conversation list, newest preview per entry
    pub conversations: Vec<ConversationEntry>,
    /// Most recent feed failure, cleared by the next good emission
    pub last_error: Option<String>,
}

/// Live conversation-list binding for one screen.
///
/// Dropping it tears the subscription down.
pub struct ConversationFeed {
    state: watch::Receiver<FeedState>,
    task: JoinHandle<()>,
}

impl ConversationFeed {
    /// Start the feed for whatever identity is in the session now,
    /// re-subscribing on every [`ChatEvent::LoginSucceeded`].
    pub(crate) fn spawn(
        ledger: ConversationLedger,
        session: SessionStore,
        events: broadcast::Receiver<ChatEvent>,
    ) -> Self {
        let (tx, state) = watch::channel(FeedState::default());
        let task = tokio::spawn(run(ledger, session, events, tx));
        Self { state, task }
    }

    /// Watch handle on the feed state
    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    ledger: ConversationLedger,
    session: SessionStore,
    mut events: broadcast::Receiver<ChatEvent>,
    tx: watch::Sender<FeedState>,
) {
    let mut inner = resubscribe(&ledger, &session, &tx).await;

    loop {
        let has_feed = inner.is_some();
        tokio::select! {
            event = events.recv() => match event {
                Ok(ChatEvent::LoginSucceeded { email }) => {
                    debug!(%email, "login observed, re-subscribing conversation feed");
                    inner = resubscribe(&ledger, &session, &tx).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            item = next(&mut inner), if has_feed => match item {
                Some(Ok(conversations)) => tx.send_modify(|s| {
                    s.conversations = conversations;
                    s.last_error = None;
                }),
                Some(Err(e)) => tx.send_modify(|s| s.last_error = Some(e.to_string())),
                // Feed ended (e.g. after a decode failure); wait for the
                // next login to re-issue the request
                None => inner = None,
            },
        }

        if tx.is_closed() {
            break;
        }
    }
}

async fn next(
    inner: &mut Option<Feed<Vec<ConversationEntry>>>,
) -> Option<crate::error::ChatResult<Vec<ConversationEntry>>> {
    match inner {
        Some(feed) => feed.recv().await,
        None => None,
    }
}

async fn resubscribe(
    ledger: &ConversationLedger,
    session: &SessionStore,
    tx: &watch::Sender<FeedState>,
) -> Option<Feed<Vec<ConversationEntry>>> {
    let key = session.current_derived_key();
    match ledger.subscribe_conversations(&key).await {
        Ok(feed) => Some(feed),
        Err(e) => {
            tx.send_modify(|s| s.last_error = Some(e.to_string()));
            None
        }
    }
}
