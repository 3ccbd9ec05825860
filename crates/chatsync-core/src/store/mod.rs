//! Gateways to the external collaborators
//!
//! The core never talks to a concrete backend directly; everything goes
//! through the [`TreeStore`] and [`BlobStore`] traits so the ledger and
//! directory can be exercised against the in-memory fakes. The remote
//! tree store is path-addressed with full-value overwrite semantics:
//! a write replaces everything at its path, there is no merge or patch.

pub mod blobs;
pub mod memory;
pub mod session;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ChatResult;
use crate::identity::DerivedKey;
use crate::types::ConversationId;

pub use blobs::{upload_batch, BlobStore, MemoryBlobStore};
pub use memory::MemoryTreeStore;
pub use session::{SessionKey, SessionStore};

/// Raw value at a tree path, as the store hands it back
pub type RawValue = serde_json::Value;

/// Per-path monotonic version, bumped on every committed write.
///
/// An unwritten path has version 0.
pub type TreeVersion = u64;

/// Remote tree store gateway.
///
/// The store itself is an external service; its consistency model
/// (per-path single-writer, no multi-key transactions) is a given.
/// The one extension over the bare read/write/observe surface is the
/// per-path version token, which lets list appends be compare-and-swap
/// writes instead of lossy read-modify-write cycles.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Single snapshot read. Resolves with `None` if nothing exists at
    /// `path`; absence is not an error.
    async fn read_once(&self, path: &str) -> ChatResult<Option<RawValue>>;

    /// Snapshot read together with the path's current version
    async fn read_versioned(&self, path: &str) -> ChatResult<(Option<RawValue>, TreeVersion)>;

    /// Full-value overwrite of everything at `path`
    async fn write(&self, path: &str, value: RawValue) -> ChatResult<()>;

    /// Write `value` only if the path is still at `expected`.
    ///
    /// Returns `Ok(false)` when a concurrent writer got there first; the
    /// caller re-reads and retries.
    async fn compare_and_swap(
        &self,
        path: &str,
        expected: TreeVersion,
        value: RawValue,
    ) -> ChatResult<bool>;

    /// Continuous change notification: the current snapshot first, then
    /// every subsequent full value written at `path`, until the returned
    /// subscription is dropped.
    async fn observe(&self, path: &str) -> ChatResult<TreeSubscription>;
}

/// Live subscription to one tree path.
///
/// Dropping the subscription unsubscribes.
pub struct TreeSubscription {
    /// Snapshot taken at subscribe time, delivered as the first item
    initial: Option<Option<RawValue>>,
    rx: broadcast::Receiver<Option<RawValue>>,
}

impl TreeSubscription {
    /// Build a subscription from the snapshot at subscribe time and the
    /// path's notification channel
    pub fn new(initial: Option<RawValue>, rx: broadcast::Receiver<Option<RawValue>>) -> Self {
        Self {
            initial: Some(initial),
            rx,
        }
    }

    /// Next snapshot, or `None` once the store side has gone away.
    ///
    /// Every item is a full value, so a lagged receiver just skips ahead
    /// to a newer snapshot.
    pub async fn recv(&mut self) -> Option<Option<RawValue>> {
        if let Some(first) = self.initial.take() {
            return Some(first);
        }
        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "tree subscription lagged, skipping to newer snapshot");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Retry budget for compare-and-swap list updates. Conflicts only occur
/// under concurrent writers to one path, so the loop converges fast.
const MAX_CAS_RETRIES: usize = 8;

/// Read-mutate-swap loop over a JSON list at `path`.
///
/// Reads the versioned list (handing `None` to `mutate` when the path is
/// unwritten), applies the mutation, and writes back with
/// [`TreeStore::compare_and_swap`]; a lost swap re-reads and retries.
/// This is what keeps concurrent appends to the same list from
/// overwriting each other.
pub async fn update_list<T, F>(
    tree: &dyn TreeStore,
    path: &str,
    context: &str,
    mut mutate: F,
) -> ChatResult<Vec<T>>
where
    T: serde::de::DeserializeOwned + serde::Serialize,
    F: FnMut(Option<Vec<T>>) -> ChatResult<Vec<T>>,
{
    for attempt in 0..MAX_CAS_RETRIES {
        let (raw, version) = tree.read_versioned(path).await?;
        let list = match raw {
            Some(raw) => Some(crate::types::from_raw(context, raw)?),
            None => None,
        };
        let updated = mutate(list)?;
        let raw = crate::types::to_raw(context, &updated)?;
        if tree.compare_and_swap(path, version, raw).await? {
            return Ok(updated);
        }
        tracing::debug!(path, attempt, "list write conflicted, retrying");
    }
    Err(crate::error::ChatError::Conflict(format!(
        "{}: still conflicting after {} attempts",
        path, MAX_CAS_RETRIES
    )))
}

/// Tree path layout.
///
/// ```text
/// <derived_key>                      user node {firstName, lastName}
/// <derived_key>/conversations        that user's conversation entries
/// users                              flat directory of {name, email}
/// <conversation_id>/messages         append list of message records
/// ```
pub mod paths {
    use super::*;

    /// Path of a user's profile node
    pub fn user(key: &DerivedKey) -> String {
        key.as_str().to_string()
    }

    /// Path of the flat all-users collection
    pub fn users() -> String {
        "users".to_string()
    }

    /// Path of a user's conversation list
    pub fn conversations(key: &DerivedKey) -> String {
        format!("{}/conversations", key.as_str())
    }

    /// Path of a conversation's message list
    pub fn messages(id: &ConversationId) -> String {
        format!("{}/messages", id.as_str())
    }
}
