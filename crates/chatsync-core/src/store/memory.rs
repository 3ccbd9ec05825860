//! In-memory tree store
//!
//! Backs the tests and the file-backed CLI. Holds the whole tree as a
//! flat map of path → (value, version) and fans change notifications out
//! through one broadcast channel per observed path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::{ChatError, ChatResult};
use crate::store::{RawValue, TreeStore, TreeSubscription, TreeVersion};

/// Capacity of each per-path notification channel. Snapshots are full
/// values, so a lagged observer only skips stale intermediates.
const PATH_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    entries: HashMap<String, (RawValue, TreeVersion)>,
    watchers: HashMap<String, broadcast::Sender<Option<RawValue>>>,
}

impl Inner {
    fn notify(&mut self, path: &str, value: Option<RawValue>) {
        if let Some(tx) = self.watchers.get(path) {
            if tx.send(value).is_err() {
                // Every subscription for this path has been dropped.
                self.watchers.remove(path);
            }
        }
    }
}

/// In-memory [`TreeStore`] with per-path versions and change
/// notification.
///
/// Cloning is cheap; clones share the same tree.
#[derive(Clone, Default)]
pub struct MemoryTreeStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTreeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the whole tree as one JSON object keyed by path.
    ///
    /// Versions are not exported; an imported tree starts fresh at
    /// version 1 per path.
    pub fn export(&self) -> RawValue {
        let inner = self.inner.lock();
        let map: Map<String, Value> = inner
            .entries
            .iter()
            .map(|(path, (value, _))| (path.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }

    /// Replace the tree contents from an [`export`](Self::export)ed
    /// snapshot
    pub fn import(&self, snapshot: RawValue) -> ChatResult<()> {
        let map = match snapshot {
            Value::Object(map) => map,
            other => {
                return Err(ChatError::Decode(format!(
                    "tree snapshot: expected object, got {}",
                    other
                )))
            }
        };
        let mut inner = self.inner.lock();
        inner.entries = map.into_iter().map(|(path, value)| (path, (value, 1))).collect();
        Ok(())
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn read_once(&self, path: &str) -> ChatResult<Option<RawValue>> {
        let inner = self.inner.lock();
        Ok(inner.entries.get(path).map(|(value, _)| value.clone()))
    }

    async fn read_versioned(&self, path: &str) -> ChatResult<(Option<RawValue>, TreeVersion)> {
        let inner = self.inner.lock();
        Ok(match inner.entries.get(path) {
            Some((value, version)) => (Some(value.clone()), *version),
            None => (None, 0),
        })
    }

    async fn write(&self, path: &str, value: RawValue) -> ChatResult<()> {
        let mut inner = self.inner.lock();
        let version = inner.entries.get(path).map(|(_, v)| *v).unwrap_or(0);
        inner
            .entries
            .insert(path.to_string(), (value.clone(), version + 1));
        inner.notify(path, Some(value));
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        expected: TreeVersion,
        value: RawValue,
    ) -> ChatResult<bool> {
        let mut inner = self.inner.lock();
        let current = inner.entries.get(path).map(|(_, v)| *v).unwrap_or(0);
        if current != expected {
            return Ok(false);
        }
        inner
            .entries
            .insert(path.to_string(), (value.clone(), current + 1));
        inner.notify(path, Some(value));
        Ok(true)
    }

    async fn observe(&self, path: &str) -> ChatResult<TreeSubscription> {
        let mut inner = self.inner.lock();
        let initial = inner.entries.get(path).map(|(value, _)| value.clone());
        let rx = inner
            .watchers
            .entry(path.to_string())
            .or_insert_with(|| broadcast::channel(PATH_CHANNEL_CAPACITY).0)
            .subscribe();
        Ok(TreeSubscription::new(initial, rx))
    }
}
