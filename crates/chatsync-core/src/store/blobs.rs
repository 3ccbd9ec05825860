//! Blob storage gateway
//!
//! Profile pictures and photo attachments live in an external blob/CDN
//! service, not in the tree store; the tree only ever holds their
//! download URLs. Uploads are content-addressed by file name
//! (`<derived_key>_profile_picture.png` for avatars).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;

use crate::error::{ChatError, ChatResult};

/// External blob storage gateway
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `data` under `file_name`, returning the public download URL
    async fn upload(&self, data: Vec<u8>, file_name: &str) -> ChatResult<String>;

    /// Resolve the download URL of a previously uploaded blob
    async fn download_url(&self, file_name: &str) -> ChatResult<String>;
}

/// Upload a batch of blobs, joining all completions.
///
/// Returns the download URLs in input order; fails if any single upload
/// failed (the first error wins, successful siblings are not rolled
/// back).
pub async fn upload_batch(
    store: &dyn BlobStore,
    items: Vec<(Vec<u8>, String)>,
) -> ChatResult<Vec<String>> {
    let uploads = items
        .iter()
        .map(|(data, name)| store.upload(data.clone(), name));
    join_all(uploads).await.into_iter().collect()
}

/// In-memory [`BlobStore`] fake, keyed by file name
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Create an empty blob store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Whether the store holds no blobs
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    fn url_for(file_name: &str) -> String {
        format!("memory://images/{}", file_name)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Vec<u8>, file_name: &str) -> ChatResult<String> {
        if data.is_empty() {
            return Err(ChatError::RemoteWrite(format!(
                "blob upload rejected, empty payload: {}",
                file_name
            )));
        }
        self.blobs.lock().insert(file_name.to_string(), data);
        Ok(Self::url_for(file_name))
    }

    async fn download_url(&self, file_name: &str) -> ChatResult<String> {
        if self.blobs.lock().contains_key(file_name) {
            Ok(Self::url_for(file_name))
        } else {
            Err(ChatError::NotFound(format!("blob missing: {}", file_name)))
        }
    }
}
