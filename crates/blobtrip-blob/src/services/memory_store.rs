//! MemoryBlobStore - in-process blob store
//!
//! Used for offline runs (`Provider=memory`) and as the storage double in
//! tests. Pages are cut by the store itself (`page_size`), the same way a
//! real service decides page boundaries, and any operation can be made to
//! fail once to simulate a transport error.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor as IoCursor;
use std::ops::Bound;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::store::{
    AccessPolicy, BlobDescriptor, BlobReader, BlobStore, Cursor, ListOptions, ListPage,
};
use crate::error::BlobError;

/// Service-side page size when none is configured
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 5000;

const CURSOR_PREFIX: &str = "after:";

/// Store operations, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    CreateContainer,
    SetAccessPolicy,
    ContainerExists,
    DeleteContainer,
    PutBlob,
    OpenBlob,
    ListBlobs,
}

struct StoredBlob {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryContainer {
    policy: AccessPolicy,
    blobs: BTreeMap<String, StoredBlob>,
}

#[derive(Default)]
struct MemoryState {
    containers: HashMap<String, MemoryContainer>,
    failures: HashMap<StoreOperation, VecDeque<String>>,
    calls: usize,
}

/// In-process implementation of [`BlobStore`]
pub struct MemoryBlobStore {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_MEMORY_PAGE_SIZE)
    }

    /// Store that returns at most `page_size` blobs per listing page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: page_size.max(1),
        }
    }

    /// Make the next call of `operation` fail with a service error
    pub fn fail_next(&self, operation: StoreOperation, message: impl Into<String>) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(message.into());
    }

    /// Number of store calls issued so far
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Names of the containers that currently exist, sorted
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().containers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn access_policy(&self, container: &str) -> Option<AccessPolicy> {
        self.lock().containers.get(container).map(|c| c.policy)
    }

    /// Content type a blob was stored with
    pub fn content_type(&self, container: &str, blob: &str) -> Option<String> {
        self.lock()
            .containers
            .get(container)
            .and_then(|c| c.blobs.get(blob))
            .map(|b| b.content_type.clone())
    }

    /// Insert a blob directly, bypassing the file-based upload path
    pub fn seed_blob(
        &self,
        container: &str,
        blob: &str,
        data: impl Into<Bytes>,
    ) -> Result<(), BlobError> {
        let mut state = self.lock();
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| BlobError::ContainerNotFound(container.to_string()))?;
        entry.blobs.insert(
            blob.to_string(),
            StoredBlob {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and pop an injected failure for it, if any
    fn begin(&self, operation: StoreOperation) -> Result<(), BlobError> {
        let mut state = self.lock();
        state.calls += 1;
        match state
            .failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(message) => {
                debug!("Injected failure for {:?}: {}", operation, message);
                Err(BlobError::Service(message))
            }
            None => Ok(()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn container_uri(&self, container: &str) -> String {
        format!("memory://{}", container)
    }

    fn blob_uri(&self, container: &str, blob: &str) -> String {
        format!("memory://{}/{}", container, blob)
    }

    async fn create_container(&self, container: &str) -> Result<(), BlobError> {
        self.begin(StoreOperation::CreateContainer)?;
        let mut state = self.lock();
        if state.containers.contains_key(container) {
            return Err(BlobError::ContainerAlreadyExists(container.to_string()));
        }
        state
            .containers
            .insert(container.to_string(), MemoryContainer::default());
        Ok(())
    }

    async fn set_access_policy(
        &self,
        container: &str,
        policy: AccessPolicy,
    ) -> Result<(), BlobError> {
        self.begin(StoreOperation::SetAccessPolicy)?;
        let mut state = self.lock();
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| BlobError::ContainerNotFound(container.to_string()))?;
        entry.policy = policy;
        Ok(())
    }

    async fn container_exists(&self, container: &str) -> Result<bool, BlobError> {
        self.begin(StoreOperation::ContainerExists)?;
        Ok(self.lock().containers.contains_key(container))
    }

    async fn delete_container(&self, container: &str) -> Result<(), BlobError> {
        self.begin(StoreOperation::DeleteContainer)?;
        match self.lock().containers.remove(container) {
            Some(_) => Ok(()),
            None => Err(BlobError::ContainerNotFound(container.to_string())),
        }
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<u64, BlobError> {
        self.begin(StoreOperation::PutBlob)?;
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| BlobError::local_io(source, e))?;
        let size = data.len() as u64;

        let mut state = self.lock();
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| BlobError::ContainerNotFound(container.to_string()))?;
        entry.blobs.insert(
            blob.to_string(),
            StoredBlob {
                data: Bytes::from(data),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(size)
    }

    async fn open_blob(&self, container: &str, blob: &str) -> Result<BlobReader, BlobError> {
        self.begin(StoreOperation::OpenBlob)?;
        let state = self.lock();
        let entry = state
            .containers
            .get(container)
            .ok_or_else(|| BlobError::ContainerNotFound(container.to_string()))?;
        let stored = entry
            .blobs
            .get(blob)
            .ok_or_else(|| BlobError::NotFound(blob.to_string()))?;
        Ok(Box::pin(IoCursor::new(stored.data.clone())))
    }

    async fn list_blobs(
        &self,
        container: &str,
        options: &ListOptions,
        cursor: Option<Cursor>,
    ) -> Result<ListPage, BlobError> {
        self.begin(StoreOperation::ListBlobs)?;

        let start = match cursor {
            Some(ref c) => {
                let after = c.as_str().strip_prefix(CURSOR_PREFIX).ok_or_else(|| {
                    BlobError::Service(format!("invalid continuation token {:?}", c))
                })?;
                Bound::Excluded(after.to_string())
            }
            None => Bound::Unbounded,
        };

        let page_size = match options.page_size_hint {
            Some(hint) if hint > 0 => (hint as usize).min(self.page_size),
            _ => self.page_size,
        };

        let state = self.lock();
        let entry = state
            .containers
            .get(container)
            .ok_or_else(|| BlobError::ContainerNotFound(container.to_string()))?;

        let mut matching = entry
            .blobs
            .range::<String, _>((start, Bound::Unbounded))
            .filter(|(name, _)| match options.prefix {
                Some(ref prefix) => name.starts_with(prefix.as_str()),
                None => true,
            });

        let blobs: Vec<BlobDescriptor> = matching
            .by_ref()
            .take(page_size)
            .map(|(name, stored)| BlobDescriptor {
                name: name.clone(),
                uri: self.blob_uri(container, name),
                size: Some(stored.data.len() as u64),
                last_modified: Some(stored.last_modified),
            })
            .collect();

        let next_cursor = match (matching.next(), blobs.last()) {
            (Some(_), Some(last)) => Some(Cursor::new(format!("{}{}", CURSOR_PREFIX, last.name))),
            _ => None,
        };

        debug!(
            "LIST {} -> {} blobs, more={}",
            container,
            blobs.len(),
            next_cursor.is_some()
        );

        Ok(ListPage { blobs, next_cursor })
    }
}
