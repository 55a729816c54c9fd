//! BlobStore port - the remote object-storage service as seen by blobtrip
//!
//! Adapters: [`super::S3BlobStore`] for S3-compatible services and
//! [`super::MemoryBlobStore`] for offline runs and tests.

use std::fmt;
use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::error::BlobError;

/// Streaming body of a downloaded blob
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Opaque continuation token returned by a listing page.
///
/// Callers must only hand it back to the next listing call.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for adapters threading it back to the service
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens can be long base64 blobs; the prefix is enough to tell them apart
        let shown: String = self.0.chars().take(16).collect();
        if shown.len() < self.0.len() {
            write!(f, "Cursor({}…)", shown)
        } else {
            write!(f, "Cursor({})", shown)
        }
    }
}

/// Container access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Only authenticated callers can read
    #[default]
    Private,
    /// Anyone can read a blob by its address; listing stays private
    PublicReadBlob,
}

/// One entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobDescriptor {
    pub name: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Options passed through to the listing call untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only list blobs whose name starts with this prefix
    pub prefix: Option<String>,
    /// Upper bound on page size the service may honour; the service decides
    pub page_size_hint: Option<i32>,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub blobs: Vec<BlobDescriptor>,
    /// `None` when there are no further pages
    pub next_cursor: Option<Cursor>,
}

/// Remote object-storage operations used by the workflow.
///
/// Every call is one remote round trip (or, for `delete_container`, the
/// smallest sequence the backend needs to remove a container and its blobs).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs ("s3", "memory")
    fn kind(&self) -> &'static str;

    /// Address of a container
    fn container_uri(&self, container: &str) -> String;

    /// Address of a blob
    fn blob_uri(&self, container: &str, blob: &str) -> String;

    /// Create a container. Fails with `ContainerAlreadyExists` on a name clash.
    async fn create_container(&self, container: &str) -> Result<(), BlobError>;

    /// Replace the container's access policy
    async fn set_access_policy(
        &self,
        container: &str,
        policy: AccessPolicy,
    ) -> Result<(), BlobError>;

    async fn container_exists(&self, container: &str) -> Result<bool, BlobError>;

    /// Delete a container and every blob in it.
    /// Fails with `ContainerNotFound` when it does not exist.
    async fn delete_container(&self, container: &str) -> Result<(), BlobError>;

    /// Stream a local file into a blob, returning the number of bytes stored
    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        source: &Path,
        content_type: &str,
    ) -> Result<u64, BlobError>;

    /// Open a blob for streaming reads
    async fn open_blob(&self, container: &str, blob: &str) -> Result<BlobReader, BlobError>;

    /// Fetch one listing page starting at `cursor` (`None` = first page)
    async fn list_blobs(
        &self,
        container: &str,
        options: &ListOptions,
        cursor: Option<Cursor>,
    ) -> Result<ListPage, BlobError>;
}
