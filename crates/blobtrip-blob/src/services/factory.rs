use std::sync::Arc;

use blobtrip_config::{ConnectionDescriptor, StorageProvider};
use tracing::debug;

use super::memory_store::MemoryBlobStore;
use super::s3_store::S3BlobStore;
use super::store::BlobStore;
use crate::error::BlobError;

/// Factory for creating blob stores
pub struct BlobStoreFactory;

impl BlobStoreFactory {
    /// Create the store a connection descriptor points at.
    ///
    /// # Errors
    ///
    /// Fails with a service error when the S3 client cannot be configured
    /// from the descriptor.
    pub async fn from_descriptor(
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn BlobStore>, BlobError> {
        debug!("Connecting to {} blob store", descriptor.provider());
        let store: Arc<dyn BlobStore> = match descriptor.provider() {
            StorageProvider::S3 => Arc::new(S3BlobStore::connect(descriptor).await?),
            StorageProvider::Memory => Arc::new(MemoryBlobStore::new()),
        };
        Ok(store)
    }
}
