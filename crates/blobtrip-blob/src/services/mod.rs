//! Blob storage services: the store port, its adapters, and the container,
//! transfer and listing services built on top of it

mod container;
mod factory;
mod memory_store;
mod pager;
mod s3_store;
mod store;
mod transfer;

pub use container::{
    unique_container_name, Container, ContainerManager, DeleteOutcome, DEFAULT_CONTAINER_BASE,
    MAX_CONTAINER_BASE_LEN,
};
pub use factory::BlobStoreFactory;
pub use memory_store::{MemoryBlobStore, StoreOperation, DEFAULT_MEMORY_PAGE_SIZE};
pub use pager::{BlobEnumerator, BlobPager, PageSource, StorePageSource, DEFAULT_MAX_PAGES};
pub use s3_store::S3BlobStore;
pub use store::{
    AccessPolicy, BlobDescriptor, BlobReader, BlobStore, Cursor, ListOptions, ListPage,
};
pub use transfer::{guess_content_type, BlobInfo, BlobTransfer};

#[cfg(test)]
pub(crate) use store::MockBlobStore;
