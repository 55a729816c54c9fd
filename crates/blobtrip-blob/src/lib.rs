//! blobtrip-blob: blob storage round trip
//!
//! A [`BlobStore`] port with S3 and in-memory adapters, the container,
//! transfer and listing services built on it, and the [`Quickstart`]
//! workflow that drives them and always cleans up after itself.

pub mod error;
pub mod services;
pub mod workflow;

pub use error::{BlobError, ErrorKind};
pub use services::{
    AccessPolicy, BlobDescriptor, BlobEnumerator, BlobInfo, BlobPager, BlobStore,
    BlobStoreFactory, BlobTransfer, Container, ContainerManager, Cursor, DeleteOutcome,
    ListOptions, ListPage, MemoryBlobStore, S3BlobStore,
};
pub use workflow::{
    Prompt, ProgressEvent, Quickstart, QuickstartOptions, Reporter, WorkflowError, WorkflowReport,
    WorkflowState,
};
