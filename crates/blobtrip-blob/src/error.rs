//! Error types for blob operations

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the blob store or the local disk
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Storage service error: {0}")]
    Service(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container already exists: {0}")]
    ContainerAlreadyExists(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Container '{0}' has already been deleted")]
    ContainerReleased(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Local I/O error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Listing returned the same continuation token twice: {0}")]
    CursorLoop(String),

    #[error("Listing stopped after {0} pages without reaching the end")]
    PageLimitExceeded(usize),
}

/// The two failure classes the workflow distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Anything the remote service (or our handling of its answers) rejected
    Service,
    /// Local file create/read/write/delete failure
    LocalIo,
}

impl BlobError {
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BlobError::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BlobError::LocalIo { .. } => ErrorKind::LocalIo,
            _ => ErrorKind::Service,
        }
    }

    /// True for "the thing is already gone"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BlobError::ContainerNotFound(_) | BlobError::NotFound(_)
        )
    }
}
