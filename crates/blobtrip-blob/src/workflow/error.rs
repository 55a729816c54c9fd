use blobtrip_config::ConfigError;
use thiserror::Error;

use crate::error::{BlobError, ErrorKind};

/// Why a quickstart run did not reach `Done`
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No connection string configured; nothing was created
    #[error("No connection string found in '{key}'")]
    ConfigurationAbsent { key: String },

    #[error("Invalid connection string: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Error returned from the service: {0}")]
    Service(#[source] BlobError),

    #[error("Local file error: {0}")]
    LocalIo(#[source] BlobError),

    #[error("Cancelled")]
    Cancelled,
}

impl From<BlobError> for WorkflowError {
    fn from(err: BlobError) -> Self {
        match err.kind() {
            ErrorKind::LocalIo => WorkflowError::LocalIo(err),
            ErrorKind::Service => WorkflowError::Service(err),
        }
    }
}

impl WorkflowError {
    /// True for errors raised before any resource was touched
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WorkflowError::ConfigurationAbsent { .. } | WorkflowError::Configuration(_)
        )
    }
}
