//! Quickstart workflow: sequences the blob services and guarantees cleanup

mod cleanup;
mod error;
mod options;
mod orchestrator;
mod progress;
mod state;

pub use cleanup::{CleanupEntry, CleanupReport, CleanupStack, ReleaseOutcome, ResourceKind};
pub use error::WorkflowError;
pub use options::{
    destination_file_name, QuickstartOptions, DEFAULT_FILE_STEM, DEFAULT_SOURCE_CONTENT,
    DOWNLOADED_SUFFIX,
};
pub use orchestrator::{Quickstart, WorkflowReport};
pub use progress::{NoopReporter, ProgressEvent, Prompt, RecordingReporter, Reporter};
pub use state::WorkflowState;
