//! Progress events emitted by a quickstart run

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use super::cleanup::{ReleaseOutcome, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Local files reserved in the scratch directory
    Staged {
        source: PathBuf,
        destination: PathBuf,
    },
    ContainerCreated {
        name: String,
        uri: String,
    },
    AccessPolicySet {
        container: String,
    },
    UploadStarted {
        source: PathBuf,
        blob: String,
    },
    UploadFinished {
        blob: String,
        size: u64,
    },
    ListingStarted {
        container: String,
    },
    BlobListed {
        name: String,
        uri: String,
    },
    DownloadStarted {
        blob: String,
        destination: PathBuf,
    },
    DownloadFinished {
        destination: PathBuf,
        bytes: u64,
    },
    Failed {
        message: String,
    },
    CleanupStarted,
    ResourceReleased {
        kind: ResourceKind,
        label: String,
        outcome: ReleaseOutcome,
    },
    CleanupFinished {
        clean: bool,
    },
}

/// Points where an interactive reporter may hold the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    BeforeCleanup,
    BeforeExit,
}

/// Receives progress from a run
#[async_trait]
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);

    /// Wait for the user, if there is one. Returns immediately by default.
    async fn acknowledge(&self, _prompt: Prompt) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

#[async_trait]
impl Reporter for NoopReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Keeps every event and prompt, in order
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    fn report(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }

    async fn acknowledge(&self, prompt: Prompt) {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_reporter() {
        let reporter = RecordingReporter::new();
        reporter.report(&ProgressEvent::CleanupStarted);
        reporter.acknowledge(Prompt::BeforeExit).await;

        assert_eq!(reporter.events(), vec![ProgressEvent::CleanupStarted]);
        assert_eq!(reporter.prompts(), vec![Prompt::BeforeExit]);
    }

    #[tokio::test]
    async fn test_noop_acknowledge_returns() {
        NoopReporter.acknowledge(Prompt::BeforeCleanup).await;
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(ProgressEvent::UploadFinished {
            blob: "a.txt".into(),
            size: 13,
        })
        .unwrap();
        assert_eq!(json["event"], "upload_finished");
        assert_eq!(json["size"], 13);
    }
}
