//! LIFO release of everything a run acquired
//!
//! Resources are pushed as they are acquired and released in reverse. Every
//! release is attempted even when an earlier one failed; failures are
//! logged and recorded, never propagated.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::BlobError;
use crate::services::{Container, ContainerManager, DeleteOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    SourceFile,
    DestinationFile,
    ScratchDir,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Container => "container",
            ResourceKind::SourceFile => "source file",
            ResourceKind::DestinationFile => "destination file",
            ResourceKind::ScratchDir => "scratch directory",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    /// Nothing to do, e.g. the file was never written
    AlreadyGone,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupEntry {
    pub kind: ResourceKind,
    pub label: String,
    pub outcome: ReleaseOutcome,
}

/// Per-resource outcome of an unwind, in release order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub entries: Vec<CleanupEntry>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, ReleaseOutcome::Failed(_)))
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<ReleaseOutcome, BlobError>> + Send>;

struct Resource {
    kind: ResourceKind,
    label: String,
    release: ReleaseFn,
}

#[derive(Default)]
pub struct CleanupStack {
    resources: Vec<Resource>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Register a resource with its release action
    pub fn push<F, Fut>(&mut self, kind: ResourceKind, label: impl Into<String>, release: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ReleaseOutcome, BlobError>> + Send + 'static,
    {
        let label = label.into();
        debug!("Tracking {} {}", kind, label);
        self.resources.push(Resource {
            kind,
            label,
            release: Box::new(move || release().boxed()),
        });
    }

    /// Remove a file on release; a missing file is fine
    pub fn push_file(&mut self, kind: ResourceKind, path: PathBuf) {
        let label = path.display().to_string();
        self.push(kind, label, move || async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(ReleaseOutcome::Released),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ReleaseOutcome::AlreadyGone),
                Err(e) => Err(BlobError::local_io(&path, e)),
            }
        });
    }

    /// Remove a directory and whatever is left in it
    pub fn push_dir(&mut self, path: PathBuf) {
        let label = path.display().to_string();
        self.push(ResourceKind::ScratchDir, label, move || async move {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => Ok(ReleaseOutcome::Released),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ReleaseOutcome::AlreadyGone),
                Err(e) => Err(BlobError::local_io(&path, e)),
            }
        });
    }

    /// Delete the container (and its blobs) on release
    pub fn push_container(&mut self, manager: ContainerManager, container: Container) {
        let label = container.name().to_string();
        self.push(ResourceKind::Container, label, move || async move {
            match manager.delete(&container).await? {
                DeleteOutcome::Deleted => Ok(ReleaseOutcome::Released),
                DeleteOutcome::AlreadyAbsent => Ok(ReleaseOutcome::AlreadyGone),
            }
        });
    }

    /// Release everything, newest first
    pub async fn unwind(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        while let Some(resource) = self.resources.pop() {
            let outcome = match (resource.release)().await {
                Ok(outcome) => {
                    debug!("Released {} {}: {:?}", resource.kind, resource.label, outcome);
                    outcome
                }
                Err(e) => {
                    warn!("Failed to release {} {}: {}", resource.kind, resource.label, e);
                    ReleaseOutcome::Failed(e.to_string())
                }
            };
            report.entries.push(CleanupEntry {
                kind: resource.kind,
                label: resource.label,
                outcome,
            });
        }

        report
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            for resource in &self.resources {
                warn!("Leaking {} {}: cleanup never ran", resource.kind, resource.label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryBlobStore, StoreOperation};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn recorder(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        result: Result<ReleaseOutcome, BlobError>,
    ) -> impl FnOnce() -> futures::future::Ready<Result<ReleaseOutcome, BlobError>> + Send + 'static
    {
        let log = log.clone();
        move || {
            log.lock().unwrap().push(name);
            futures::future::ready(result)
        }
    }

    #[tokio::test]
    async fn test_unwind_is_lifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();
        stack.push(ResourceKind::ScratchDir, "dir", recorder(&log, "dir", Ok(ReleaseOutcome::Released)));
        stack.push(ResourceKind::DestinationFile, "dst", recorder(&log, "dst", Ok(ReleaseOutcome::Released)));
        stack.push(ResourceKind::SourceFile, "src", recorder(&log, "src", Ok(ReleaseOutcome::Released)));
        stack.push(ResourceKind::Container, "c", recorder(&log, "c", Ok(ReleaseOutcome::Released)));

        let report = stack.unwind().await;
        assert_eq!(*log.lock().unwrap(), vec!["c", "src", "dst", "dir"]);
        assert_eq!(
            report.kinds(),
            vec![
                ResourceKind::Container,
                ResourceKind::SourceFile,
                ResourceKind::DestinationFile,
                ResourceKind::ScratchDir
            ]
        );
        assert!(report.is_clean());
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();
        stack.push(ResourceKind::SourceFile, "src", recorder(&log, "src", Ok(ReleaseOutcome::Released)));
        stack.push(
            ResourceKind::Container,
            "c",
            recorder(&log, "c", Err(BlobError::Service("403 Forbidden".into()))),
        );

        let report = stack.unwind().await;
        assert_eq!(*log.lock().unwrap(), vec!["c", "src"]);
        assert!(!report.is_clean());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.entries[1].outcome, ReleaseOutcome::Released);
    }

    #[tokio::test]
    async fn test_files_and_dirs() {
        let root = TempDir::new().unwrap();
        let scratch = root.path().join("scratch");
        tokio::fs::create_dir(&scratch).await.unwrap();
        let written = scratch.join("source.txt");
        tokio::fs::write(&written, "Hello, World!").await.unwrap();
        let never_written = scratch.join("destination.txt");

        let mut stack = CleanupStack::new();
        stack.push_dir(scratch.clone());
        stack.push_file(ResourceKind::DestinationFile, never_written);
        stack.push_file(ResourceKind::SourceFile, written.clone());

        let report = stack.unwind().await;
        let outcomes: Vec<_> = report.entries.iter().map(|e| e.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                ReleaseOutcome::Released,
                ReleaseOutcome::AlreadyGone,
                ReleaseOutcome::Released
            ]
        );
        assert!(!written.exists());
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_container_release() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();

        let mut stack = CleanupStack::new();
        stack.push_container(manager.clone(), container.clone());
        let report = stack.unwind().await;

        assert_eq!(report.entries[0].outcome, ReleaseOutcome::Released);
        assert!(store.container_names().is_empty());
        assert!(container.is_released());
    }

    #[tokio::test]
    async fn test_container_release_failure_is_recorded() {
        let store = Arc::new(MemoryBlobStore::new());
        let manager = ContainerManager::new(store.clone());
        let container = manager.create("quickstartblobs").await.unwrap();
        store.fail_next(StoreOperation::DeleteContainer, "network unreachable");

        let mut stack = CleanupStack::new();
        stack.push_container(manager, container);
        let report = stack.unwind().await;

        assert!(matches!(report.entries[0].outcome, ReleaseOutcome::Failed(ref m) if m.contains("network unreachable")));
    }
}
