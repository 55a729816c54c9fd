//! The quickstart round trip: create a container, upload a file, list the
//! container, download the blob, then tear everything down again.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use blobtrip_config::ConnectionResolver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cleanup::{CleanupReport, CleanupStack, ResourceKind};
use super::error::WorkflowError;
use super::options::{destination_file_name, QuickstartOptions};
use super::progress::{NoopReporter, ProgressEvent, Prompt, Reporter};
use super::state::WorkflowState;
use crate::error::BlobError;
use crate::services::{
    BlobDescriptor, BlobEnumerator, BlobInfo, BlobStore, BlobStoreFactory, BlobTransfer,
    ContainerManager,
};

/// Everything a run did, including how cleanup went
#[derive(Debug)]
pub struct WorkflowReport {
    /// Furthest forward state reached before cleanup
    pub reached: WorkflowState,
    /// `Done` or `Failed`
    pub terminal: WorkflowState,
    pub container: Option<String>,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub uploaded: Option<BlobInfo>,
    pub listed: Vec<BlobDescriptor>,
    pub downloaded_bytes: Option<u64>,
    pub cleanup: CleanupReport,
    /// Result of the post-cleanup existence check; `None` when skipped
    pub container_removed: Option<bool>,
    pub error: Option<WorkflowError>,
}

impl WorkflowReport {
    fn new() -> Self {
        Self {
            reached: WorkflowState::Init,
            terminal: WorkflowState::Init,
            container: None,
            source: None,
            destination: None,
            uploaded: None,
            listed: Vec::new(),
            downloaded_bytes: None,
            cleanup: CleanupReport::default(),
            container_removed: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.terminal == WorkflowState::Done
    }
}

struct Staged {
    source: PathBuf,
    source_name: String,
    destination: PathBuf,
}

/// One-shot quickstart workflow
pub struct Quickstart {
    resolver: ConnectionResolver,
    options: QuickstartOptions,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
    store: Option<Arc<dyn BlobStore>>,
}

impl Quickstart {
    pub fn new(resolver: ConnectionResolver) -> Self {
        Self {
            resolver,
            options: QuickstartOptions::default(),
            reporter: Arc::new(NoopReporter),
            cancel: CancellationToken::new(),
            store: None,
        }
    }

    pub fn with_options(mut self, options: QuickstartOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use this store instead of building one from the connection string.
    /// The connection string must still resolve.
    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the workflow. Cleanup always runs, whatever happened before it,
    /// and is not cancellable.
    pub async fn run(&self) -> WorkflowReport {
        let mut report = WorkflowReport::new();
        let mut stack = CleanupStack::new();
        let mut store = None;

        let outcome = self.forward(&mut report, &mut stack, &mut store).await;
        if let Err(ref e) = outcome {
            error!("Quickstart failed after reaching {}: {}", report.reached, e);
            self.reporter.report(&ProgressEvent::Failed {
                message: e.to_string(),
            });
        }

        if !stack.is_empty() {
            self.reporter.acknowledge(Prompt::BeforeCleanup).await;
            self.reporter.report(&ProgressEvent::CleanupStarted);
            debug!("Entering {}", WorkflowState::CleaningUp);

            report.cleanup = stack.unwind().await;
            for entry in &report.cleanup.entries {
                self.reporter.report(&ProgressEvent::ResourceReleased {
                    kind: entry.kind,
                    label: entry.label.clone(),
                    outcome: entry.outcome.clone(),
                });
            }
            self.reporter.report(&ProgressEvent::CleanupFinished {
                clean: report.cleanup.is_clean(),
            });
        }

        if self.options.verify_teardown {
            if let (Some(store), Some(name)) = (store, report.container.as_deref()) {
                match ContainerManager::new(store).exists(name).await {
                    Ok(exists) => {
                        if exists {
                            warn!("Container {} still exists after cleanup", name);
                        }
                        report.container_removed = Some(!exists);
                    }
                    Err(e) => warn!("Could not verify that container {} is gone: {}", name, e),
                }
            }
        }

        report.error = outcome.err();
        report.terminal = if report.error.is_some() {
            WorkflowState::Failed
        } else {
            WorkflowState::Done
        };
        info!("Quickstart finished: {}", report.terminal);

        self.reporter.acknowledge(Prompt::BeforeExit).await;
        report
    }

    async fn forward(
        &self,
        report: &mut WorkflowReport,
        stack: &mut CleanupStack,
        store_slot: &mut Option<Arc<dyn BlobStore>>,
    ) -> Result<(), WorkflowError> {
        let descriptor =
            self.resolver
                .resolve()?
                .ok_or_else(|| WorkflowError::ConfigurationAbsent {
                    key: self.resolver.key().to_string(),
                })?;

        let store = match &self.store {
            Some(store) => store.clone(),
            None => BlobStoreFactory::from_descriptor(&descriptor).await?,
        };
        info!("Using {} blob store", store.kind());
        *store_slot = Some(store.clone());

        let manager = ContainerManager::new(store.clone());
        let transfer = BlobTransfer::new(store.clone());
        let enumerator =
            BlobEnumerator::new(store).with_options(self.options.list_options.clone());

        self.ensure_not_cancelled()?;
        let staged = self.stage(report, stack).await?;

        // Creation is not raced against cancellation: a container created
        // remotely must always end up on the cleanup stack.
        self.ensure_not_cancelled()?;
        let container = manager.create(&self.options.container_base).await?;
        stack.push_container(manager.clone(), container.clone());
        report.container = Some(container.name().to_string());
        self.advance(report, WorkflowState::ContainerCreated);
        self.reporter.report(&ProgressEvent::ContainerCreated {
            name: container.name().to_string(),
            uri: container.uri().to_string(),
        });

        self.cancellable(manager.set_public_read_access(&container))
            .await??;
        self.advance(report, WorkflowState::PolicySet);
        self.reporter.report(&ProgressEvent::AccessPolicySet {
            container: container.name().to_string(),
        });

        self.reporter.report(&ProgressEvent::UploadStarted {
            source: staged.source.clone(),
            blob: staged.source_name.clone(),
        });
        let info = self
            .cancellable(transfer.upload(&container, &staged.source, Some(&staged.source_name)))
            .await??;
        self.reporter.report(&ProgressEvent::UploadFinished {
            blob: info.name.clone(),
            size: info.size,
        });
        report.uploaded = Some(info.clone());
        self.advance(report, WorkflowState::Uploaded);

        self.reporter.report(&ProgressEvent::ListingStarted {
            container: container.name().to_string(),
        });
        let mut pager = enumerator.list_all(&container);
        while let Some(item) = self.cancellable(pager.next()).await? {
            let blob = item?;
            self.reporter.report(&ProgressEvent::BlobListed {
                name: blob.name.clone(),
                uri: blob.uri.clone(),
            });
            report.listed.push(blob);
        }
        self.advance(report, WorkflowState::Listed);

        self.reporter.report(&ProgressEvent::DownloadStarted {
            blob: info.name.clone(),
            destination: staged.destination.clone(),
        });
        let bytes = self
            .cancellable(transfer.download(&container, &info.name, &staged.destination))
            .await??;
        report.downloaded_bytes = Some(bytes);
        self.reporter.report(&ProgressEvent::DownloadFinished {
            destination: staged.destination,
            bytes,
        });
        self.advance(report, WorkflowState::Downloaded);

        Ok(())
    }

    /// Create the scratch directory and source file. The destination path is
    /// tracked before anything is written so a partial download is removed.
    async fn stage(
        &self,
        report: &mut WorkflowReport,
        stack: &mut CleanupStack,
    ) -> Result<Staged, WorkflowError> {
        let scratch = self
            .options
            .scratch_root()
            .join(format!("blobtrip-{}", Uuid::new_v4()));
        tokio::fs::create_dir(&scratch)
            .await
            .map_err(|e| BlobError::local_io(&scratch, e))?;
        stack.push_dir(scratch.clone());

        let source_name = self.options.source_file_name();
        let destination = scratch.join(destination_file_name(&source_name));
        stack.push_file(ResourceKind::DestinationFile, destination.clone());

        let source = scratch.join(&source_name);
        stack.push_file(ResourceKind::SourceFile, source.clone());
        tokio::fs::write(&source, self.options.content.as_bytes())
            .await
            .map_err(|e| BlobError::local_io(&source, e))?;
        info!("Temp file = {}", source.display());

        report.source = Some(source.clone());
        report.destination = Some(destination.clone());
        self.reporter.report(&ProgressEvent::Staged {
            source: source.clone(),
            destination: destination.clone(),
        });

        Ok(Staged {
            source,
            source_name,
            destination,
        })
    }

    fn advance(&self, report: &mut WorkflowReport, state: WorkflowState) {
        debug!("{} -> {}", report.reached, state);
        report.reached = state;
    }

    fn ensure_not_cancelled(&self) -> Result<(), WorkflowError> {
        if self.cancel.is_cancelled() {
            Err(WorkflowError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, WorkflowError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            out = fut => Ok(out),
        }
    }
}
