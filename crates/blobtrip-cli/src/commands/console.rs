use std::io::{self, Write};

use async_trait::async_trait;
use blobtrip_blob::workflow::ReleaseOutcome;
use blobtrip_blob::{ProgressEvent, Prompt, Reporter};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Prints progress as status lines and, in interactive mode, waits for
/// Enter at each prompt
pub struct ConsoleReporter {
    interactive: bool,
    cancel: CancellationToken,
}

impl ConsoleReporter {
    pub fn new(interactive: bool, cancel: CancellationToken) -> Self {
        Self {
            interactive,
            cancel,
        }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent) {
        if let Some(line) = render(event) {
            println!("{}", line);
        }
    }

    async fn acknowledge(&self, prompt: Prompt) {
        if !self.interactive {
            return;
        }

        let text = match prompt {
            Prompt::BeforeCleanup => "Press Enter to delete the sample files and example container.",
            Prompt::BeforeExit => "Press Enter to exit the sample application.",
        };
        print!("{} ", text.bright_white().bold());
        let _ = io::stdout().flush();

        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().read_line(&mut line).map(|_| ())
        });

        // Ctrl+C stops waiting so cleanup can start right away
        tokio::select! {
            result = read => debug!("Prompt acknowledged: {:?}", result),
            _ = self.cancel.cancelled() => println!(),
        }
    }
}

fn render(event: &ProgressEvent) -> Option<String> {
    let line = match event {
        ProgressEvent::Staged { source, .. } => format!("Temp file = {}", source.display()),
        ProgressEvent::ContainerCreated { uri, .. } => {
            format!("Created container '{}'\n", uri.bright_cyan())
        }
        ProgressEvent::AccessPolicySet { .. } => "Blobs in the container are now publicly readable".to_string(),
        ProgressEvent::UploadStarted { blob, .. } => {
            format!("Uploading to blob storage as blob '{}'", blob.bright_cyan())
        }
        ProgressEvent::UploadFinished { size, .. } => {
            format!("{} ({} bytes)\n", "Uploaded successfully!".bright_green(), size)
        }
        ProgressEvent::ListingStarted { .. } => "Listing blobs in container.".to_string(),
        ProgressEvent::BlobListed { name, .. } => format!("  {}", name),
        ProgressEvent::DownloadStarted { destination, .. } => {
            format!("\nDownloading blob to {}", destination.display())
        }
        ProgressEvent::DownloadFinished { bytes, .. } => {
            format!("{} ({} bytes)\n", "Downloaded successfully!".bright_green(), bytes)
        }
        ProgressEvent::Failed { message } => message.bright_red().to_string(),
        ProgressEvent::CleanupStarted => {
            "Deleting the container, any blobs it contains and the local files".to_string()
        }
        ProgressEvent::ResourceReleased {
            kind,
            label,
            outcome,
        } => match outcome {
            ReleaseOutcome::Released => format!("  removed {} {}", kind, label),
            ReleaseOutcome::AlreadyGone => return None,
            ReleaseOutcome::Failed(reason) => format!(
                "  {} {} {}: {}",
                "could not remove".bright_yellow(),
                kind,
                label,
                reason
            ),
        },
        ProgressEvent::CleanupFinished { clean } => {
            if *clean {
                "Cleanup finished.\n".to_string()
            } else {
                format!("{}\n", "Cleanup finished with errors.".bright_yellow())
            }
        }
    };
    Some(line)
}
