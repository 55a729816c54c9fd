use std::process::ExitCode;
use std::sync::Arc;

use blobtrip_blob::services::DEFAULT_CONTAINER_BASE;
use blobtrip_blob::workflow::DEFAULT_SOURCE_CONTENT;
use blobtrip_blob::{Quickstart, QuickstartOptions, WorkflowError, WorkflowReport};
use blobtrip_config::{ConnectionResolver, EnvConfigProvider, DEFAULT_CONNECTION_ENV};
use clap::Args;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::console::ConsoleReporter;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIGURATION: u8 = 2;
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Args)]
pub struct QuickstartCommand {
    /// Wait for Enter before cleaning up and before exiting
    #[arg(long, env = "BLOBTRIP_INTERACTIVE")]
    pub interactive: bool,

    /// Container base name; a UUID is appended
    #[arg(long, default_value = DEFAULT_CONTAINER_BASE)]
    pub container_prefix: String,

    /// Text written to the uploaded file
    #[arg(long, default_value = DEFAULT_SOURCE_CONTENT)]
    pub content: String,

    /// Environment variable holding the connection string
    #[arg(long, default_value = DEFAULT_CONNECTION_ENV)]
    pub connection_env: String,

    /// Skip checking that the container is gone after cleanup
    #[arg(long)]
    pub no_verify: bool,
}

impl QuickstartCommand {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        println!("{}", "Blob storage quickstart".bright_white().bold());
        println!();

        let cancel = CancellationToken::new();
        let resolver = ConnectionResolver::new(Arc::new(EnvConfigProvider), &self.connection_env);
        let options = QuickstartOptions::default()
            .with_container_base(&self.container_prefix)
            .with_content(&self.content)
            .with_verify_teardown(!self.no_verify);
        let quickstart = Quickstart::new(resolver)
            .with_options(options)
            .with_cancellation(cancel.clone())
            .with_reporter(Arc::new(ConsoleReporter::new(
                self.interactive,
                cancel.clone(),
            )));

        let rt = tokio::runtime::Runtime::new()?;
        rt.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received Ctrl+C, cancelling and cleaning up...");
                cancel.cancel();
            }
        });

        let report = rt.block_on(quickstart.run());
        // An unanswered stdin prompt must not keep the process alive
        rt.shutdown_background();

        print_summary(&report, &self.connection_env);
        let code = exit_code(report.error.as_ref());
        debug!("Exiting with code {}", code);
        Ok(ExitCode::from(code))
    }
}

fn print_summary(report: &WorkflowReport, connection_env: &str) {
    match &report.error {
        None => {
            println!("{}", "Quickstart completed.".bright_green().bold());
        }
        Some(WorkflowError::ConfigurationAbsent { .. }) => {
            println!(
                "{}",
                "A connection string has not been defined in the environment.".bright_yellow()
            );
            println!(
                "Set {} and run the sample again, for example:",
                connection_env.bright_cyan()
            );
            println!(
                "  {}",
                format!(
                    "{}=\"Endpoint=http://localhost:9000;AccessKeyId=...;SecretAccessKey=...\"",
                    connection_env
                )
                .bright_white()
            );
            println!(
                "  {}",
                format!("{}=\"Provider=memory\"", connection_env).bright_white()
            );
        }
        Some(e) => {
            println!("{} {}", "Quickstart failed:".bright_red().bold(), e);
        }
    }

    if !report.cleanup.is_clean() {
        for entry in report.cleanup.failures() {
            println!(
                "{} {} {} was not removed",
                "warning:".bright_yellow().bold(),
                entry.kind,
                entry.label
            );
        }
    }
    if report.container_removed == Some(false) {
        if let Some(name) = &report.container {
            println!(
                "{} container {} still exists",
                "warning:".bright_yellow().bold(),
                name
            );
        }
    }
}

/// Process exit status for a finished run
pub fn exit_code(error: Option<&WorkflowError>) -> u8 {
    match error {
        None => 0,
        Some(WorkflowError::ConfigurationAbsent { .. } | WorkflowError::Configuration(_)) => {
            EXIT_CONFIGURATION
        }
        Some(WorkflowError::Cancelled) => EXIT_CANCELLED,
        Some(WorkflowError::Service(_) | WorkflowError::LocalIo(_)) => EXIT_FAILURE,
    }
}
