//! blobtrip CLI - blob storage quickstart
//!
//! Creates a container, uploads a file, lists the container, downloads the
//! blob again and deletes everything it created.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use commands::QuickstartCommand;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BLOBTRIP_LOG_LEVEL")]
    log_level: String,

    /// Log format: compact, full
    #[arg(long, default_value = "compact", env = "BLOBTRIP_LOG_FORMAT")]
    log_format: String,

    #[command(flatten)]
    quickstart: QuickstartCommand,
}

fn init_logging(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        // blobtrip crates at the requested level, the AWS stack at warn
        tracing_subscriber::EnvFilter::try_new(format!(
            "blobtrip={level},\
             blobtrip_cli={level},\
             blobtrip_blob={level},\
             blobtrip_config={level},\
             aws_config=warn,\
             aws_sdk_s3=warn,\
             aws_smithy_runtime=warn,\
             hyper=warn,\
             h2=warn,\
             rustls=warn",
            level = log_level
        ))?
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format)?;

    // The command is synchronous and owns its runtime
    cli.quickstart.execute()
}
