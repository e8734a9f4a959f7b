//! Kura Uploadr - direct-to-storage image uploads
//!
//! `serve` runs the presign/listing server; `upload`, `list` and `count` are
//! clients of it and of the configured bucket.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kura_uploadr::config::Config;
use kura_uploadr::s3::{S3Client, S3ClientConfig};
use kura_uploadr::server::Server;
use kura_uploadr::upload::listing::ObjectLister;
use kura_uploadr::upload::orchestrator::UploadCallbacks;
use kura_uploadr::upload::presign::HttpPresignClient;
use kura_uploadr::upload::{
    TransferExecutor, UploadFile, UploadOrchestrator, UploadPolicy, UploadStatus,
    UploadTask,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Kura Uploadr - presigned direct uploads to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "kura-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve,

    /// Upload files through a running server, one after another
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Base URL of the server issuing presigned targets
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server_url: String,
    },

    /// Print one page of stored images as JSON
    List {
        /// Key of the last image of the previous page
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Print the number of stored images
    Count,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so command output on stdout stays parseable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Serve => serve(&args.config).await,
        Command::Upload { files, server_url } => upload(files, &server_url).await,
        Command::List { cursor } => list(&args.config, cursor.as_deref()).await,
        Command::Count => count(&args.config).await,
    }
}

async fn serve(config_path: &Path) -> anyhow::Result<()> {
    info!("Starting Kura Uploadr v{}", kura_uploadr::VERSION);

    let config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!("Loaded configuration from {:?}", config_path);

    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}

async fn upload(paths: Vec<PathBuf>, server_url: &str) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push(file);
    }

    let callbacks = UploadCallbacks {
        on_complete: Some(Arc::new(|task: &UploadTask| {
            info!(file = %task.file_name, url = ?task.url, "Uploaded");
        })),
        on_error: Some(Arc::new(|task: &UploadTask| {
            tracing::warn!(identity = %task.identity(), reason = ?task.error, "Upload failed");
        })),
    };

    let presign = Arc::new(HttpPresignClient::new(server_url)?);
    let orchestrator =
        UploadOrchestrator::new(presign, TransferExecutor::new()?, UploadPolicy::default())
            .with_callbacks(callbacks);

    let tasks = orchestrator.upload_files(files).await;
    println!("{}", serde_json::to_string_pretty(&tasks)?);

    let failed = tasks
        .iter()
        .filter(|task| task.status == UploadStatus::Error)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, tasks.len());
    }
    Ok(())
}

fn lister(config_path: &Path) -> anyhow::Result<ObjectLister> {
    let config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let client = S3Client::new(S3ClientConfig::from_storage(&config.storage)?)?;
    Ok(ObjectLister::new(Arc::new(client), config.listing.page_size))
}

async fn list(config_path: &Path, cursor: Option<&str>) -> anyhow::Result<()> {
    let page = lister(config_path)?.list_images(cursor).await?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

async fn count(config_path: &Path) -> anyhow::Result<()> {
    let count = lister(config_path)?.count_images().await?;
    println!("{}", count);
    Ok(())
}
