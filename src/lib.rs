//! Kura Uploadr Library
//!
//! Direct-to-storage image uploads: clients validate files locally, ask the
//! server for a short-lived presigned POST target, then send the bytes
//! straight to S3-compatible storage.
//!
//! # Features
//!
//! - **Presigned POST**: size and content type enforced by the signed policy
//! - **Sequential batches**: per-file task state with progress and cancellation
//! - **Dimension-carrying keys**: `uploads/<uuid>_<w>x<h>.<ext>`, parsed back
//!   by listings without metadata requests
//! - **S3 Compatible**: AWS S3, MinIO, R2 (path-style URLs)
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
