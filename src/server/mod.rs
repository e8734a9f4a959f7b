//! HTTP server module
//!
//! A small hyper server exposing the presign endpoint, server-side uploads,
//! image listings, health and metrics.
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | `POST` | `/api/uploads/presign` | issue a presigned POST target |
//! | `PUT` | `/api/uploads/<file name>` | server-side upload |
//! | `GET` | `/api/images?cursor=<key>` | one page of images, newest first |
//! | `GET` | `/api/images/count` | number of stored images |
//! | `GET` | `/health` | liveness, returns `ok` |
//! | `GET` | `/metrics` | Prometheus text format |
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::config::Config;
//! use kura_uploadr::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod handlers;

use crate::config::Config;
use crate::s3::{S3Client, S3ClientConfig, S3ClientError};
use crate::upload::listing::ObjectLister;
use crate::upload::put_object::ServerUploader;
use crate::upload::PresignService;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Storage setup failed: {0}")]
    StorageError(#[from] S3ClientError),
}

/// Components shared by every request
pub struct AppState {
    pub presign: PresignService,
    pub uploader: ServerUploader,
    pub lister: ObjectLister,
    pub metrics_enabled: bool,
}

impl AppState {
    /// Construct the storage client once and hand it to each component
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let client = Arc::new(S3Client::new(S3ClientConfig::from_storage(
            &config.storage,
        )?)?);
        let policy = config.upload.policy();

        Ok(Self {
            presign: PresignService::new(
                Arc::clone(&client),
                policy.clone(),
                config.upload.presign_expiry(),
            ),
            uploader: ServerUploader::new(Arc::clone(&client), policy),
            lister: ObjectLister::new(client, config.listing.page_size),
            metrics_enabled: config.metrics.enabled,
        })
    }
}

/// HTTP server, bound on construction
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to `server.address` and build the shared state.
    ///
    /// Port 0 lets the OS pick a port; see [`Server::local_addr`].
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let state = Arc::new(AppState::from_config(&config)?);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(
            address = %local_addr,
            bucket = %config.storage.bucket,
            "Server bound"
        );

        Ok(Self {
            state,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes.
    ///
    /// Each connection runs in its own task; a failing connection is logged
    /// and never stops the accept loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handlers::handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
