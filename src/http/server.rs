//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::router;
use crate::error::{QuotaError, Result};
use crate::ratelimit::TokenBucketLimiter;

/// HTTP server for the quota service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The limiter instance
    limiter: Arc<TokenBucketLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, limiter: Arc<TokenBucketLimiter>) -> Self {
        Self { addr, limiter }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        Self::serve_listener(listener, self.limiter, signal).await
    }

    /// Serve on an already bound listener, e.g. one on an ephemeral port.
    pub async fn serve_listener<F>(
        listener: TcpListener,
        limiter: Arc<TokenBucketLimiter>,
        signal: F,
    ) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, router(limiter))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                QuotaError::Server(e.to_string())
            })
    }
}
