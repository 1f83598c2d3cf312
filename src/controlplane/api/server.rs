//! API Server
//!
//! Serves the REST facade and shuts it down gracefully.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::rest::RestRouter;
use crate::controlplane::Orchestrator;

// =============================================================================
// Server Configuration
// =============================================================================

/// Default REST API bind address
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:8090";

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server
pub struct ApiServer {
    config: ApiServerConfig,
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
}

impl ApiServer {
    /// Create a new API server. Cancelling `shutdown` stops the listener and
    /// every operation still in flight.
    pub fn new(
        config: ApiServerConfig,
        orchestrator: Arc<Orchestrator>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            orchestrator,
            shutdown,
        }
    }

    /// Run until shutdown
    pub async fn run(&self) -> Result<()> {
        let app = RestRouter::new(self.orchestrator.clone(), self.shutdown.clone()).build();

        let listener = tokio::net::TcpListener::bind(self.config.rest_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

        info!("REST API listening on {}", self.config.rest_addr);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
