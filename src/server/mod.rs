//! HTTP server module
//!
//! Wires configuration, the metrics endpoint and the gateway together and
//! runs until Ctrl-C.

use crate::config::Config;
use crate::metrics::server::MetricsServer;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

pub mod gateway;

pub use gateway::{AppState, GatewayServer};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Gateway process
pub struct Server {
    config: Config,
    addr: SocketAddr,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("{}", e)))?;

        Ok(Self { config, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let mut metrics_server = if self.config.metrics.enabled {
            let mut server = MetricsServer::builder()
                .port(self.config.metrics.port)
                .build()
                .map_err(|e| ServerError::RuntimeError(e.to_string()))?;
            server
                .start()
                .await
                .map_err(|e| ServerError::BindError(e.to_string()))?;
            Some(server)
        } else {
            None
        };

        let gateway = GatewayServer::bind(AppState::from_config(self.config)).await?;

        let shutdown = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        };
        let result = gateway.run_until(shutdown).await;

        if let Some(ref mut server) = metrics_server {
            server.shutdown().await;
        }

        info!("Shutting down server");
        result
    }
}
