//! HTTP server implementation.
//!
//! This module provides the main [`RunnerServer`] struct for running
//! the faas-runner HTTP server.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use faas_runner_common::{RunnerError, ServerConfigFile};

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server.
    pub bind_addr: SocketAddr,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable graceful shutdown on SIGTERM/SIGINT.
    pub graceful_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            request_timeout_secs: 60,
            graceful_shutdown: true,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` section of a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_addr` is not a socket address.
    pub fn from_file(file: &ServerConfigFile) -> Result<Self, RunnerError> {
        let bind_addr = file.bind_addr.parse().map_err(|e| {
            RunnerError::invalid_config(format!("Invalid bind_addr '{}': {e}", file.bind_addr))
        })?;
        Ok(Self {
            bind_addr,
            request_timeout_secs: file.request_timeout_secs,
            graceful_shutdown: file.graceful_shutdown,
        })
    }

    /// Create a new server config with custom bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Get the request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// faas-runner HTTP server.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
///
/// use faas_runner_common::RuntimeConfig;
/// use faas_runner_core::DockerCliBackend;
/// use faas_runner_server::{AppState, RunnerServer, ServerConfig};
///
/// let runtime_config = RuntimeConfig::default();
/// let state = AppState::in_memory(&runtime_config, Arc::new(DockerCliBackend::default()))?;
/// state.coordinator().spawn_warm_up();
///
/// RunnerServer::new(state, ServerConfig::default()).run().await?;
/// ```
pub struct RunnerServer {
    state: AppState,
    config: ServerConfig,
}

impl RunnerServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    /// Run the server until shutdown.
    ///
    /// This will block until the server is shut down via signal
    /// (SIGTERM/SIGINT) if graceful shutdown is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the address.
    pub async fn run(self) -> Result<(), RunnerError> {
        let app = build_router(self.state, self.config.request_timeout());

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| RunnerError::invalid_config(format!("Failed to bind: {e}")))?;

        info!(addr = %self.config.bind_addr, "Starting HTTP server");

        if self.config.graceful_shutdown {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        } else {
            axum::serve(listener, app).await?;
        }

        info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an ephemeral local port until the returned handle is shut
    /// down.
    pub async fn start_test(state: AppState) -> Result<TestHandle, RunnerError> {
        let app = build_router(state, Duration::from_secs(30));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(TestHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }
}

/// Running test server.
pub struct TestHandle {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestHandle {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.request_timeout_secs, 60);
        assert!(config.graceful_shutdown);
    }

    #[test]
    fn test_bind_addr_override() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let config = ServerConfig::default().with_bind_addr(addr);

        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_server_config_from_file() {
        let file = ServerConfigFile {
            bind_addr: "127.0.0.1:7000".into(),
            request_timeout_secs: 10,
            graceful_shutdown: false,
        };
        let config = ServerConfig::from_file(&file).unwrap();
        assert_eq!(config.bind_addr.port(), 7000);
        assert!(!config.graceful_shutdown);

        let bad = ServerConfigFile {
            bind_addr: "not-an-addr".into(),
            ..file
        };
        assert!(matches!(
            ServerConfig::from_file(&bad),
            Err(RunnerError::InvalidConfig { .. })
        ));
    }
}
