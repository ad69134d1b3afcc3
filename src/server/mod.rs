//! HTTP server components for authproxy
//!
//! This module provides the HTTP server infrastructure including:
//! - Host-based destination lookup
//! - The authenticating proxy entry point and forwarding hook
//! - Logging and tracing middleware
//! - Server lifecycle management

pub mod host_router;
pub mod middleware;
pub mod proxy;
pub mod router;

pub use host_router::HostRouter;
pub use proxy::{forward_request, proxy_handler};
pub use router::{build_router, AppState};

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

/// HTTP Server for authproxy
///
/// Manages the axum server lifecycle, including:
/// - Binding to the configured address
/// - Applying middleware layers
/// - Graceful shutdown handling
pub struct Server {
    listen_address: String,
    port: u16,
    state: AppState,
}

impl Server {
    /// Create a server listening on the configured address and HTTP port
    pub fn new(state: AppState) -> Self {
        Self {
            listen_address: state.config.listen_address.clone(),
            port: state.config.http_port,
            state,
        }
    }

    /// Override the listening port (0 lets the OS choose)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.listen_address.parse().unwrap_or([0, 0, 0, 0].into()),
            self.port,
        )
    }

    /// Run the server until shutdown signal is received
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Future that resolves when the server should shut down
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind_addr())
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        self.run_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn run_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        let app = build_router(self.state)
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Failed to build shared state
    #[error("Initialization error: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticationEngine;
    use crate::config::Config;
    use std::sync::Arc;
    use std::time::Duration;

    fn create_test_state(config: Config) -> AppState {
        let config = Arc::new(config);
        let engine = Arc::new(AuthenticationEngine::from_config(&config));
        AppState::new(config, engine).unwrap()
    }

    // Test 1: Server uses the configured port
    #[test]
    fn test_server_new() {
        let server = Server::new(create_test_state(Config::default()));
        assert_eq!(server.bind_addr().port(), 8080);
    }

    // Test 2: Server bind address calculation
    #[test]
    fn test_server_bind_addr() {
        let config = Config {
            listen_address: "127.0.0.1".to_string(),
            http_port: 9090,
            ..Default::default()
        };
        let server = Server::new(create_test_state(config));
        assert_eq!(server.bind_addr().to_string(), "127.0.0.1:9090");

        let server = server.with_port(0);
        assert_eq!(server.bind_addr().port(), 0);
    }

    // Test 3: Server graceful shutdown
    #[tokio::test]
    async fn test_server_graceful_shutdown() {
        let config = Config {
            listen_address: "127.0.0.1".to_string(),
            http_port: 0,
            ..Default::default()
        };
        let server = Server::new(create_test_state(config));

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        };

        let handle = tokio::spawn(async move { server.run(shutdown).await });

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    // Test 4: ServerError display messages
    #[test]
    fn test_server_error_display() {
        let bind_err = ServerError::Bind("address in use".to_string());
        assert_eq!(
            bind_err.to_string(),
            "Failed to bind to address: address in use"
        );

        let serve_err = ServerError::Serve("connection reset".to_string());
        assert_eq!(serve_err.to_string(), "Server error: connection reset");
    }
}
