//! HTTP router for authproxy
//!
//! There are no fixed routes: every path on every host is handled by the
//! proxy entry point, which picks the destination from the Host header.

use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthenticationEngine;
use crate::config::Config;

use super::host_router::HostRouter;
use super::middleware::{logging_middleware, tracing_middleware};
use super::proxy::proxy_handler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration, never mutated after startup
    pub config: Arc<Config>,

    /// Destination lookup
    pub router: HostRouter,

    /// Authentication backends and policy
    pub engine: Arc<AuthenticationEngine>,

    /// Client used for upstream requests
    pub client: reqwest::Client,
}

impl AppState {
    /// Build state from a configuration and an engine
    pub fn new(config: Arc<Config>, engine: Arc<AuthenticationEngine>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            router: HostRouter::new(Arc::clone(&config)),
            config,
            engine,
            client,
        })
    }
}

/// Build the main application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(tracing_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::config::{HostConfig, InternalUser};
    use base64::Engine;
    use std::net::SocketAddr;

    fn create_test_state(upstream: &str) -> AppState {
        let mut config = Config::default();
        config.internal_users = vec![InternalUser {
            username: "alice".to_string(),
            password: hash_password("alice-pw").unwrap(),
            groups: vec![],
        }];
        let mut host = HostConfig::new(["a.example.com"], upstream).unwrap();
        host.allow_users = vec!["alice".to_string()];
        host.auth_realm = "Team A".to_string();
        config.hosts = vec![host];

        let config = Arc::new(config);
        let engine = Arc::new(AuthenticationEngine::from_config(&config));
        AppState::new(config, engine).unwrap()
    }

    async fn serve(state: AppState) -> SocketAddr {
        let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn basic(user: &str, password: &str) -> String {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
        format!("Basic {}", encoded)
    }

    // Test 1: unknown host is 404 on any path
    #[tokio::test]
    async fn test_unknown_host_not_found() {
        let addr = serve(create_test_state("http://127.0.0.1:9")).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/anything/at/all", addr))
            .header("Host", "b.example.com")
            .header("Authorization", basic("alice", "alice-pw"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
    }

    // Test 2: missing credentials get the host's realm
    #[tokio::test]
    async fn test_missing_credentials_challenge() {
        let addr = serve(create_test_state("http://127.0.0.1:9")).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/", addr))
            .header("Host", "a.example.com")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(
            response.headers().get("www-authenticate").unwrap(),
            "Basic realm=\"Team A\""
        );
        assert_eq!(response.text().await.unwrap(), "Authentication failed");
    }

    // Test 3: authorized request to a dead upstream is 502
    #[tokio::test]
    async fn test_unreachable_upstream_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead = listener.local_addr().unwrap();
        drop(listener);

        let addr = serve(create_test_state(&format!("http://{}", dead))).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/", addr))
            .header("Host", "a.example.com")
            .header("Authorization", basic("alice", "alice-pw"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 502);
    }
}
