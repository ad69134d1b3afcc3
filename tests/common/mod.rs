//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use authproxy::auth::{hash_password, AuthenticationEngine};
use authproxy::config::{Config, HostConfig, InternalUser};
use authproxy::server::{AppState, Server};
use base64::Engine;

/// Internal user with an Argon2 verifier for `password`
pub fn internal_user(username: &str, password: &str, groups: &[&str]) -> InternalUser {
    InternalUser {
        username: username.to_string(),
        password: hash_password(password).expect("Failed to hash password"),
        groups: groups.iter().map(|g| g.to_string()).collect(),
    }
}

/// Destination served at `hostname` and forwarded to `upstream`
pub fn host(hostname: &str, upstream: &str) -> HostConfig {
    HostConfig::new([hostname], upstream).expect("Invalid host config")
}

/// Configuration with alice (eng) and bob (contractors) as internal users
/// and `a.example.com` open to alice only
pub fn create_test_config(upstream: &str) -> Config {
    let mut a = host("a.example.com", upstream);
    a.allow_users = vec!["alice".to_string()];

    Config {
        listen_address: "127.0.0.1".to_string(),
        http_port: 0,
        internal_users: vec![
            internal_user("alice", "alice-pw", &["eng"]),
            internal_user("bob", "bob-pw", &["contractors"]),
        ],
        hosts: vec![a],
        ..Default::default()
    }
}

/// Create a test application state
pub fn create_test_state(config: Config) -> AppState {
    let config = Arc::new(config);
    let engine = Arc::new(AuthenticationEngine::from_config(&config));
    AppState::new(config, engine).expect("Failed to build state")
}

/// `Authorization` header value for HTTP Basic credentials
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let server = Server::new(state);
    tokio::spawn(async move {
        server
            .run_on(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}
