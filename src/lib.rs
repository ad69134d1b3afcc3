//! authproxy - An authenticating reverse proxy
//!
//! This crate gates upstream HTTP services behind HTTP Basic authentication.
//! Credentials are checked against a static internal user table and any
//! number of LDAP directories, then each destination's allow/deny policy
//! decides whether the request is forwarded.

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod otel;
pub mod server;
