//! LDAP directory access
//!
//! This module provides:
//! - The `DirectoryConnector` / `DirectoryConnection` transport seam
//! - `DirectoryClient`, which runs the bind/search/rebind protocol over one
//!   shared connection with retry on transient network failures
//! - An `ldap3`-backed transport for real directory servers

pub mod client;
pub mod retry;
pub mod transport;

pub use client::DirectoryClient;
pub use retry::RetryPolicy;
pub use transport::{Ldap3Connection, Ldap3Connector};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AuthError;

/// One entry returned by a directory search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryEntry {
    /// Distinguished name
    pub dn: String,

    /// Attribute values by attribute name
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    /// Add a value for `name`
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.entry(name.into()).or_default().push(value.into());
        self
    }

    /// First value of an attribute, matching the name case-insensitively
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(String::as_str)
    }
}

/// Opens connections to one directory server
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, AuthError>;
}

/// An open directory connection
///
/// Transport failures must surface as `AuthError::Network` so the client
/// can reconnect and retry; a rejected bind surfaces as `BadPassword`.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind; an empty DN and password binds anonymously
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), AuthError>;

    /// Subtree search under `base`
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>, AuthError>;

    /// Release the connection; errors are ignored
    async fn close(&mut self);
}
