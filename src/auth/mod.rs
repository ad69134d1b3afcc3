//! Authentication system for authproxy
//!
//! This module provides authentication and authorization functionality:
//! - The `Authenticator` capability shared by every identity backend
//! - A static internal user table
//! - LDAP directory backends with a credential/group cache
//! - The engine that chains backends and evaluates host access policy

pub mod cache;
pub mod engine;
pub mod internal;
pub mod ldap;
pub mod password;

pub use cache::{Clock, CredentialCache, SystemClock};
pub use engine::AuthenticationEngine;
pub use internal::InternalAuthenticator;
pub use ldap::LdapAuthenticator;
pub use password::{hash_password, verify_password, HashError};

use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::StringSet;

/// An identity source that can confirm a password and report groups
///
/// Backends are constructed once at startup and shared across requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Succeeds only if this backend vouches for the pair
    async fn check_password(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Groups of a user this backend knows
    async fn get_groups(&self, username: &str) -> Result<StringSet, AuthError>;
}
