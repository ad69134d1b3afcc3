//! Credential and group cache for directory backends
//!
//! Entries expire lazily: an entry past its deadline is treated as absent on
//! read but stays in memory until it is overwritten or dropped. There is no
//! background sweeper.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::auth::password::{hash_password, verify_password};
use crate::models::StringSet;

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn live(&self, now: Instant) -> Option<&T> {
        (now < self.expires_at).then_some(&self.value)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    creds: HashMap<String, Expiring<String>>,
    groups: HashMap<String, Expiring<StringSet>>,
}

/// Per-username TTL cache of a password verifier and a group set
///
/// One lock guards both maps. Readers share it; writers are exclusive.
/// Password hashing and verification happen outside the lock.
pub struct CredentialCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<CacheState>,
}

impl CredentialCache {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache that reads time from `clock`
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Remember that `password` is valid for `username`
    ///
    /// Stores a salted Argon2 hash, never the password itself.
    pub fn add_creds(&self, username: &str, password: &str) {
        let verifier = match hash_password(password) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(user = %username, error = %e, "Failed to hash credentials for cache");
                return;
            }
        };

        let entry = Expiring {
            value: verifier,
            expires_at: self.clock.now() + self.ttl,
        };
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.creds.insert(username.to_string(), entry);
    }

    /// Check a username/password pair against an unexpired cache entry
    pub fn check_creds(&self, username: &str, password: &str) -> bool {
        let verifier = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            match state
                .creds
                .get(username)
                .and_then(|e| e.live(self.clock.now()))
            {
                Some(v) => v.clone(),
                None => return false,
            }
        };

        verify_password(password, &verifier)
    }

    /// Forget both credentials and groups for `username`
    pub fn drop_user(&self, username: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.creds.remove(username);
        state.groups.remove(username);
    }

    /// Cache the group set of `username`
    pub fn add_groups(&self, username: &str, groups: StringSet) {
        let entry = Expiring {
            value: groups,
            expires_at: self.clock.now() + self.ttl,
        };
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.groups.insert(username.to_string(), entry);
    }

    /// Cached group set of `username`, if present and unexpired
    pub fn get_groups(&self, username: &str) -> Option<StringSet> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .groups
            .get(username)
            .and_then(|e| e.live(self.clock.now()))
            .cloned()
    }

    /// Number of stored entries, expired ones included
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.creds.len() + state.groups.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
