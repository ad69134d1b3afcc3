//! Static user table backend

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::InternalUser;
use crate::error::AuthError;
use crate::models::StringSet;

use super::password::verify_password;
use super::Authenticator;

struct Entry {
    verifier: String,
    groups: StringSet,
}

/// Confirms credentials against users defined in the configuration
pub struct InternalAuthenticator {
    users: HashMap<String, Entry>,
}

impl InternalAuthenticator {
    pub fn new(users: &[InternalUser]) -> Self {
        let users = users
            .iter()
            .map(|u| {
                (
                    u.username.clone(),
                    Entry {
                        verifier: u.password.clone(),
                        groups: u.groups.iter().cloned().collect(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl Authenticator for InternalAuthenticator {
    fn name(&self) -> &str {
        "internal"
    }

    async fn check_password(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let entry = self.users.get(username).ok_or(AuthError::UserNotFound)?;
        if verify_password(password, &entry.verifier) {
            Ok(())
        } else {
            Err(AuthError::BadPassword)
        }
    }

    async fn get_groups(&self, username: &str) -> Result<StringSet, AuthError> {
        self.users
            .get(username)
            .map(|e| e.groups.clone())
            .ok_or(AuthError::UserNotFound)
    }
}
