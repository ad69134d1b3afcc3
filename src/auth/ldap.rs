//! LDAP directory backend

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::LdapConfig;
use crate::directory::DirectoryClient;
use crate::error::AuthError;
use crate::models::StringSet;

use super::cache::CredentialCache;
use super::Authenticator;

/// Authenticates against one directory server, fronted by a TTL cache
pub struct LdapAuthenticator {
    name: String,
    client: DirectoryClient,
    cache: Option<CredentialCache>,
}

impl LdapAuthenticator {
    pub fn from_config(config: &LdapConfig) -> Self {
        Self::new(config, DirectoryClient::from_config(config))
    }

    /// Wrap an existing client; `cache_seconds == 0` disables caching
    pub fn new(config: &LdapConfig, client: DirectoryClient) -> Self {
        let cache = (config.cache_seconds > 0)
            .then(|| CredentialCache::new(Duration::from_secs(config.cache_seconds)));
        Self::with_cache(client, cache)
    }

    pub fn with_cache(client: DirectoryClient, cache: Option<CredentialCache>) -> Self {
        Self {
            name: format!("ldap:{}", client.url()),
            client,
            cache,
        }
    }
}

#[async_trait]
impl Authenticator for LdapAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_password(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if let Some(cache) = &self.cache {
            if cache.check_creds(username, password) {
                debug!(backend = %self.name, user = %username, "Credentials confirmed from cache");
                return Ok(());
            }
        }

        match self.client.authenticate(username, password).await {
            Ok(_) => {
                if let Some(cache) = &self.cache {
                    cache.add_creds(username, password);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(cache) = &self.cache {
                    cache.drop_user(username);
                }
                Err(e)
            }
        }
    }

    async fn get_groups(&self, username: &str) -> Result<StringSet, AuthError> {
        if let Some(groups) = self.cache.as_ref().and_then(|c| c.get_groups(username)) {
            return Ok(groups);
        }

        let groups: StringSet = self
            .client
            .groups_of_user(username)
            .await?
            .into_iter()
            .collect();

        if let Some(cache) = &self.cache {
            cache.add_groups(username, groups.clone());
        }
        Ok(groups)
    }
}
