//! `ldap3` transport

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use tracing::{debug, warn};

use crate::config::LdapConfig;
use crate::error::AuthError;

use super::{DirectoryConnection, DirectoryConnector, DirectoryEntry};

/// invalidCredentials
const RC_INVALID_CREDENTIALS: u32 = 49;
/// busy
const RC_BUSY: u32 = 51;
/// unavailable
const RC_UNAVAILABLE: u32 = 52;

/// Opens `ldap3` connections using the server's TLS and timeout settings
pub struct Ldap3Connector {
    url: String,
    starttls: bool,
    insecure_skip_verify: bool,
    timeout: Duration,
}

impl Ldap3Connector {
    pub fn new(config: &LdapConfig) -> Self {
        Self {
            url: config.url(),
            starttls: config.starttls && !config.ssl,
            insecure_skip_verify: config.insecure_skip_verify,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, AuthError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.starttls)
            .set_no_tls_verify(self.insecure_skip_verify);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(map_ldap_error)?;

        let url = self.url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(url = %url, error = %e, "LDAP connection terminated");
            }
        });

        debug!(url = %self.url, starttls = self.starttls, "LDAP connection established");
        Ok(Box::new(Ldap3Connection {
            ldap,
            timeout: self.timeout,
        }))
    }
}

/// One open `ldap3` connection
pub struct Ldap3Connection {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), AuthError> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?;

        match result.rc {
            0 => Ok(()),
            RC_INVALID_CREDENTIALS => Err(AuthError::BadPassword),
            RC_BUSY | RC_UNAVAILABLE => Err(AuthError::Network(format!(
                "bind failed: rc={} {}",
                result.rc, result.text
            ))),
            rc => Err(AuthError::Protocol(format!(
                "bind failed: rc={} {}",
                rc, result.text
            ))),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>, AuthError> {
        let (entries, _) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attrs.to_vec())
            .await
            .map_err(map_ldap_error)?
            .success()
            .map_err(map_ldap_error)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|e| DirectoryEntry {
                dn: e.dn,
                attrs: e.attrs,
            })
            .collect())
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }
    }
}

/// Classify an `ldap3` error as transient or permanent
fn map_ldap_error(e: LdapError) -> AuthError {
    match &e {
        LdapError::Io { .. }
        | LdapError::OpSend { .. }
        | LdapError::ResultRecv { .. }
        | LdapError::Timeout { .. }
        | LdapError::EndOfStream => AuthError::Network(e.to_string()),
        LdapError::LdapResult { result } if matches!(result.rc, RC_BUSY | RC_UNAVAILABLE) => {
            AuthError::Network(e.to_string())
        }
        _ => AuthError::Protocol(e.to_string()),
    }
}
