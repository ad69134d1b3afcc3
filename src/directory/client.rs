//! Directory client
//!
//! Holds at most one live connection per directory server. The connection
//! is opened lazily and every public operation runs its whole bind/search
//! sequence under one lock, so concurrent requests never observe each
//! other's bind identity.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::LdapConfig;
use crate::error::{AuthError, RetryableError};

use super::retry::RetryPolicy;
use super::transport::Ldap3Connector;
use super::{DirectoryConnection, DirectoryConnector, DirectoryEntry};

/// Attribute list that asks the server for no attributes at all
const NO_ATTRIBUTES: &str = "1.1";

const GROUP_NAME_ATTRIBUTE: &str = "cn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundAs {
    Anonymous,
    Service,
    User,
}

struct Session {
    conn: Box<dyn DirectoryConnection>,
    bound_as: BoundAs,
}

enum Step<'a> {
    /// Bind as the service identity, or anonymously when none is configured
    BindService,
    BindUser { dn: &'a str, password: &'a str },
    Search { filter: &'a str, attrs: &'a [String] },
}

impl Step<'_> {
    fn describe(&self) -> &'static str {
        match self {
            Step::BindService => "service bind",
            Step::BindUser { .. } => "user bind",
            Step::Search { .. } => "search",
        }
    }
}

/// Client for one LDAP server
pub struct DirectoryClient {
    url: String,
    base: String,
    bind_dn: String,
    bind_pw: String,
    user_filter: String,
    group_filter: String,
    attributes: Vec<String>,
    retry: RetryPolicy,
    connector: Arc<dyn DirectoryConnector>,
    session: Mutex<Option<Session>>,
}

impl DirectoryClient {
    /// Create a client that talks to the configured server through `ldap3`
    pub fn from_config(config: &LdapConfig) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector::new(config)))
    }

    /// Create a client over an arbitrary transport
    pub fn with_connector(config: &LdapConfig, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            url: config.url(),
            base: config.base.clone(),
            bind_dn: config.bind_dn.clone(),
            bind_pw: config.bind_pw.clone(),
            user_filter: config.user_filter.clone(),
            group_filter: config.group_filter.clone(),
            attributes: config.attributes.clone(),
            retry: RetryPolicy::from_config(config),
            connector,
            session: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn has_service_identity(&self) -> bool {
        !self.bind_dn.is_empty()
    }

    /// Verify a username/password pair against the directory
    ///
    /// Returns the first value of each configured attribute; attributes the
    /// entry lacks map to an empty string.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<HashMap<String, String>, AuthError> {
        // An empty password would turn the user bind into an anonymous bind
        if password.is_empty() {
            return Err(AuthError::BadPassword);
        }

        let mut session = self.session.lock().await;

        if self.has_service_identity() {
            self.with_retries(&mut session, Step::BindService).await?;
        }

        let filter = substitute(&self.user_filter, username);
        let attrs = if self.attributes.is_empty() {
            vec![NO_ATTRIBUTES.to_string()]
        } else {
            self.attributes.clone()
        };
        let entries = self
            .with_retries(
                &mut session,
                Step::Search {
                    filter: &filter,
                    attrs: &attrs,
                },
            )
            .await?;

        let entry = match entries.as_slice() {
            [] => return Err(AuthError::UserNotFound),
            [entry] => entry,
            _ => return Err(AuthError::Protocol("too many entries returned".to_string())),
        };

        self.with_retries(
            &mut session,
            Step::BindUser {
                dn: &entry.dn,
                password,
            },
        )
        .await?;

        // The user is verified at this point; a failed rebind only costs the connection
        if let Err(e) = self.with_retries(&mut session, Step::BindService).await {
            warn!(url = %self.url, error = %e, "Rebind after user bind failed, dropping connection");
            discard(&mut session).await;
        }

        let attributes = self
            .attributes
            .iter()
            .map(|name| {
                let value = entry.first(name).unwrap_or_default().to_string();
                (name.clone(), value)
            })
            .collect();

        debug!(url = %self.url, user = %username, dn = %entry.dn, "Directory authentication succeeded");
        Ok(attributes)
    }

    /// Names of the groups `username` belongs to
    pub async fn groups_of_user(&self, username: &str) -> Result<Vec<String>, AuthError> {
        let mut session = self.session.lock().await;

        let filter = substitute(&self.group_filter, username);
        let attrs = [GROUP_NAME_ATTRIBUTE.to_string()];
        let entries = self
            .with_retries(
                &mut session,
                Step::Search {
                    filter: &filter,
                    attrs: &attrs,
                },
            )
            .await?;

        Ok(entries
            .iter()
            .filter_map(|e| e.first(GROUP_NAME_ATTRIBUTE))
            .map(str::to_string)
            .collect())
    }

    /// Drop the current connection, if any
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        discard(&mut session).await;
    }

    /// Run one step, reconnecting and retrying on network failures
    async fn with_retries(
        &self,
        slot: &mut Option<Session>,
        step: Step<'_>,
    ) -> Result<Vec<DirectoryEntry>, AuthError> {
        let mut attempt = 1;
        loop {
            let result = match self.connected(slot).await {
                Ok(session) => self.attempt(session, &step).await,
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(entries) => return Ok(entries),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }

            discard(slot).await;
            if !self.retry.has_attempts_left(attempt) {
                warn!(
                    url = %self.url,
                    step = step.describe(),
                    attempts = attempt,
                    error = %err,
                    "Directory operation failed after all attempts"
                );
                return Err(err);
            }

            let backoff = self.retry.backoff(attempt);
            debug!(
                url = %self.url,
                step = step.describe(),
                attempt = attempt,
                max_attempts = self.retry.max_attempts(),
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Directory operation failed, retrying after backoff"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn connected<'s>(&self, slot: &'s mut Option<Session>) -> Result<&'s mut Session, AuthError> {
        if slot.is_none() {
            debug!(url = %self.url, "Opening directory connection");
            let conn = self.connector.connect().await?;
            *slot = Some(Session {
                conn,
                bound_as: BoundAs::Anonymous,
            });
        }
        slot.as_mut().ok_or(AuthError::Unknown)
    }

    /// Binds yield no entries
    async fn attempt(&self, session: &mut Session, step: &Step<'_>) -> Result<Vec<DirectoryEntry>, AuthError> {
        match step {
            Step::BindService => {
                self.bind_service(session).await?;
                Ok(Vec::new())
            }
            Step::BindUser { dn, password } => {
                // A rejected bind leaves the connection unauthenticated
                session.bound_as = BoundAs::User;
                session.conn.bind(dn, password).await?;
                Ok(Vec::new())
            }
            Step::Search { filter, attrs } => {
                let wanted = if self.has_service_identity() {
                    BoundAs::Service
                } else {
                    BoundAs::Anonymous
                };
                if session.bound_as != wanted {
                    self.bind_service(session).await?;
                }
                session.conn.search(&self.base, filter, attrs).await
            }
        }
    }

    async fn bind_service(&self, session: &mut Session) -> Result<(), AuthError> {
        if self.has_service_identity() {
            session
                .conn
                .bind(&self.bind_dn, &self.bind_pw)
                .await
                .map_err(|e| match e {
                    AuthError::BadPassword => {
                        AuthError::Protocol("service identity rejected by directory".to_string())
                    }
                    other => other,
                })?;
            session.bound_as = BoundAs::Service;
        } else {
            session.conn.bind("", "").await?;
            session.bound_as = BoundAs::Anonymous;
        }
        Ok(())
    }
}

async fn discard(slot: &mut Option<Session>) {
    if let Some(mut session) = slot.take() {
        session.conn.close().await;
    }
}

/// Replace every `%s` in a filter template with the escaped username
fn substitute(template: &str, username: &str) -> String {
    template.replace("%s", &ldap3::ldap_escape(username))
}
