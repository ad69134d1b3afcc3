//! Authentication engine
//!
//! Chains the configured backends and evaluates a destination's allow/deny
//! policy for the backend that vouched for the user.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{Config, HostConfig};
use crate::error::AuthError;
use crate::models::StringSet;

use super::internal::InternalAuthenticator;
use super::ldap::LdapAuthenticator;
use super::Authenticator;

/// Ordered list of identity backends plus the access policy evaluator
pub struct AuthenticationEngine {
    backends: Vec<Arc<dyn Authenticator>>,
}

impl AuthenticationEngine {
    /// Internal users first, then each directory in configuration order
    pub fn from_config(config: &Config) -> Self {
        let internal = InternalAuthenticator::new(&config.internal_users);
        let internal_users = internal.len();
        let mut backends: Vec<Arc<dyn Authenticator>> = vec![Arc::new(internal)];
        for ldap in &config.ldap_servers {
            backends.push(Arc::new(LdapAuthenticator::from_config(ldap)));
        }

        info!(
            internal_users,
            ldap_servers = config.ldap_servers.len(),
            "Authentication backends initialized"
        );
        Self::new(backends)
    }

    pub fn new(backends: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &[Arc<dyn Authenticator>] {
        &self.backends
    }

    /// Authenticate a request for `host` and apply its access policy
    ///
    /// Returns `AccessDenied` when the user is authenticated but the policy
    /// refuses them.
    pub async fn auth_request(
        &self,
        username: &str,
        password: &str,
        host: &HostConfig,
    ) -> Result<(), AuthError> {
        let backend = self.authenticate(username, password).await?;

        if self.check_access(username, host, backend.as_ref()).await? {
            Ok(())
        } else {
            debug!(user = %username, backend = backend.name(), "Access denied by host policy");
            Err(AuthError::AccessDenied)
        }
    }

    /// First backend that confirms the credentials
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn Authenticator>, AuthError> {
        for backend in &self.backends {
            match backend.check_password(username, password).await {
                Ok(()) => {
                    debug!(user = %username, backend = backend.name(), "Credentials confirmed");
                    return Ok(Arc::clone(backend));
                }
                Err(e) => {
                    // Any failure only means this backend does not vouch
                    debug!(
                        user = %username,
                        backend = backend.name(),
                        error = %e,
                        "Backend did not confirm credentials"
                    );
                }
            }
        }

        Err(AuthError::BadPassword)
    }

    /// Evaluate `host`'s policy for a user confirmed by `backend`
    ///
    /// DenyUsers wins over DenyGroups, which wins over the allow rules.
    /// Groups are fetched only when the host has group rules.
    pub async fn check_access(
        &self,
        username: &str,
        host: &HostConfig,
        backend: &dyn Authenticator,
    ) -> Result<bool, AuthError> {
        if host.deny_users.iter().any(|u| u == username) {
            return Ok(false);
        }

        let groups = if host.needs_groups() {
            backend.get_groups(username).await?
        } else {
            StringSet::new()
        };

        if groups.contains_one(host.deny_groups.as_slice()) {
            return Ok(false);
        }

        let allowed = host.allow_all
            || host.allow_users.iter().any(|u| u == username)
            || groups.contains_one(host.allow_groups.as_slice());
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockAuthenticator;
    use mockall::predicate::eq;

    fn host() -> HostConfig {
        HostConfig::new(["a.example.com"], "http://10.0.0.1:8080").unwrap()
    }

    fn groups(names: &[&str]) -> StringSet {
        names.iter().copied().collect()
    }

    /// Backend that rejects everything and must never be asked for groups
    fn rejecting(name: &str, err: AuthError) -> MockAuthenticator {
        let mut mock = MockAuthenticator::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_check_password()
            .returning(move |_, _| Err(err.clone()));
        mock.expect_get_groups().never();
        mock
    }

    /// Backend that accepts `user` and reports `user_groups`
    fn accepting(name: &str, user: &'static str, user_groups: StringSet) -> MockAuthenticator {
        let mut mock = MockAuthenticator::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_check_password()
            .with(eq(user), eq("pw"))
            .returning(|_, _| Ok(()));
        mock.expect_get_groups()
            .with(eq(user))
            .returning(move |_| Ok(user_groups.clone()));
        mock
    }

    // Test 1: unknown user everywhere is BadPassword
    #[tokio::test]
    async fn test_no_backend_confirms() {
        let engine = AuthenticationEngine::new(vec![
            Arc::new(rejecting("internal", AuthError::UserNotFound)),
            Arc::new(rejecting("ldap", AuthError::UserNotFound)),
        ]);

        let mut host = host();
        host.allow_all = true;
        assert_eq!(
            engine.auth_request("ghost", "pw", &host).await,
            Err(AuthError::BadPassword)
        );
    }

    // Test 2: a backend outage does not block the next backend
    #[tokio::test]
    async fn test_fallback_past_failing_backend() {
        let engine = AuthenticationEngine::new(vec![
            Arc::new(rejecting("ldap-down", AuthError::Network("timeout".into()))),
            Arc::new(accepting("internal", "alice", StringSet::new())),
        ]);

        let mut host = host();
        host.allow_users = vec!["alice".to_string()];
        assert_eq!(engine.auth_request("alice", "pw", &host).await, Ok(()));
    }

    // Test 3: groups come from the backend that confirmed the user
    #[tokio::test]
    async fn test_groups_from_selected_backend() {
        let engine = AuthenticationEngine::new(vec![
            Arc::new(rejecting("internal", AuthError::UserNotFound)),
            Arc::new(accepting("ldap", "x", groups(&["eng"]))),
        ]);

        let mut host = host();
        host.allow_groups = vec!["eng".to_string()];
        assert_eq!(engine.auth_request("x", "pw", &host).await, Ok(()));
    }

    // Test 4: DenyUsers wins over AllowAll without fetching groups
    #[tokio::test]
    async fn test_deny_user_precedence() {
        let mut backend = MockAuthenticator::new();
        backend.expect_get_groups().never();

        let mut host = host();
        host.allow_all = true;
        host.deny_users = vec!["bob".to_string()];
        host.deny_groups = vec!["contractors".to_string()];

        let engine = AuthenticationEngine::new(vec![]);
        assert_eq!(engine.check_access("bob", &host, &backend).await, Ok(false));
    }

    // Test 5: AllowGroups admits members unless a DenyGroups group matches
    #[tokio::test]
    async fn test_group_precedence() {
        let engine = AuthenticationEngine::new(vec![]);
        let mut host = host();
        host.allow_groups = vec!["eng".to_string()];

        let member = accepting("ldap", "alice", groups(&["eng"]));
        assert_eq!(engine.check_access("alice", &host, &member).await, Ok(true));

        host.deny_groups = vec!["suspended".to_string()];
        let suspended = accepting("ldap", "alice", groups(&["eng", "suspended"]));
        assert_eq!(
            engine.check_access("alice", &host, &suspended).await,
            Ok(false)
        );

        let outsider = accepting("ldap", "alice", groups(&["sales"]));
        assert_eq!(
            engine.check_access("alice", &host, &outsider).await,
            Ok(false)
        );
    }

    // Test 6: no group rules, no group lookup
    #[tokio::test]
    async fn test_groups_fetched_lazily() {
        let mut backend = MockAuthenticator::new();
        backend.expect_get_groups().never();

        let mut host = host();
        host.allow_all = true;

        let engine = AuthenticationEngine::new(vec![]);
        assert_eq!(engine.check_access("alice", &host, &backend).await, Ok(true));
    }

    // Test 7: default is deny
    #[tokio::test]
    async fn test_default_deny() {
        let backend = MockAuthenticator::new();
        let engine = AuthenticationEngine::new(vec![]);

        assert_eq!(engine.check_access("alice", &host(), &backend).await, Ok(false));
    }

    // Test 8: AllowUsers admits a listed user
    #[tokio::test]
    async fn test_allow_users() {
        let backend = MockAuthenticator::new();
        let engine = AuthenticationEngine::new(vec![]);
        let mut host = host();
        host.allow_users = vec!["alice".to_string()];

        assert_eq!(engine.check_access("alice", &host, &backend).await, Ok(true));
        assert_eq!(engine.check_access("bob", &host, &backend).await, Ok(false));
    }

    // Test 9: a group lookup failure aborts the request
    #[tokio::test]
    async fn test_group_lookup_failure_propagates() {
        let mut backend = MockAuthenticator::new();
        backend.expect_name().return_const("ldap".to_string());
        backend.expect_check_password().returning(|_, _| Ok(()));
        backend
            .expect_get_groups()
            .returning(|_| Err(AuthError::Network("connection reset".into())));

        let mut host = host();
        host.allow_all = true;
        host.deny_groups = vec!["suspended".to_string()];

        let engine = AuthenticationEngine::new(vec![Arc::new(backend)]);
        assert_eq!(
            engine.auth_request("alice", "pw", &host).await,
            Err(AuthError::Network("connection reset".into()))
        );
    }

    // Test 10: authenticated but refused is AccessDenied
    #[tokio::test]
    async fn test_access_denied() {
        let engine = AuthenticationEngine::new(vec![Arc::new(accepting(
            "internal",
            "alice",
            StringSet::new(),
        ))]);

        assert_eq!(
            engine.auth_request("alice", "pw", &host()).await,
            Err(AuthError::AccessDenied)
        );
    }

    // Test 11: backends are built internal first, then directories in order
    #[test]
    fn test_from_config_order() {
        let mut config = Config::default();
        config.ldap_servers = vec![
            crate::config::LdapConfig::new("ldap1.example.com"),
            crate::config::LdapConfig::new("ldap2.example.com"),
        ];

        let engine = AuthenticationEngine::from_config(&config);
        let names: Vec<&str> = engine.backends().iter().map(|b| b.name()).collect();
        assert_eq!(
            names,
            vec![
                "internal",
                "ldap:ldap://ldap1.example.com:389",
                "ldap:ldap://ldap2.example.com:389"
            ]
        );
    }
}
