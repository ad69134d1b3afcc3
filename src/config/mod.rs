//! Configuration management for authproxy
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files. The loaded configuration is immutable and shared by reference
//! with the request-handling core.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::password::is_valid_verifier;

/// Realm used in the 401 challenge when nothing else is configured
pub const DEFAULT_AUTH_REALM: &str = "login";

/// Default LDAP filter used to locate a user entry
pub const DEFAULT_USER_FILTER: &str = "(uid=%s)";

/// Default LDAP filter used to locate the groups of a user
pub const DEFAULT_GROUP_FILTER: &str = "(memberUid=%s)";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Address the HTTP listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port for plain HTTP
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port for HTTPS (terminated outside this process, 0 disables)
    #[serde(default)]
    pub https_port: u16,

    /// Redirect plain HTTP to HTTPS; accepted for compatibility, the
    /// terminating proxy owns redirects
    #[serde(default)]
    pub https_redirect: bool,

    /// Realm used when a host does not configure its own
    #[serde(default = "default_auth_realm")]
    pub auth_realm: String,

    /// Directory backends, consulted in this order after internal users
    #[serde(default)]
    pub ldap_servers: Vec<LdapConfig>,

    /// Static user table
    #[serde(default)]
    pub internal_users: Vec<InternalUser>,

    /// TLS material (loaded by the listener owner)
    #[serde(default)]
    pub tls: TlsConfig,

    /// Protected destinations
    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            http_port: default_http_port(),
            https_port: 0,
            https_redirect: false,
            auth_realm: default_auth_realm(),
            ldap_servers: Vec::new(),
            internal_users: Vec::new(),
            tls: TlsConfig::default(),
            hosts: Vec::new(),
            logging: LoggingConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    ///
    /// Environment variables written as `${VAR}` are expanded first, then
    /// defaults are applied and every host is validated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let mut config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.prepare()?;
        Ok(config)
    }

    /// Apply defaults and validate values that serde cannot check
    pub fn prepare(&mut self) -> Result<(), ConfigError> {
        if self.auth_realm.is_empty() {
            self.auth_realm = default_auth_realm();
        }

        for ldap in &mut self.ldap_servers {
            if ldap.host.is_empty() {
                return Err(ConfigError::MissingRequired("ldap_servers[].host".into()));
            }
            if ldap.user_filter.is_empty() {
                ldap.user_filter = default_user_filter();
            }
            if ldap.group_filter.is_empty() {
                ldap.group_filter = default_group_filter();
            }
            ldap.call_attempts = ldap.call_attempts.max(1);
        }

        for user in &self.internal_users {
            if !is_valid_verifier(&user.password) {
                return Err(ConfigError::InvalidValue(format!(
                    "password for internal user '{}' is not a PHC hash string",
                    user.username
                )));
            }
        }

        for host in &mut self.hosts {
            host.prepare()?;
        }

        Ok(())
    }
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_auth_realm() -> String {
    DEFAULT_AUTH_REALM.to_string()
}

/// A user defined directly in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalUser {
    pub username: String,

    /// Argon2 PHC string, never the plain password
    pub password: String,

    #[serde(default)]
    pub groups: Vec<String>,
}

/// Connection and lookup settings for one LDAP directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LdapConfig {
    /// Directory server hostname
    pub host: String,

    /// Directory server port
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Connect with `ldaps://`
    #[serde(default)]
    pub ssl: bool,

    /// Upgrade a plain connection with StartTLS
    #[serde(default)]
    pub starttls: bool,

    /// Skip certificate verification for `ssl` and `starttls`
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Search base for users and groups
    #[serde(default)]
    pub base: String,

    /// Service identity used for searches
    #[serde(default)]
    pub bind_dn: String,

    #[serde(default)]
    pub bind_pw: String,

    /// User search filter, `%s` is replaced by the escaped username
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Group search filter, `%s` is replaced by the escaped username
    #[serde(default = "default_group_filter")]
    pub group_filter: String,

    /// User entry attributes returned by a successful authentication
    #[serde(default)]
    pub attributes: Vec<String>,

    /// How long verified credentials and groups stay cached (0 disables)
    #[serde(default = "default_cache_seconds")]
    pub cache_seconds: u64,

    /// Attempts per bind/search before giving up on network errors
    #[serde(default = "default_call_attempts")]
    pub call_attempts: u32,

    /// Base delay for linear backoff between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Connect timeout
    #[serde(default = "default_ldap_timeout")]
    pub timeout_secs: u64,
}

impl LdapConfig {
    /// Create a config for `host` with every other field at its default
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            ssl: false,
            starttls: false,
            insecure_skip_verify: false,
            base: String::new(),
            bind_dn: String::new(),
            bind_pw: String::new(),
            user_filter: default_user_filter(),
            group_filter: default_group_filter(),
            attributes: Vec::new(),
            cache_seconds: default_cache_seconds(),
            call_attempts: default_call_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_ldap_timeout(),
        }
    }

    /// URL understood by the LDAP transport
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_user_filter() -> String {
    DEFAULT_USER_FILTER.to_string()
}

fn default_group_filter() -> String {
    DEFAULT_GROUP_FILTER.to_string()
}

fn default_cache_seconds() -> u64 {
    300
}

fn default_call_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    50
}

fn default_ldap_timeout() -> u64 {
    10
}

/// TLS certificate locations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub cert: String,

    #[serde(default)]
    pub chain: String,

    #[serde(default)]
    pub key: String,
}

/// One protected destination
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Host header values served by this destination, matched case-insensitively
    pub hostnames: Vec<String>,

    /// Upstream base URL, e.g. `http://10.0.0.1:8080`
    pub upstream: String,

    /// Parsed form of `upstream`, filled in by [`HostConfig::prepare`]
    #[serde(skip)]
    pub upstream_url: Option<Url>,

    /// Send the inbound Host header upstream instead of the upstream authority
    #[serde(default)]
    pub preserve_host: bool,

    /// Realm shown in the 401 challenge
    #[serde(default)]
    pub auth_realm: String,

    #[serde(default)]
    pub allow_all: bool,

    #[serde(default)]
    pub allow_groups: Vec<String>,

    #[serde(default)]
    pub allow_users: Vec<String>,

    #[serde(default)]
    pub deny_groups: Vec<String>,

    #[serde(default)]
    pub deny_users: Vec<String>,
}

impl HostConfig {
    /// Build a destination with a parsed upstream and no access rules
    pub fn new<S: Into<String>>(
        hostnames: impl IntoIterator<Item = S>,
        upstream: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut host = Self {
            hostnames: hostnames.into_iter().map(Into::into).collect(),
            upstream: upstream.into(),
            ..Default::default()
        };
        host.prepare()?;
        Ok(host)
    }

    /// Validate hostnames and parse the upstream URL
    pub fn prepare(&mut self) -> Result<(), ConfigError> {
        if self.hostnames.is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "hostnames for upstream {}",
                self.upstream
            )));
        }

        let url = Url::parse(&self.upstream).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "error parsing upstream URL {} : {}",
                self.upstream, e
            ))
        })?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "upstream URL {} has no host",
                self.upstream
            )));
        }
        self.upstream_url = Some(url);
        Ok(())
    }

    /// Realm for this host, falling back to `default`
    pub fn realm<'a>(&'a self, default: &'a str) -> &'a str {
        if !self.auth_realm.is_empty() {
            &self.auth_realm
        } else if !default.is_empty() {
            default
        } else {
            DEFAULT_AUTH_REALM
        }
    }

    /// `host[:port]` of the upstream, as sent in `X-Origin-Host`
    pub fn upstream_authority(&self) -> Option<String> {
        let url = self.upstream_url.as_ref()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// True when evaluating this host's policy needs the user's groups
    pub fn needs_groups(&self) -> bool {
        !self.allow_groups.is_empty() || !self.deny_groups.is_empty()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `json`, or `pretty`/`text` for human-readable output
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether span export is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "authproxy".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax; unknown variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
