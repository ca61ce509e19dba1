//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Root configuration for the authorization service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Log level and output format.
    pub logging: LoggingConfig,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,

    /// Local credential file backend.
    pub htpasswd: HtpasswdConfig,

    /// Directory service backend.
    pub ldap: LdapConfig,

    /// Authorization rules source and ingress overrides.
    pub rules: RulesConfig,

    /// Authentication and rule lookup caching.
    pub auth_cache: AuthCacheConfig,

    /// Brute-force protection.
    pub brute_force: BruteForceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Total time allowed for a decision request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Console,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "console" | "text" | "pretty" => Ok(Self::Console),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Htpasswd backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HtpasswdConfig {
    /// Path to the `user:hash` file.
    pub file_path: String,

    /// Optional `group: user1 user2` file.
    pub group_file_path: Option<String>,
}

impl Default for HtpasswdConfig {
    fn default() -> Self {
        Self {
            file_path: ".config/.htpasswd".to_string(),
            group_file_path: None,
        }
    }
}

/// LDAP backend configuration. The backend is off unless `server_url` is set.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LdapConfig {
    /// e.g. "ldap://ldap.example.org:389".
    pub server_url: Option<String>,

    /// User DN template with a `{username}` placeholder.
    pub bind_dn: Option<String>,

    /// Base DN for user searches.
    pub search_base: Option<String>,

    /// Search filter with a `{username}` placeholder.
    pub search_filter: String,

    /// Service account used to search for users.
    pub manager_dn: Option<String>,

    pub manager_password: Option<String>,

    /// Connect and operation timeout in seconds.
    pub timeout_secs: u64,
}

impl LdapConfig {
    pub fn is_enabled(&self) -> bool {
        self.server_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            bind_dn: None,
            search_base: None,
            search_filter: "(uid={username})".to_string(),
            manager_dn: None,
            manager_password: None,
            timeout_secs: 5,
        }
    }
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("server_url", &self.server_url)
            .field("bind_dn", &self.bind_dn)
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("manager_dn", &self.manager_dn)
            .field("manager_password", &self.manager_password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Authorization rules configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rules file; a missing file means "no rules".
    pub path: String,

    /// Trust `X-Authorization-Rules` from the ingress.
    pub ingress_rules_enabled: bool,

    /// Shared secret expected in `X-External-Auth-Secret`.
    pub ingress_rules_secret: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "./config/rules.conf".to_string(),
            ingress_rules_enabled: false,
            ingress_rules_secret: random_secret(),
        }
    }
}

impl std::fmt::Debug for RulesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesConfig")
            .field("path", &self.path)
            .field("ingress_rules_enabled", &self.ingress_rules_enabled)
            .field("ingress_rules_secret", &"<redacted>")
            .finish()
    }
}

/// 32 random alphanumerics; unguessable unless configured explicitly.
pub fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthCacheConfig {
    /// Lifetime of cached authentication results and rule lookups.
    pub ttl_secs: u64,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 15 }
    }
}

/// Brute-force protection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BruteForceConfig {
    pub enabled: bool,

    /// Failures within the window that block a client.
    pub max_failure_count: u32,

    /// Window in seconds, re-anchored on every failure.
    pub expiration_secs: u64,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_failure_count: 5,
            expiration_secs: 60,
        }
    }
}
