//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Overlay environment variables onto `config`. `lookup` resolves a variable name.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |var: &'static str| lookup(var).filter(|v| !v.is_empty());

    if let Some(v) = env("BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = env("LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = env("LOG_FORMAT") {
        config.logging.format = parse_var::<LogFormat>("LOG_FORMAT", v)?;
    }
    if let Some(v) = env("METRICS_ENABLED") {
        config.metrics.enabled = parse_bool(&v);
    }
    if let Some(v) = env("METRICS_ADDRESS") {
        config.metrics.address = v;
    }

    if let Some(v) = env("HTPASSWD_FILE_PATH") {
        config.htpasswd.file_path = v;
    }
    if let Some(v) = env("HTPASSWD_GROUP_FILE_PATH") {
        config.htpasswd.group_file_path = Some(v);
    }

    if let Some(v) = env("LDAP_SERVER_URL") {
        config.ldap.server_url = Some(v);
    }
    if let Some(v) = env("LDAP_BIND_DN") {
        config.ldap.bind_dn = Some(v);
    }
    if let Some(v) = env("LDAP_SEARCH_BASE") {
        config.ldap.search_base = Some(v);
    }
    if let Some(v) = env("LDAP_SEARCH_FILTER") {
        config.ldap.search_filter = v;
    }
    if let Some(v) = env("LDAP_MANAGER_DN") {
        config.ldap.manager_dn = Some(v);
    }
    if let Some(v) = env("LDAP_MANAGER_PASSWORD") {
        config.ldap.manager_password = Some(v);
    }
    if let Some(v) = env("LDAP_TIMEOUT_SECONDS") {
        config.ldap.timeout_secs = parse_var("LDAP_TIMEOUT_SECONDS", v)?;
    }

    if let Some(v) = env("AUTHORIZATION_RULES_PATH") {
        config.rules.path = v;
    }
    if let Some(v) = env("AUTHORIZATION_INGRESS_RULES_ENABLED") {
        config.rules.ingress_rules_enabled = parse_bool(&v);
    }
    if let Some(v) = env("AUTHORIZATION_INGRESS_RULES_SECRET") {
        config.rules.ingress_rules_secret = v;
    }

    if let Some(v) = env("AUTH_CACHE_TTL_SECONDS") {
        config.auth_cache.ttl_secs = parse_var("AUTH_CACHE_TTL_SECONDS", v)?;
    }

    if let Some(v) = env("BRUTE_FORCE_PROTECTION_ENABLED") {
        config.brute_force.enabled = parse_bool(&v);
    }
    if let Some(v) = env("BRUTE_FORCE_MAX_FAILURE_COUNT") {
        config.brute_force.max_failure_count = parse_var("BRUTE_FORCE_MAX_FAILURE_COUNT", v)?;
    }
    if let Some(v) = env("BRUTE_FORCE_EXPIRATION_SECONDS") {
        config.brute_force.expiration_secs = parse_var("BRUTE_FORCE_EXPIRATION_SECONDS", v)?;
    }

    Ok(())
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
