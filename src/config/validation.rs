//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Check that paired settings are set together
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("'{}' is not a socket address", config.metrics.address),
        ));
    }

    if config.brute_force.max_failure_count == 0 {
        errors.push(ValidationError::new("brute_force.max_failure_count", "must be greater than 0"));
    }
    if config.brute_force.expiration_secs == 0 {
        errors.push(ValidationError::new("brute_force.expiration_secs", "must be greater than 0"));
    }

    if config.ldap.is_enabled() {
        let ldap = &config.ldap;
        if ldap.search_base.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::new("ldap.search_base", "required when LDAP is enabled"));
        }
        if ldap.manager_dn.is_some() != ldap.manager_password.is_some() {
            errors.push(ValidationError::new(
                "ldap.manager_dn",
                "manager DN and password must be set together",
            ));
        }
        if ldap.manager_dn.is_none() && ldap.bind_dn.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::new(
                "ldap.bind_dn",
                "required when no manager credentials are configured",
            ));
        }
        if ldap.timeout_secs == 0 {
            errors.push(ValidationError::new("ldap.timeout_secs", "must be greater than 0"));
        }
    }

    if config.rules.ingress_rules_enabled && config.rules.ingress_rules_secret.is_empty() {
        errors.push(ValidationError::new(
            "rules.ingress_rules_secret",
            "must not be empty when ingress rules are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
