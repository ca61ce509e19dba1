//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overlay)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → used once at startup to build the services
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Environment variables win over the file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthCacheConfig, BruteForceConfig, HtpasswdConfig, LdapConfig, ListenerConfig, LogFormat,
    LoggingConfig, MetricsConfig, RulesConfig, ServiceConfig,
};
pub use validation::{validate_config, ValidationError};
