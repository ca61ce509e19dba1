//! Startup orchestration.
//!
//! # Responsibilities
//! - Build authentication backends in configured order
//! - Load the default rule set
//! - Assemble the decision pipeline around a shared clock
//! - Start the background sweeper
//!
//! # Design Decisions
//! - Fail fast: an invalid rules file is fatal
//! - A missing rules file or missing backends only warn; the service still
//!   answers, rejecting whatever needs credentials

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::{AuthBackend, Authenticator, HtpasswdBackend, LdapBackend};
use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::decision::DecisionPipeline;
use crate::rules::{load_rules_file, OverridePolicy, RuleEngine, RuleSet, RulesFileError};
use crate::security::BruteForceTracker;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot load rules from {path}: {source}")]
    Rules {
        path: PathBuf,
        #[source]
        source: RulesFileError,
    },
}

/// Backends in the order they are consulted: htpasswd, then LDAP.
pub fn build_backends(config: &ServiceConfig) -> Vec<Arc<dyn AuthBackend>> {
    let mut backends: Vec<Arc<dyn AuthBackend>> = Vec::new();

    if !config.htpasswd.file_path.is_empty() {
        tracing::info!(
            file = %config.htpasswd.file_path,
            group_file = ?config.htpasswd.group_file_path,
            "Using htpasswd authentication backend"
        );
        backends.push(Arc::new(HtpasswdBackend::new(
            &config.htpasswd.file_path,
            config.htpasswd.group_file_path.as_ref().map(PathBuf::from),
        )));
    }

    if let Some(ldap) = LdapBackend::from_config(&config.ldap) {
        tracing::info!(
            server = ?config.ldap.server_url,
            bind_dn = ?config.ldap.bind_dn,
            search_base = ?config.ldap.search_base,
            search_filter = %config.ldap.search_filter,
            "Using LDAP authentication backend"
        );
        backends.push(Arc::new(ldap));
    }

    if backends.is_empty() {
        tracing::warn!("No authentication backends configured; every non-public request will be rejected");
    }
    backends
}

/// Load the default rules; a missing file yields an empty rule set.
pub fn load_default_rules(path: &Path) -> Result<RuleSet, StartupError> {
    match load_rules_file(path) {
        Ok(rules) => {
            tracing::info!(path = %path.display(), rules = rules.len(), "Loaded authorization rules");
            Ok(rules)
        }
        Err(RulesFileError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Rules file not found; every request requires authentication");
            Ok(RuleSet::default())
        }
        Err(source) => Err(StartupError::Rules {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Assemble the decision pipeline from configuration.
pub fn build_pipeline(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<DecisionPipeline, StartupError> {
    let rules = load_default_rules(Path::new(&config.rules.path))?;
    Ok(build_pipeline_with(config, rules, build_backends(config), clock))
}

/// Assemble the decision pipeline from already constructed parts.
pub fn build_pipeline_with(
    config: &ServiceConfig,
    rules: RuleSet,
    backends: Vec<Arc<dyn AuthBackend>>,
    clock: Arc<dyn Clock>,
) -> DecisionPipeline {
    let ttl = Duration::from_secs(config.auth_cache.ttl_secs);

    let overrides = OverridePolicy {
        enabled: config.rules.ingress_rules_enabled,
        secret: config.rules.ingress_rules_secret.clone(),
    };
    if overrides.enabled {
        tracing::warn!("Authorization rules supplied by the ingress are enabled");
    }

    let brute_force = BruteForceTracker::from_config(&config.brute_force, clock.clone());
    if brute_force.is_enabled() {
        tracing::info!(
            max_failures = config.brute_force.max_failure_count,
            expiration_secs = config.brute_force.expiration_secs,
            "Brute-force protection enabled"
        );
    }

    DecisionPipeline::new(
        Arc::new(RuleEngine::new(rules, overrides, ttl, clock.clone())),
        Arc::new(Authenticator::new(backends, ttl, clock)),
        Arc::new(brute_force),
    )
}

/// Periodically drop expired cache and tracker entries until shutdown.
pub fn spawn_sweeper(
    pipeline: Arc<DecisionPipeline>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let credentials = pipeline.authenticator().evict_expired();
                    let lookups = pipeline.rules().evict_expired();
                    let clients = pipeline.brute_force().evict_expired();
                    if credentials + lookups + clients > 0 {
                        tracing::debug!(credentials, lookups, clients, "Evicted expired entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Sweeper stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::io::Write;

    #[test]
    fn test_missing_rules_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rules = load_default_rules(&dir.path().join("rules.conf")).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_invalid_rules_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "* * * * maybe").unwrap();
        assert!(matches!(
            load_default_rules(file.path()),
            Err(StartupError::Rules { .. })
        ));
    }

    #[test]
    fn test_backend_order_and_selection() {
        let mut config = ServiceConfig::default();
        config.htpasswd.file_path = String::new();
        assert!(build_backends(&config).is_empty());

        config.htpasswd.file_path = "/nonexistent/.htpasswd".into();
        config.ldap.server_url = Some("ldap://127.0.0.1:1".into());
        config.ldap.bind_dn = Some("uid={username},dc=example,dc=org".into());
        let names: Vec<String> = build_backends(&config)
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["htpasswd", "ldap"]);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let config = ServiceConfig::default();
        let pipeline = Arc::new(build_pipeline_with(
            &config,
            RuleSet::default(),
            Vec::new(),
            Arc::new(ManualClock::new()),
        ));
        let shutdown = crate::lifecycle::Shutdown::new();
        let handle = spawn_sweeper(pipeline, Duration::from_millis(10), shutdown.subscribe());
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
