//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! (username, password)
//!     → HMAC-SHA256 cache key (per-process random key)
//!     → TtlCache hit? return cached AuthResult
//!     → otherwise try each backend in order, first success wins
//!     → cache the result (positive or negative)
//! ```
//!
//! # Design Decisions
//! - Backends are trait objects in configured order; the pipeline never sees
//!   concrete types
//! - A backend error means "this backend did not authenticate"; the next one
//!   is tried
//! - Zero backends fail closed
//! - Revoked credentials stay valid for at most one cache TTL

pub mod backend;
pub mod htpasswd;
pub mod ldap;

pub use backend::{AuthBackend, AuthResult, BackendError};
pub use htpasswd::HtpasswdBackend;
pub use ldap::LdapBackend;

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::observability::metrics;

type HmacSha256 = Hmac<Sha256>;

/// Cache key derived from a credential; never contains the password itself.
pub type CredentialKey = [u8; 32];

/// Health of a single backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub name: String,
    pub healthy: bool,
}

/// Ordered backend set with a result cache in front.
pub struct Authenticator {
    backends: Vec<Arc<dyn AuthBackend>>,
    cache: TtlCache<CredentialKey, AuthResult>,
    key_mac: HmacSha256,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("backends", &self.backends)
            .field("cached", &self.cache.len())
            .field("ttl", &self.cache.ttl())
            .finish()
    }
}

impl Authenticator {
    pub fn new(backends: Vec<Arc<dyn AuthBackend>>, cache_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let key_mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts keys of any length");

        Self {
            backends,
            cache: TtlCache::new(cache_ttl, clock),
            key_mac,
        }
    }

    pub fn backends(&self) -> &[Arc<dyn AuthBackend>] {
        &self.backends
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    fn credential_key(&self, username: &str, password: &str) -> CredentialKey {
        let mut mac = self.key_mac.clone();
        mac.update(&(username.len() as u64).to_be_bytes());
        mac.update(username.as_bytes());
        mac.update(password.as_bytes());

        let mut key = [0u8; 32];
        key.copy_from_slice(&mac.finalize().into_bytes());
        key
    }

    /// Verify a credential, serving repeated attempts from the cache.
    pub async fn authenticate(&self, username: &str, password: &str) -> AuthResult {
        let key = self.credential_key(username, password);
        self.cache
            .get_or_compute(key, || self.authenticate_any(username, password))
            .await
    }

    /// Try every backend in order without consulting the cache.
    pub async fn authenticate_any(&self, username: &str, password: &str) -> AuthResult {
        for backend in &self.backends {
            match backend.authenticate(username, password).await {
                Ok(result) if result.authenticated => {
                    tracing::trace!(backend = backend.name(), username = %username, "Authentication successful");
                    return result;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "Authentication backend failed");
                    metrics::record_backend_failure(backend.name());
                }
            }
        }
        AuthResult::denied()
    }

    /// Probe every backend.
    pub async fn health(&self) -> Vec<BackendHealth> {
        let mut report = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            report.push(BackendHealth {
                name: backend.name().to_string(),
                healthy: backend.health_check().await,
            });
        }
        report
    }

    /// Drop expired cache entries.
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StaticBackend {
        name: &'static str,
        password: &'static str,
        groups: &'static [&'static str],
        calls: AtomicUsize,
        broken: bool,
    }

    impl StaticBackend {
        fn new(name: &'static str, password: &'static str, groups: &'static [&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                password,
                groups,
                calls: AtomicUsize::new(0),
                broken: false,
            })
        }

        fn broken(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                password: "",
                groups: &[],
                calls: AtomicUsize::new(0),
                broken: true,
            })
        }
    }

    #[async_trait]
    impl AuthBackend for StaticBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn authenticate(&self, _username: &str, password: &str) -> Result<AuthResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(BackendError::Hash("boom".into()));
            }
            if password == self.password {
                Ok(AuthResult::success(self.groups.iter().copied()))
            } else {
                Ok(AuthResult::denied())
            }
        }

        async fn health_check(&self) -> bool {
            !self.broken
        }
    }

    fn authenticator(backends: Vec<Arc<dyn AuthBackend>>, clock: &ManualClock) -> Authenticator {
        Authenticator::new(backends, Duration::from_secs(15), Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_first_successful_backend_wins() {
        let clock = ManualClock::new();
        let first = StaticBackend::new("first", "one", &["a"]);
        let second = StaticBackend::new("second", "two", &["b"]);
        let auth = authenticator(vec![first.clone(), second.clone()], &clock);

        let result = auth.authenticate_any("alice", "two").await;
        assert!(result.authenticated);
        assert!(result.groups.contains("b"));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);

        let result = auth.authenticate_any("alice", "one").await;
        assert!(result.groups.contains("a"));
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backend_errors_fall_through() {
        let clock = ManualClock::new();
        let broken = StaticBackend::broken("broken");
        let good = StaticBackend::new("good", "pw", &[]);
        let auth = authenticator(vec![broken, good], &clock);
        assert!(auth.authenticate_any("alice", "pw").await.authenticated);
    }

    #[tokio::test]
    async fn test_no_backends_fail_closed() {
        let clock = ManualClock::new();
        let auth = authenticator(Vec::new(), &clock);
        assert_eq!(auth.authenticate("alice", "pw").await, AuthResult::denied());
    }

    #[tokio::test]
    async fn test_cache_invokes_backends_once_per_ttl() {
        let clock = ManualClock::new();
        let backend = StaticBackend::new("only", "pw", &["staff"]);
        let auth = authenticator(vec![backend.clone()], &clock);

        for _ in 0..5 {
            assert!(auth.authenticate("alice", "pw").await.authenticated);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        // Negative results are cached too
        for _ in 0..3 {
            assert!(!auth.authenticate("alice", "bad").await.authenticated);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(15));
        assert!(auth.authenticate("alice", "pw").await.authenticated);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_credential_key_depends_on_both_fields() {
        let clock = ManualClock::new();
        let auth = authenticator(Vec::new(), &clock);
        let key = auth.credential_key("alice", "pw");
        assert_eq!(key, auth.credential_key("alice", "pw"));
        assert_ne!(key, auth.credential_key("alice", "pw2"));
        assert_ne!(key, auth.credential_key("bob", "pw"));
        // Field boundaries cannot be shifted
        assert_ne!(auth.credential_key("ab", "c"), auth.credential_key("a", "bc"));
    }

    #[tokio::test]
    async fn test_health_reports_each_backend() {
        let clock = ManualClock::new();
        let auth = authenticator(
            vec![StaticBackend::new("good", "pw", &[]), StaticBackend::broken("bad")],
            &clock,
        );
        let report = auth.health().await;
        assert_eq!(report.len(), 2);
        assert!(report[0].healthy);
        assert!(!report[1].healthy);
    }
}
