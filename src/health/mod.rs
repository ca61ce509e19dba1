//! Health reporting.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → probe every authentication backend (in configured order)
//!     → HealthReport { status, backends: [{name, healthy}] }
//!     → 200 when all backends are healthy, 503 otherwise
//! ```
//!
//! # Design Decisions
//! - Probes run on demand; nothing is cached between calls
//! - A service with no backends reports healthy (it still answers public
//!   and forbidden decisions)

use serde::Serialize;

use crate::auth::{Authenticator, BackendHealth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub backends: Vec<BackendHealth>,
}

impl HealthReport {
    pub fn from_backends(backends: Vec<BackendHealth>) -> Self {
        let status = if backends.iter().all(|b| b.healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self { status, backends }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Probe every backend of `authenticator`.
pub async fn check(authenticator: &Authenticator) -> HealthReport {
    let report = HealthReport::from_backends(authenticator.health().await);
    if !report.is_healthy() {
        let unhealthy: Vec<&str> = report
            .backends
            .iter()
            .filter(|b| !b.healthy)
            .map(|b| b.name.as_str())
            .collect();
        tracing::warn!(backends = ?unhealthy, "Health check found unhealthy backends");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, healthy: bool) -> BackendHealth {
        BackendHealth {
            name: name.to_string(),
            healthy,
        }
    }

    #[test]
    fn test_all_healthy() {
        let report = HealthReport::from_backends(vec![backend("htpasswd", true), backend("ldap", true)]);
        assert!(report.is_healthy());
    }

    #[test]
    fn test_any_unhealthy() {
        let report = HealthReport::from_backends(vec![backend("htpasswd", true), backend("ldap", false)]);
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_serialized_shape() {
        let report = HealthReport::from_backends(vec![backend("htpasswd", false)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "unhealthy",
                "backends": [{"name": "htpasswd", "healthy": false}]
            })
        );
    }

    #[test]
    fn test_no_backends_is_healthy() {
        assert!(HealthReport::from_backends(Vec::new()).is_healthy());
    }
}
