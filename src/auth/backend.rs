//! Authentication backend abstraction.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Result of verifying a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResult {
    pub authenticated: bool,
    pub groups: BTreeSet<String>,
}

impl AuthResult {
    pub fn denied() -> Self {
        Self::default()
    }

    pub fn success<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authenticated: true,
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// A backend could not answer, as opposed to rejecting the credential.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("directory error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("directory refused service bind for {0}")]
    ServiceBind(String),

    #[error("password hash error: {0}")]
    Hash(String),

    #[error("verification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A pluggable credential verifier.
///
/// `authenticate` returns `Ok` with `authenticated: false` for a rejected
/// credential and `Err` only when the backend itself failed.
#[async_trait]
pub trait AuthBackend: Send + Sync + std::fmt::Debug {
    /// Short identifier for logs and metrics.
    fn name(&self) -> &str;

    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthResult, BackendError>;

    /// Whether the backend can currently serve requests.
    async fn health_check(&self) -> bool;
}
