//! Directory service backend.
//!
//! # Verification
//! ```text
//! manager credentials configured:
//!     bind as manager → search user under search_base → re-bind as user DN
//! otherwise:
//!     bind as bind_dn with {username} substituted → search own entry
//! ```
//! Groups are the `cn` of each `memberOf` value on the user entry.
//!
//! Every directory operation carries the configured timeout; a hung server
//! surfaces as a backend error rather than a stuck request.

use async_trait::async_trait;
use ldap3::{dn_escape, ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::auth::backend::{AuthBackend, AuthResult, BackendError};
use crate::config::schema::LdapConfig;

const MEMBER_OF: &str = "memberOf";
const USERNAME_PLACEHOLDER: &str = "{username}";

/// Verifies credentials by binding against an LDAP server.
pub struct LdapBackend {
    server_url: String,
    bind_dn: Option<String>,
    search_base: String,
    search_filter: String,
    manager: Option<(String, String)>,
    timeout: Duration,
}

impl std::fmt::Debug for LdapBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapBackend")
            .field("server_url", &self.server_url)
            .field("bind_dn", &self.bind_dn)
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("manager_dn", &self.manager.as_ref().map(|(dn, _)| dn))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LdapBackend {
    /// Build the backend; `None` when no server URL is configured.
    pub fn from_config(config: &LdapConfig) -> Option<Self> {
        let server_url = config.server_url.clone().filter(|u| !u.is_empty())?;
        let manager = match (&config.manager_dn, &config.manager_password) {
            (Some(dn), Some(password)) if !dn.is_empty() => Some((dn.clone(), password.clone())),
            _ => None,
        };

        Some(Self {
            server_url,
            bind_dn: config.bind_dn.clone().filter(|d| !d.is_empty()),
            search_base: config.search_base.clone().unwrap_or_default(),
            search_filter: config.search_filter.clone(),
            manager,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn connect(&self) -> Result<Ldap, BackendError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.server_url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "LDAP connection terminated");
            }
        });
        Ok(ldap)
    }

    fn user_filter(&self, username: &str) -> String {
        self.search_filter
            .replace(USERNAME_PLACEHOLDER, &ldap_escape(username))
    }

    /// Find the user's entry; `None` unless exactly one entry matches.
    async fn find_user(&self, ldap: &mut Ldap, username: &str) -> Result<Option<SearchEntry>, BackendError> {
        let filter = self.user_filter(username);
        let (entries, _) = ldap
            .with_timeout(self.timeout)
            .search(&self.search_base, Scope::Subtree, &filter, vec![MEMBER_OF])
            .await?
            .success()?;

        if entries.len() != 1 {
            tracing::debug!(username = %username, matches = entries.len(), "LDAP user search did not yield a unique entry");
            return Ok(None);
        }
        Ok(entries.into_iter().next().map(SearchEntry::construct))
    }

    /// Returns false when the server rejected the credential.
    async fn bind(&self, ldap: &mut Ldap, dn: &str, password: &str) -> Result<bool, BackendError> {
        let result = ldap.with_timeout(self.timeout).simple_bind(dn, password).await?;
        Ok(result.rc == 0)
    }

    async fn verify(&self, ldap: &mut Ldap, username: &str, password: &str) -> Result<AuthResult, BackendError> {
        if let Some((manager_dn, manager_password)) = &self.manager {
            if !self.bind(ldap, manager_dn, manager_password).await? {
                return Err(BackendError::ServiceBind(manager_dn.clone()));
            }

            let Some(entry) = self.find_user(ldap, username).await? else {
                return Ok(AuthResult::denied());
            };
            if !self.bind(ldap, &entry.dn, password).await? {
                return Ok(AuthResult::denied());
            }
            return Ok(AuthResult::success(groups_of(&entry)));
        }

        let Some(template) = &self.bind_dn else {
            tracing::warn!("LDAP backend has neither manager credentials nor a bind DN");
            return Ok(AuthResult::denied());
        };
        let user_dn = template.replace(USERNAME_PLACEHOLDER, &dn_escape(username));
        if !self.bind(ldap, &user_dn, password).await? {
            return Ok(AuthResult::denied());
        }

        let groups = match self.find_user(ldap, username).await {
            Ok(Some(entry)) => groups_of(&entry),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "LDAP group lookup failed");
                BTreeSet::new()
            }
        };
        Ok(AuthResult {
            authenticated: true,
            groups,
        })
    }
}

#[async_trait]
impl AuthBackend for LdapBackend {
    fn name(&self) -> &str {
        "ldap"
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthResult, BackendError> {
        // An empty password would be an unauthenticated bind, which servers accept
        if username.is_empty() || password.is_empty() {
            return Ok(AuthResult::denied());
        }

        let mut ldap = self.connect().await?;
        let result = self.verify(&mut ldap, username, password).await;
        if let Err(e) = ldap.unbind().await {
            tracing::debug!(server = %self.server_url, error = %e, "LDAP unbind failed");
        }
        result
    }

    async fn health_check(&self) -> bool {
        let mut ldap = match self.connect().await {
            Ok(ldap) => ldap,
            Err(e) => {
                tracing::warn!(server = %self.server_url, error = %e, "LDAP backend unreachable");
                return false;
            }
        };

        let (dn, password) = match &self.manager {
            Some((dn, password)) => (dn.as_str(), password.as_str()),
            None => ("", ""),
        };
        let healthy = match self.bind(&mut ldap, dn, password).await {
            Ok(bound) => bound,
            Err(e) => {
                tracing::warn!(server = %self.server_url, error = %e, "LDAP health bind failed");
                false
            }
        };
        if let Err(e) = ldap.unbind().await {
            tracing::debug!(server = %self.server_url, error = %e, "LDAP unbind failed");
        }
        healthy
    }
}

fn groups_of(entry: &SearchEntry) -> BTreeSet<String> {
    entry
        .attrs
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(MEMBER_OF))
        .flat_map(|(_, values)| values.iter())
        .map(|dn| group_name(dn))
        .collect()
}

/// `cn=admins,ou=groups,dc=example,dc=org` → `admins`.
fn group_name(dn: &str) -> String {
    let first = dn.split(',').next().unwrap_or(dn).trim();
    match first.split_once('=') {
        Some((attr, value)) if attr.trim().eq_ignore_ascii_case("cn") => value.trim().to_string(),
        _ => dn.to_string(),
    }
}
