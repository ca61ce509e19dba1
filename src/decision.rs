//! The authorization decision pipeline.
//!
//! # Data Flow
//! ```text
//! decision request
//!     → ClientContext::resolve        (500 if X-Original-URL is unusable)
//!     → RuleEngine::resolve
//!         Forbidden → 403
//!         Public    → 200
//!     → Basic credential present?     (401 + WWW-Authenticate if not)
//!     → BruteForceTracker::is_blocked (429, credentials never checked)
//!     → Authenticator::authenticate
//!         failure → add_failure → 429 if this failure blocked the client, else 401
//!     → Action::authorize             (403 if not allowed)
//!     → 200 with username and matched groups
//! ```

use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::Authenticator;
use crate::context::{ClientContext, ContextError};
use crate::observability::metrics;
use crate::rules::{Action, OverrideRequest, RuleEngine, X_AUTHORIZATION_RULES, X_EXTERNAL_AUTH_SECRET};
use crate::security::BruteForceTracker;

/// Realm advertised on 401 responses.
pub const REALM: &str = "External Authentication";

/// Internal failures; rendered as 500.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// The verdict for one decision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub status: StatusCode,
    pub username: Option<String>,
    pub matched_groups: BTreeSet<String>,
}

impl AuthorizationDecision {
    fn status(status: StatusCode) -> Self {
        Self {
            status,
            username: None,
            matched_groups: BTreeSet::new(),
        }
    }

    fn allowed(username: String, matched_groups: BTreeSet<String>) -> Self {
        Self {
            status: StatusCode::OK,
            username: Some(username),
            matched_groups,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Value for `WWW-Authenticate`, present only on challenges.
    pub fn challenge(&self) -> Option<String> {
        (self.status == StatusCode::UNAUTHORIZED).then(|| format!("Basic realm=\"{}\"", REALM))
    }
}

/// A username and password taken from a Basic `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredential {
    /// Parse `Authorization: Basic <base64(user:password)>`.
    ///
    /// Anything malformed is treated as no credential at all.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        if username.is_empty() {
            return None;
        }

        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Everything needed to answer a decision request.
#[derive(Debug)]
pub struct DecisionPipeline {
    rules: Arc<RuleEngine>,
    authenticator: Arc<Authenticator>,
    brute_force: Arc<BruteForceTracker>,
}

impl DecisionPipeline {
    pub fn new(
        rules: Arc<RuleEngine>,
        authenticator: Arc<Authenticator>,
        brute_force: Arc<BruteForceTracker>,
    ) -> Self {
        Self {
            rules,
            authenticator,
            brute_force,
        }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn brute_force(&self) -> &BruteForceTracker {
        &self.brute_force
    }

    /// Decide a request from its raw parts.
    pub async fn decide(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<AuthorizationDecision, DecisionError> {
        let ctx = ClientContext::resolve(method, uri, headers, peer)?;
        let decision = self.decide_for(&ctx, headers).await;
        metrics::record_auth_request(&ctx.host, decision.status.as_u16());
        Ok(decision)
    }

    /// Decide for an already resolved context.
    pub async fn decide_for(&self, ctx: &ClientContext, headers: &HeaderMap) -> AuthorizationDecision {
        let overrides = OverrideRequest {
            rules: header_str(headers, X_AUTHORIZATION_RULES),
            secret: header_str(headers, X_EXTERNAL_AUTH_SECRET),
        };

        let action = self.rules.resolve(ctx, overrides);
        match action {
            Action::Forbidden => {
                tracing::info!(host = %ctx.host, ip = %ctx.ip, path = %ctx.path, "Request forbidden by rule");
                return AuthorizationDecision::status(StatusCode::FORBIDDEN);
            }
            Action::Public => {
                tracing::debug!(host = %ctx.host, path = %ctx.path, "Public request");
                return AuthorizationDecision::status(StatusCode::OK);
            }
            Action::RestrictTo { .. } => {}
        }

        let Some(credential) = BasicCredential::from_headers(headers) else {
            tracing::debug!(host = %ctx.host, ip = %ctx.ip, "No credentials presented");
            return AuthorizationDecision::status(StatusCode::UNAUTHORIZED);
        };

        if self.brute_force.is_blocked(&ctx.ip) {
            tracing::info!(ip = %ctx.ip, username = %credential.username, "Rejected request from blocked client");
            return AuthorizationDecision::status(StatusCode::TOO_MANY_REQUESTS);
        }

        let result = self
            .authenticator
            .authenticate(&credential.username, &credential.password)
            .await;

        if !result.authenticated {
            if self.brute_force.add_failure(&ctx.ip) {
                tracing::warn!(ip = %ctx.ip, username = %credential.username, "Client blocked after repeated authentication failures");
                metrics::record_blocked_ip(&ctx.ip);
                return AuthorizationDecision::status(StatusCode::TOO_MANY_REQUESTS);
            }
            tracing::info!(ip = %ctx.ip, username = %credential.username, host = %ctx.host, "Authentication failed");
            return AuthorizationDecision::status(StatusCode::UNAUTHORIZED);
        }

        let authorization = action.authorize(&credential.username, &result.groups);
        if !authorization.allowed {
            tracing::info!(
                username = %credential.username,
                host = %ctx.host,
                path = %ctx.path,
                action = %action,
                "User not authorized for resource"
            );
            return AuthorizationDecision::status(StatusCode::FORBIDDEN);
        }

        tracing::debug!(username = %credential.username, host = %ctx.host, path = %ctx.path, "Request authorized");
        AuthorizationDecision::allowed(credential.username, authorization.matched_groups)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
