//! Rule resolution for a request.
//!
//! # Responsibilities
//! - Own the default rule set for the process lifetime
//! - Swap in an ingress-supplied rule set when trusted
//! - Memoize lookups for requests without an override
//!
//! # Design Decisions
//! - The default rule set is immutable and shared without locking
//! - Override rules are parsed per request and never stored
//! - Requests carrying an override header bypass the lookup cache entirely, so
//!   a cached action can never leak between different override payloads

use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::context::ClientContext;
use crate::rules::parser::parse_rules;
use crate::rules::rule::{Action, RuleSet};

/// Header carrying override rules from the ingress.
pub const X_AUTHORIZATION_RULES: &str = "x-authorization-rules";
/// Header carrying the shared secret that authenticates override rules.
pub const X_EXTERNAL_AUTH_SECRET: &str = "x-external-auth-secret";

/// Whether and how ingress-supplied rules are trusted.
#[derive(Clone)]
pub struct OverridePolicy {
    pub enabled: bool,
    pub secret: String,
}

impl OverridePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
        }
    }

    fn secret_matches(&self, presented: Option<&str>) -> bool {
        match presented {
            Some(presented) if !self.secret.is_empty() => {
                bool::from(presented.as_bytes().ct_eq(self.secret.as_bytes()))
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for OverridePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverridePolicy")
            .field("enabled", &self.enabled)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Override material presented with a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideRequest<'a> {
    pub rules: Option<&'a str>,
    pub secret: Option<&'a str>,
}

/// Resolves the action that applies to a request.
#[derive(Debug)]
pub struct RuleEngine {
    default_rules: Arc<RuleSet>,
    overrides: OverridePolicy,
    cache: TtlCache<ClientContext, Action>,
}

impl RuleEngine {
    pub fn new(
        default_rules: RuleSet,
        overrides: OverridePolicy,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            default_rules: Arc::new(default_rules),
            overrides,
            cache: TtlCache::new(cache_ttl, clock),
        }
    }

    pub fn default_rules(&self) -> &RuleSet {
        &self.default_rules
    }

    /// Resolve the action for `ctx`, honoring a trusted override.
    pub fn resolve(&self, ctx: &ClientContext, request: OverrideRequest<'_>) -> Action {
        if self.overrides.enabled && request.rules.is_some() {
            return match self.trusted_override(ctx, request) {
                Some(rules) => {
                    let action = rules.resolve(ctx).clone();
                    tracing::debug!(
                        host = %ctx.host,
                        ip = %ctx.ip,
                        method = %ctx.method,
                        path = %ctx.path,
                        action = %action,
                        "Resolved action from ingress rules"
                    );
                    action
                }
                None => self.lookup(ctx),
            };
        }

        if let Some(action) = self.cache.get(ctx) {
            return action;
        }
        let action = self.lookup(ctx);
        self.cache.insert(ctx.clone(), action.clone());
        action
    }

    /// Ephemeral rule set from the request, if its secret checks out and it parses.
    fn trusted_override(&self, ctx: &ClientContext, request: OverrideRequest<'_>) -> Option<RuleSet> {
        let payload = request.rules?;

        if !self.overrides.secret_matches(request.secret) {
            tracing::warn!(
                host = %ctx.host,
                "Ignoring authorization rules from ingress: secret is missing or invalid"
            );
            return None;
        }

        match parse_rules(payload) {
            Ok(rules) if !rules.is_empty() => {
                tracing::info!(host = %ctx.host, rules = rules.len(), "Using authorization rules provided by ingress");
                Some(rules)
            }
            Ok(_) => {
                tracing::debug!(host = %ctx.host, "Ingress supplied no authorization rules");
                None
            }
            Err(e) => {
                tracing::warn!(host = %ctx.host, error = %e, "Ignoring malformed authorization rules from ingress");
                None
            }
        }
    }

    fn lookup(&self, ctx: &ClientContext) -> Action {
        let rule = self.default_rules.find_rule(ctx);
        match rule {
            Some(rule) => tracing::debug!(
                host = %ctx.host,
                ip = %ctx.ip,
                method = %ctx.method,
                path = %ctx.path,
                rule = %rule,
                "Matched authorization rule"
            ),
            None => tracing::debug!(
                host = %ctx.host,
                ip = %ctx.ip,
                method = %ctx.method,
                path = %ctx.path,
                "No authorization rule matched, authentication required"
            ),
        }
        rule.map(|r| r.action.clone())
            .unwrap_or_else(|| self.default_rules.default_action().clone())
    }

    /// Drop expired lookup cache entries.
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rules::parser::parse_rules;

    const SECRET: &str = "s3cr3t";

    fn engine(enabled: bool) -> RuleEngine {
        let rules = parse_rules("* /public/* * * public").unwrap();
        RuleEngine::new(
            rules,
            OverridePolicy {
                enabled,
                secret: SECRET.to_string(),
            },
            Duration::from_secs(15),
            Arc::new(ManualClock::new()),
        )
    }

    fn ctx(path: &str) -> ClientContext {
        ClientContext::new("app.example.com", "10.0.0.1", "GET", path)
    }

    const FORBID_ALL: &str = "* * * * forbidden";

    #[test]
    fn test_default_rules_without_override() {
        let engine = engine(true);
        assert_eq!(engine.resolve(&ctx("/public/a"), OverrideRequest::default()), Action::Public);
        assert_eq!(
            engine.resolve(&ctx("/private"), OverrideRequest::default()),
            Action::authenticated()
        );
    }

    #[test]
    fn test_trusted_override_replaces_default_rules() {
        let engine = engine(true);
        let request = OverrideRequest {
            rules: Some(FORBID_ALL),
            secret: Some(SECRET),
        };
        assert_eq!(engine.resolve(&ctx("/public/a"), request), Action::Forbidden);
    }

    #[test]
    fn test_wrong_or_missing_secret_falls_back() {
        let engine = engine(true);
        let wrong = OverrideRequest {
            rules: Some(FORBID_ALL),
            secret: Some("nope"),
        };
        assert_eq!(engine.resolve(&ctx("/public/a"), wrong), Action::Public);

        let missing = OverrideRequest {
            rules: Some(FORBID_ALL),
            secret: None,
        };
        assert_eq!(engine.resolve(&ctx("/public/a"), missing), Action::Public);
    }

    #[test]
    fn test_disabled_feature_ignores_override_even_with_secret() {
        let engine = engine(false);
        let request = OverrideRequest {
            rules: Some(FORBID_ALL),
            secret: Some(SECRET),
        };
        assert_eq!(engine.resolve(&ctx("/public/a"), request), Action::Public);
    }

    #[test]
    fn test_malformed_override_falls_back() {
        let engine = engine(true);
        let request = OverrideRequest {
            rules: Some("this is not a rule"),
            secret: Some(SECRET),
        };
        assert_eq!(engine.resolve(&ctx("/public/a"), request), Action::Public);
    }

    #[test]
    fn test_override_never_served_from_or_stored_in_cache() {
        let engine = engine(true);
        let path = ctx("/public/a");

        // Populate the cache via a plain request
        assert_eq!(engine.resolve(&path, OverrideRequest::default()), Action::Public);

        let forbid = OverrideRequest {
            rules: Some(FORBID_ALL),
            secret: Some(SECRET),
        };
        assert_eq!(engine.resolve(&path, forbid), Action::Forbidden);

        let restrict = OverrideRequest {
            rules: Some("* * * * restrict groups=ops"),
            secret: Some(SECRET),
        };
        assert_eq!(
            engine.resolve(&path, restrict),
            Action::restrict_to(Vec::<String>::new(), ["ops"])
        );

        // Plain request still sees the default
        assert_eq!(engine.resolve(&path, OverrideRequest::default()), Action::Public);
    }

    #[test]
    fn test_empty_secret_never_matches() {
        let policy = OverridePolicy {
            enabled: true,
            secret: String::new(),
        };
        assert!(!policy.secret_matches(Some("")));
        assert!(!policy.secret_matches(None));
    }
}
