//! Rules, actions and ordered rule sets.

use std::collections::BTreeSet;
use std::fmt;

use crate::context::ClientContext;
use crate::rules::matcher::{IpAllowlist, MethodSet, Pattern};

/// What to do with a request matched by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No authentication required.
    Public,
    /// Always rejected.
    Forbidden,
    /// Authentication required; allowed for the listed users or members of
    /// the listed groups. Both empty means any authenticated user.
    RestrictTo {
        users: BTreeSet<String>,
        groups: BTreeSet<String>,
    },
}

/// Outcome of authorizing an authenticated user against an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub allowed: bool,
    pub matched_groups: BTreeSet<String>,
}

impl Authorization {
    fn denied() -> Self {
        Self {
            allowed: false,
            matched_groups: BTreeSet::new(),
        }
    }

    fn allowed(matched_groups: BTreeSet<String>) -> Self {
        Self {
            allowed: true,
            matched_groups,
        }
    }
}

impl Action {
    /// Authenticated, no user or group restriction.
    pub fn authenticated() -> Self {
        Self::RestrictTo {
            users: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    pub fn restrict_to<U, G>(users: U, groups: G) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self::RestrictTo {
            users: users.into_iter().map(Into::into).collect(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden)
    }

    /// Decide whether `username` with `user_groups` may proceed.
    ///
    /// `matched_groups` is the intersection of the user's groups with the
    /// allowed groups; it is empty when access was granted by username alone.
    pub fn authorize<'a, I>(&self, username: &str, user_groups: I) -> Authorization
    where
        I: IntoIterator<Item = &'a String>,
    {
        match self {
            Self::Public => Authorization::allowed(BTreeSet::new()),
            Self::Forbidden => Authorization::denied(),
            Self::RestrictTo { users, groups } => {
                if users.is_empty() && groups.is_empty() {
                    return Authorization::allowed(BTreeSet::new());
                }

                let matched: BTreeSet<String> = user_groups
                    .into_iter()
                    .filter(|g| groups.contains(*g))
                    .cloned()
                    .collect();

                if users.contains(username) || !matched.is_empty() {
                    Authorization::allowed(matched)
                } else {
                    Authorization::denied()
                }
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::RestrictTo { users, groups } => {
                write!(f, "restrict")?;
                if !users.is_empty() {
                    let users: Vec<&str> = users.iter().map(String::as_str).collect();
                    write!(f, " users={}", users.join(","))?;
                }
                if !groups.is_empty() {
                    let groups: Vec<&str> = groups.iter().map(String::as_str).collect();
                    write!(f, " groups={}", groups.join(","))?;
                }
                Ok(())
            }
        }
    }
}

/// A single match-and-action entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub host: Pattern,
    pub path: Pattern,
    pub methods: MethodSet,
    pub ips: IpAllowlist,
    pub action: Action,
}

impl Rule {
    /// A rule matching every request.
    pub fn new(action: Action) -> Self {
        Self {
            host: Pattern::Any,
            path: Pattern::Any,
            methods: MethodSet::any(),
            ips: IpAllowlist::any(),
            action,
        }
    }

    pub fn host(mut self, host: Pattern) -> Self {
        self.host = host;
        self
    }

    pub fn path(mut self, path: Pattern) -> Self {
        self.path = path;
        self
    }

    pub fn methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }

    pub fn ips(mut self, ips: IpAllowlist) -> Self {
        self.ips = ips;
        self
    }

    /// All conditions must hold.
    pub fn matches(&self, ctx: &ClientContext) -> bool {
        self.host.matches(&ctx.host.to_ascii_lowercase())
            && self.path.matches(&ctx.path)
            && self.methods.matches(&ctx.method)
            && self.ips.matches(&ctx.ip)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.host, self.path, self.methods, self.ips, self.action
        )
    }
}

/// Ordered rules with a no-match default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default_action: Action,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RuleSet {
    /// Rules in evaluation order; unmatched requests require authentication.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            default_action: Action::authenticated(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn default_action(&self) -> &Action {
        &self.default_action
    }

    /// First rule whose conditions all match, in declared order.
    pub fn find_rule(&self, ctx: &ClientContext) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(ctx))
    }

    /// Action of the first matching rule, or the default.
    pub fn resolve(&self, ctx: &ClientContext) -> &Action {
        self.find_rule(ctx)
            .map(|rule| &rule.action)
            .unwrap_or(&self.default_action)
    }
}
