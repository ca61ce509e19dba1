//! Rule match conditions.
//!
//! # Responsibilities
//! - Match host patterns (case-insensitive)
//! - Match path patterns (case-sensitive)
//! - Match request methods against a set
//! - Match client addresses against an allowlist of IPs/CIDRs
//!
//! # Design Decisions
//! - Empty condition = always matches (wildcard)
//! - One leading or trailing `*` at most; no regex, no globbing
//! - Unparseable client address never matches a non-empty allowlist

use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

/// A host or path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `*` or empty: matches anything.
    Any,
    /// Exact value.
    Exact(String),
    /// Trailing wildcard, e.g. `/api/*`.
    Prefix(String),
    /// Leading wildcard, e.g. `*.example.com`.
    Suffix(String),
}

impl Pattern {
    /// Parse a pattern allowing a single leading or trailing `*`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::Any);
        }

        let pattern = if let Some(rest) = s.strip_prefix('*') {
            Self::Suffix(rest.to_string())
        } else if let Some(head) = s.strip_suffix('*') {
            Self::Prefix(head.to_string())
        } else {
            Self::Exact(s.to_string())
        };

        let inner = match &pattern {
            Self::Exact(v) | Self::Prefix(v) | Self::Suffix(v) => v,
            Self::Any => "",
        };
        if inner.contains('*') {
            return Err(format!(
                "invalid pattern {:?}: only a single leading or trailing '*' is supported",
                s
            ));
        }

        Ok(pattern)
    }

    /// Parse a host pattern; hosts compare case-insensitively.
    pub fn parse_host(s: &str) -> Result<Self, String> {
        Self::parse(&s.to_ascii_lowercase())
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(p) => p == value,
            Self::Prefix(p) => value.starts_with(p.as_str()),
            Self::Suffix(p) => value.ends_with(p.as_str()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(p) => write!(f, "{}", p),
            Self::Prefix(p) => write!(f, "{}*", p),
            Self::Suffix(p) => write!(f, "*{}", p),
        }
    }
}

/// A set of HTTP methods, stored uppercase. Empty matches every method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet(BTreeSet<String>);

impl MethodSet {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, method: &str) -> bool {
        self.0.is_empty() || self.0.contains(&method.to_ascii_uppercase())
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "*");
        }
        let joined: Vec<&str> = self.0.iter().map(String::as_str).collect();
        write!(f, "{}", joined.join(","))
    }
}

/// Client addresses a rule applies to. Empty matches any client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowlist(Vec<IpNetwork>);

impl IpAllowlist {
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse single addresses (`10.0.0.1`) or CIDR blocks (`10.0.0.0/8`).
    pub fn parse<I, S>(entries: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut networks = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let network = if entry.contains('/') {
                entry
                    .parse::<IpNetwork>()
                    .map_err(|e| format!("invalid CIDR {:?}: {}", entry, e))?
            } else {
                entry
                    .parse::<IpAddr>()
                    .map(IpNetwork::from)
                    .map_err(|e| format!("invalid IP address {:?}: {}", entry, e))?
            };
            networks.push(network);
        }
        Ok(Self(networks))
    }

    pub fn matches(&self, ip: &str) -> bool {
        if self.0.is_empty() {
            return true;
        }
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.0.iter().any(|net| net.contains(addr)),
            Err(_) => false,
        }
    }
}

impl fmt::Display for IpAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "*");
        }
        let joined: Vec<String> = self.0.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", joined.join(","))
    }
}
