//! Authorization rules subsystem.
//!
//! # Data Flow
//! ```text
//! rules file / X-Authorization-Rules header
//!     → parser.rs (entries → Rule)
//!     → RuleSet (ordered, immutable)
//!
//! Per request:
//!     ClientContext
//!     → engine.rs (default or trusted override rule set, lookup cache)
//!     → rule.rs (first match wins; default = authenticated)
//!     → Action (public / forbidden / restrict)
//! ```
//!
//! # Design Decisions
//! - First match, never best or longest match
//! - No regex: exact, prefix and suffix patterns only
//! - Authorization (`Action::authorize`) is separate from resolution so the
//!   pipeline can skip authentication for public and forbidden requests

pub mod engine;
pub mod matcher;
pub mod parser;
pub mod rule;

pub use engine::{OverridePolicy, OverrideRequest, RuleEngine, X_AUTHORIZATION_RULES, X_EXTERNAL_AUTH_SECRET};
pub use matcher::{IpAllowlist, MethodSet, Pattern};
pub use parser::{load_rules_file, parse_rules, RuleParseError, RulesFileError};
pub use rule::{Action, Authorization, Rule, RuleSet};
