//! Textual rule definitions.
//!
//! One rule per entry; entries are separated by newlines or `;` so the same
//! grammar works in a file and inline in a header value.
//!
//! ```text
//! # host          path        methods   ips          action    [options]
//! *               /health     GET       *            public
//! *.example.com   /admin/*    *         10.0.0.0/8   restrict  groups=admins
//! *               /internal*  *         *            forbidden
//! app.example.com *           GET,HEAD  *            restrict  users=alice,bob groups=ops
//! ```

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::rules::matcher::{IpAllowlist, MethodSet, Pattern};
use crate::rules::rule::{Action, Rule, RuleSet};

/// A rule entry that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct RuleParseError {
    pub line: usize,
    pub message: String,
}

/// Errors loading a rules file.
#[derive(Debug, Error)]
pub enum RulesFileError {
    #[error("cannot read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid rules file: {0}")]
    Parse(#[from] RuleParseError),
}

/// Parse rule definitions.
pub fn parse_rules(input: &str) -> Result<RuleSet, RuleParseError> {
    let mut rules = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        // A comment runs to the end of the line, separators included
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        for entry in line.split(';') {
            if entry.trim().is_empty() {
                continue;
            }
            let rule = parse_entry(entry).map_err(|message| RuleParseError {
                line: line_no,
                message,
            })?;
            rules.push(rule);
        }
    }

    Ok(RuleSet::new(rules))
}

/// Load and parse a rules file.
pub fn load_rules_file(path: &Path) -> Result<RuleSet, RulesFileError> {
    let content = fs::read_to_string(path)?;
    Ok(parse_rules(&content)?)
}

fn split_list(value: &str) -> Vec<&str> {
    if value.trim() == "*" {
        return Vec::new();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_entry(entry: &str) -> Result<Rule, String> {
    let fields: Vec<&str> = entry.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(format!(
            "expected '<host> <path> <methods> <ips> <action>', got {:?}",
            entry.trim()
        ));
    }

    let host = Pattern::parse_host(fields[0])?;
    let path = Pattern::parse(fields[1])?;
    let methods = MethodSet::new(split_list(fields[2]));
    let ips = IpAllowlist::parse(split_list(fields[3]))?;
    let action = parse_action(fields[4], &fields[5..])?;

    Ok(Rule {
        host,
        path,
        methods,
        ips,
        action,
    })
}

fn parse_action(keyword: &str, options: &[&str]) -> Result<Action, String> {
    match keyword.to_ascii_lowercase().as_str() {
        "public" | "forbidden" | "deny" if !options.is_empty() => Err(format!(
            "action '{}' takes no options, got {:?}",
            keyword,
            options.join(" ")
        )),
        "public" => Ok(Action::Public),
        "forbidden" | "deny" => Ok(Action::Forbidden),
        "restrict" | "authenticated" => {
            let mut users = Vec::new();
            let mut groups = Vec::new();
            for option in options {
                match option.split_once('=') {
                    Some(("users", list)) => users.extend(split_list(list)),
                    Some(("groups", list)) => groups.extend(split_list(list)),
                    _ => return Err(format!("unknown option {:?}", option)),
                }
            }
            Ok(Action::restrict_to(users, groups))
        }
        other => Err(format!("unknown action {:?}", other)),
    }
}
