//! Parser for the v2fly domain-list member format.
//!
//! A member is a plain-text file of one directive per line:
//!
//! ```text
//! # comments start with a hash
//! domain:google.com          # suffix match (also the bare-line default)
//! full:analytics.google.com  # exact match
//! keyword:google             # substring match
//! regexp:^dl\.google\.com$   # regular expression
//! include:google-ads         # splice in another member
//! bare-domain.com @cn        # attribute tags filter per request
//! ```
//!
//! `include:` directives are resolved through a [`MemberSource`] and
//! parsed recursively with the same filter, carrying a visited set so a
//! cyclic chain fails instead of exhausting the stack.

use std::collections::HashSet;

use crate::archive::MemberSource;
use crate::error::{Error, Result};

/// The matching semantics of a parsed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// `domain:` prefix or a bare line; matches the domain and subdomains
    DomainSuffix,
    /// `full:` prefix; matches the exact domain only
    DomainExact,
    /// `keyword:` prefix; substring match
    DomainKeyword,
    /// `regexp:` prefix; regular expression match
    DomainRegex,
}

/// One matching directive with its trailing tag/comment region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    pub value: String,
    /// Raw text after the first space, e.g. `@cn` or `@ads # tracker`.
    pub comment: String,
}

/// One parsed line, order-preserving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Rule(Rule),
    Comment(String),
}

impl Item {
    pub fn is_rule(&self) -> bool {
        matches!(self, Item::Rule(_))
    }
}

/// Recursive member parser.
pub struct Parser<'a> {
    source: &'a dyn MemberSource,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a dyn MemberSource) -> Self {
        Self { source }
    }

    /// Parse member text into an ordered item sequence.
    ///
    /// With a non-empty `filter`, only rule lines tagged `@<filter>` ahead
    /// of any `#` in their trailing region survive; comments always pass.
    pub fn parse(&self, text: &str, filter: &str) -> Result<Vec<Item>> {
        let mut visited = HashSet::new();
        self.parse_member(text, filter, &mut visited)
    }

    fn parse_member(
        &self,
        text: &str,
        filter: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<Item>> {
        let mut items = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('#') {
                items.push(Item::Comment(line.to_string()));
                continue;
            }

            if line.starts_with("include:") {
                items.extend(self.parse_include(line, filter, visited)?);
                continue;
            }

            let (prefix, kind) = match line {
                l if l.starts_with("domain:") => ("domain:", RuleKind::DomainSuffix),
                l if l.starts_with("full:") => ("full:", RuleKind::DomainExact),
                l if l.starts_with("keyword:") => ("keyword:", RuleKind::DomainKeyword),
                l if l.starts_with("regexp:") => ("regexp:", RuleKind::DomainRegex),
                _ => ("", RuleKind::DomainSuffix),
            };
            if let Some(rule) = parse_rule_line(line, prefix, kind, filter) {
                items.push(Item::Rule(rule));
            }
        }

        Ok(items)
    }

    fn parse_include(
        &self,
        line: &str,
        filter: &str,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<Item>> {
        let token = line.split(' ').next().unwrap_or(line);
        let name = token.trim_start_matches("include:");
        if name.is_empty() {
            return Err(Error::Format(format!("empty include directive: {line}")));
        }
        if !visited.insert(name.to_string()) {
            return Err(Error::CyclicInclude(name.to_string()));
        }

        let content = self.source.member(name)?;
        let sub_items = self.parse_member(&content, filter, visited);
        // Pop so diamond-shaped include graphs stay legal; only a chain
        // that is still on the current path counts as a cycle.
        visited.remove(name);
        let sub_items = sub_items?;

        if !sub_items.iter().any(Item::is_rule) {
            return Ok(Vec::new());
        }

        let mut items = Vec::with_capacity(sub_items.len() + 1);
        items.push(Item::Comment(format!("# {line}")));
        items.extend(sub_items);
        Ok(items)
    }
}

fn parse_rule_line(line: &str, prefix: &str, kind: RuleKind, filter: &str) -> Option<Rule> {
    let (token, rest) = match line.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (line, ""),
    };
    let value = token.strip_prefix(prefix).unwrap_or(token);
    if value.is_empty() {
        return None;
    }
    if !matches_filter(rest, filter) {
        return None;
    }

    Some(Rule {
        kind,
        value: value.to_string(),
        comment: rest.to_string(),
    })
}

/// Attribute filter: the trailing region must carry `@<filter>` before any
/// `#` comment marker. An empty filter passes everything.
fn matches_filter(rest: &str, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }

    let trimmed = rest.trim();
    if !trimmed.starts_with('@') {
        return false;
    }

    let tag = format!("@{filter}");
    let comment_idx = trimmed.find('#');
    match trimmed.find(&tag) {
        None => false,
        Some(tag_idx) => !matches!(comment_idx, Some(c) if c < tag_idx),
    }
}
