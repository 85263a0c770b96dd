//! Renderers for the three output dialects.
//!
//! Surge and Mihomo are line-oriented and share one traversal: comments
//! are buffered and flushed only when a real rule follows them, so a
//! filtered-out section never leaves an orphaned header behind. Include
//! echo comments are buffered separately and always flushed ahead of an
//! ordinary pending comment. Egern is a structured YAML form that groups
//! rules by kind and drops trailing comments entirely.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::parser::{Item, Rule, RuleKind};
use crate::wildcard::{is_dangerous_regex, regex_to_wildcard};

/// Matches translations that consist of nothing but wildcard characters.
static PURE_WILDCARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[?*]+$").unwrap());

/// One supported output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Surge ruleset; regex rules are translated to `DOMAIN-WILDCARD`
    Surge,
    /// Mihomo classical ruleset; supports `DOMAIN-REGEX` natively
    Mihomo,
    /// Egern ruleset YAML; rules grouped by kind
    Egern,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Surge => "surge",
            Dialect::Mihomo => "mihomo",
            Dialect::Egern => "egern",
        }
    }

    /// Response content type for this dialect.
    pub fn content_type(&self) -> &'static str {
        match self {
            Dialect::Egern => "text/yaml; charset=utf-8",
            _ => "text/plain; charset=utf-8",
        }
    }

    /// Parse a dialect from a string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "surge" => Some(Dialect::Surge),
            "mihomo" => Some(Dialect::Mihomo),
            "egern" => Some(Dialect::Egern),
            _ => None,
        }
    }
}

/// Render a parsed item sequence into the given dialect.
pub fn render(items: &[Item], dialect: Dialect) -> Result<String> {
    match dialect {
        Dialect::Surge => Ok(render_lines(items, render_surge_rule)),
        Dialect::Mihomo => Ok(render_lines(items, render_mihomo_rule)),
        Dialect::Egern => render_egern(items),
    }
}

fn render_lines(items: &[Item], render_rule: fn(&Rule) -> String) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending_includes: Vec<String> = Vec::new();
    let mut pending_comment: Option<String> = None;

    for item in items {
        match item {
            Item::Comment(comment) => {
                if comment.trim_start().starts_with("# include:") {
                    pending_includes.push(comment.clone());
                } else {
                    pending_comment = Some(comment.clone());
                }
            }
            Item::Rule(rule) => {
                let line = render_rule(rule);
                if line.trim_start().starts_with('#') {
                    // A refused translation renders as a comment; it rides
                    // along to the next enabled rule like any other.
                    pending_comment = Some(line);
                    continue;
                }

                out.append(&mut pending_includes);
                if let Some(comment) = pending_comment.take() {
                    out.push(comment);
                }
                out.push(line);
            }
        }
    }

    out.join("\n")
}

fn render_surge_rule(rule: &Rule) -> String {
    match rule.kind {
        RuleKind::DomainSuffix => {
            append_comment(format!("DOMAIN-SUFFIX,{}", rule.value), &rule.comment)
        }
        RuleKind::DomainExact => append_comment(format!("DOMAIN,{}", rule.value), &rule.comment),
        RuleKind::DomainKeyword => {
            append_comment(format!("DOMAIN-KEYWORD,{}", rule.value), &rule.comment)
        }
        RuleKind::DomainRegex => {
            if is_dangerous_regex(&rule.value) {
                // Refused, but kept auditable as a disabled line.
                return append_comment(format!("# DANGEROUS-REGEX,{}", rule.value), &rule.comment);
            }
            let wildcard = regex_to_wildcard(&rule.value);
            if PURE_WILDCARD.is_match(&wildcard) {
                append_comment(
                    format!("# SKIPPED-DOMAIN-WILDCARD,{wildcard}"),
                    &rule.comment,
                )
            } else {
                append_comment(format!("DOMAIN-WILDCARD,{wildcard}"), &rule.comment)
            }
        }
    }
}

fn render_mihomo_rule(rule: &Rule) -> String {
    let line = match rule.kind {
        RuleKind::DomainSuffix => format!("DOMAIN-SUFFIX,{}", rule.value),
        RuleKind::DomainExact => format!("DOMAIN,{}", rule.value),
        RuleKind::DomainKeyword => format!("DOMAIN-KEYWORD,{}", rule.value),
        RuleKind::DomainRegex => format!("DOMAIN-REGEX,{}", rule.value),
    };
    append_comment(line, &rule.comment)
}

#[derive(Default, Serialize)]
struct EgernRuleset {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    domain_set: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    domain_suffix_set: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    domain_keyword_set: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    domain_regex_set: Vec<String>,
}

impl EgernRuleset {
    fn is_empty(&self) -> bool {
        self.domain_set.is_empty()
            && self.domain_suffix_set.is_empty()
            && self.domain_keyword_set.is_empty()
            && self.domain_regex_set.is_empty()
    }
}

fn render_egern(items: &[Item]) -> Result<String> {
    let mut ruleset = EgernRuleset::default();

    for item in items {
        let Item::Rule(rule) = item else { continue };
        let value = rule.value.clone();
        match rule.kind {
            RuleKind::DomainExact => ruleset.domain_set.push(value),
            RuleKind::DomainSuffix => ruleset.domain_suffix_set.push(value),
            RuleKind::DomainKeyword => ruleset.domain_keyword_set.push(value),
            RuleKind::DomainRegex => ruleset.domain_regex_set.push(value),
        }
    }

    if ruleset.is_empty() {
        return Ok(String::new());
    }
    let yaml = serde_yaml::to_string(&ruleset).map_err(|e| Error::Format(e.to_string()))?;
    Ok(yaml.trim_end().to_string())
}

fn append_comment(line: String, comment: &str) -> String {
    if comment.is_empty() {
        return line;
    }
    if comment.starts_with('#') {
        format!("{line} {comment}")
    } else {
        format!("{line} # {comment}")
    }
}
