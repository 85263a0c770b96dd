//! rulecast - republishes the v2fly domain-list-community dataset as
//! proxy rulesets.
//!
//! The upstream dataset is a ZIP archive of plain-text domain lists that
//! can `include:` each other and tag individual lines with `@attributes`.
//! This crate keeps one archive snapshot fresh, resolves the list format,
//! and renders any member into one of three ruleset dialects:
//!
//! - **Surge**: line-oriented; `regexp:` rules are translated to
//!   `DOMAIN-WILDCARD` patterns, with translations judged too imprecise
//!   emitted as commented-out diagnostics instead
//! - **Mihomo**: line-oriented with native `DOMAIN-REGEX` support
//! - **Egern**: structured YAML, rules grouped by kind
//!
//! # Pipeline
//!
//! ```ignore
//! use rulecast::{Dialect, Fetcher, HttpTransport, ResultCache, RulesetService, SourceCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let source = Arc::new(SourceCache::new(Duration::from_secs(1800)));
//! let fetcher = Fetcher::new(
//!     Box::new(HttpTransport::new(rulecast::DEFAULT_UPSTREAM_URL)),
//!     source,
//! );
//! let results = Arc::new(ResultCache::new(Duration::from_secs(86400)));
//! let service = RulesetService::new(fetcher, results);
//!
//! let text = service.ruleset("google", "cn", Dialect::Surge)?;
//! ```
//!
//! Rendered output is memoized per (member, filter, dialect) and tied to
//! the upstream fingerprint it was computed from, so a changed upstream
//! is a guaranteed cache miss while an unchanged one costs at most a
//! HEAD probe per TTL window.

mod error;

pub mod archive;
pub mod cache;
pub mod fetcher;
pub mod index;
pub mod parser;
pub mod render;
pub mod server;
pub mod service;
pub mod wildcard;

// Re-export core types
pub use archive::{MemberSource, SourceArchive, DATA_PREFIX};
pub use cache::{ResultCache, ResultKey, SourceCache};
pub use error::{Error, Result};
pub use fetcher::{ArchiveTransport, Fetcher, HttpTransport, DEFAULT_UPSTREAM_URL};
pub use parser::{Item, Parser, Rule, RuleKind};
pub use render::{render, Dialect};
pub use service::RulesetService;
pub use wildcard::{is_dangerous_regex, regex_to_wildcard};
