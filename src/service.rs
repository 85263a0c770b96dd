//! Request-facing pipeline: fetch, memoize, parse, render.

use std::sync::Arc;

use crate::archive::SourceArchive;
use crate::cache::{ResultCache, ResultKey};
use crate::error::Result;
use crate::fetcher::{short_fingerprint, Fetcher};
use crate::parser::Parser;
use crate::render::{render, Dialect};

/// The core's request surface: `(member, filter, dialect) → text`.
///
/// Serving layers own URL parsing and dialect selection; everything from
/// source freshness to memoization lives here. Concurrent identical
/// misses each compute independently; results are deterministic, so the
/// duplicated work is an accepted inefficiency, not a correctness bug.
pub struct RulesetService {
    fetcher: Fetcher,
    results: Arc<ResultCache>,
}

impl RulesetService {
    pub fn new(fetcher: Fetcher, results: Arc<ResultCache>) -> Self {
        Self { fetcher, results }
    }

    /// Convert one member into ruleset text, memoized per fingerprint.
    pub fn ruleset(&self, name: &str, filter: &str, dialect: Dialect) -> Result<String> {
        let (archive, fingerprint) = self.fetcher.ensure_fresh()?;

        let key = ResultKey::new(name, filter, dialect);
        if let Some(text) = self.results.get(&key, &fingerprint) {
            log::debug!("cache hit for {key} ({})", short_fingerprint(&fingerprint));
            return Ok(text);
        }

        let content = archive.member_content(name)?;
        let items = Parser::new(archive.as_ref()).parse(&content, filter)?;
        let text = render(&items, dialect)?;

        self.results.set(key.clone(), text.clone(), &fingerprint);
        log::info!("generated {key} ({})", short_fingerprint(&fingerprint));
        Ok(text)
    }

    /// Current archive and fingerprint, fetching if needed.
    pub fn current(&self) -> Result<(Arc<SourceArchive>, String)> {
        self.fetcher.ensure_fresh()
    }

    /// Probe upstream regardless of TTL; background use only.
    pub fn refresh_source(&self) -> Result<(Arc<SourceArchive>, String)> {
        self.fetcher.force_refresh()
    }

    /// Reclaim expired result entries.
    pub fn sweep_results(&self) {
        let removed = self.results.sweep();
        if removed > 0 {
            log::debug!("swept {removed} expired results");
        }
    }
}
