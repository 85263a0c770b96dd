//! Memoized render results, keyed by request and guarded by fingerprint.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::render::Dialect;

/// The request key surface: one entry per (member, filter, dialect).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub name: String,
    pub filter: String,
    pub dialect: Dialect,
}

impl ResultKey {
    pub fn new(name: &str, filter: &str, dialect: Dialect) -> Self {
        Self {
            name: name.to_string(),
            filter: filter.to_string(),
            dialect,
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filter.is_empty() {
            write!(f, "{}:{}", self.dialect.as_str(), self.name)
        } else {
            write!(f, "{}:{}@{}", self.dialect.as_str(), self.name, self.filter)
        }
    }
}

struct Entry {
    text: String,
    fingerprint: String,
    created: SystemTime,
}

/// Cache of rendered ruleset text.
///
/// An entry is only returned while its TTL is open **and** its fingerprint
/// equals the live one, so output computed against a superseded archive is
/// a guaranteed miss. Entries reference the fingerprint for comparison
/// only; expired entries linger until [`ResultCache::sweep`] reclaims them.
pub struct ResultCache {
    entries: RwLock<HashMap<ResultKey, Entry>>,
    ttl: Duration,
}

impl ResultCache {
    /// Create a cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a result computed against `fingerprint`.
    pub fn get(&self, key: &ResultKey, fingerprint: &str) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.fingerprint != fingerprint || is_expired(entry.created, self.ttl) {
            return None;
        }
        Some(entry.text.clone())
    }

    /// Store a rendered result.
    pub fn set(&self, key: ResultKey, text: String, fingerprint: &str) {
        let mut entries = self.entries.write();
        entries.insert(
            key,
            Entry {
                text,
                fingerprint: fingerprint.to_string(),
                created: SystemTime::now(),
            },
        );
    }

    /// Physically reclaim TTL-expired entries. Returns the removed count.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !is_expired(entry.created, self.ttl));
        before - entries.len()
    }

    /// Number of live and expired-but-unswept entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn is_expired(created: SystemTime, ttl: Duration) -> bool {
    match SystemTime::now().duration_since(created) {
        Ok(age) => age > ttl,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ResultKey {
        ResultKey::new("google", "", Dialect::Surge)
    }

    #[test]
    fn test_hit_requires_matching_fingerprint() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.set(key(), "DOMAIN-SUFFIX,google.com".to_string(), "v1");

        assert_eq!(
            cache.get(&key(), "v1").as_deref(),
            Some("DOMAIN-SUFFIX,google.com")
        );
        assert!(cache.get(&key(), "v2").is_none());
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.set(key(), "surge output".to_string(), "v1");

        let mihomo = ResultKey::new("google", "", Dialect::Mihomo);
        assert!(cache.get(&mihomo, "v1").is_none());

        let filtered = ResultKey::new("google", "cn", Dialect::Surge);
        assert!(cache.get(&filtered, "v1").is_none());
    }

    #[test]
    fn test_expired_entry_misses_and_sweeps() {
        let cache = ResultCache::new(Duration::ZERO);
        cache.set(key(), "text".to_string(), "v1");
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get(&key(), "v1").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "surge:google");
        assert_eq!(
            ResultKey::new("google", "cn", Dialect::Egern).to_string(),
            "egern:google@cn"
        );
    }
}
