//! Upstream archive freshness protocol.
//!
//! The fetcher keeps a [`SourceCache`] populated: a cheap HEAD probe
//! decides whether the cached payload is still current before any full
//! re-download happens, and a probe failure degrades to serving whatever
//! is cached rather than failing the request.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::archive::SourceArchive;
use crate::cache::SourceCache;
use crate::error::{Error, Result};

/// Default upstream: the v2fly domain-list-community repository snapshot.
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://github.com/v2fly/domain-list-community/archive/refs/heads/master.zip";

const USER_AGENT: &str = concat!("rulecast/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport used to reach the upstream archive.
pub trait ArchiveTransport: Send + Sync {
    /// Probe the upstream's current fingerprint with a metadata-only
    /// request. An empty string means the upstream exposes no version
    /// token; the caller then falls back to a content digest.
    fn probe_fingerprint(&self) -> Result<String>;

    /// Download the full archive payload.
    fn download(&self) -> Result<Vec<u8>>;
}

/// HTTP transport against a fixed archive URL.
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
}

impl HttpTransport {
    pub fn new(url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            url: url.to_string(),
        }
    }
}

impl ArchiveTransport for HttpTransport {
    fn probe_fingerprint(&self) -> Result<String> {
        let response = self
            .agent
            .head(&self.url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| Error::Transport(format!("HEAD {}: {}", self.url, e)))?;
        Ok(clean_etag(response.header("ETag").unwrap_or_default()))
    }

    fn download(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| Error::Transport(format!("GET {}: {}", self.url, e)))?;
        let mut data = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut data)
            .map_err(|e| Error::Transport(format!("read body: {e}")))?;
        Ok(data)
    }
}

/// Strip quotes and the weak-validator prefix from a raw ETag header.
fn clean_etag(raw: &str) -> String {
    raw.trim().replace('"', "").trim_start_matches("W/").to_string()
}

/// SHA-256 digest used when the upstream sends no ETag.
fn payload_fingerprint(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Keeps the source cache fresh.
pub struct Fetcher {
    transport: Box<dyn ArchiveTransport>,
    cache: Arc<SourceCache>,
}

impl Fetcher {
    pub fn new(transport: Box<dyn ArchiveTransport>, cache: Arc<SourceCache>) -> Self {
        Self { transport, cache }
    }

    /// Return a fresh archive, downloading only when needed.
    ///
    /// Freshness protocol: a TTL-valid cache entry is returned as-is.
    /// Otherwise the upstream fingerprint is probed; if the probe fails
    /// but any (possibly stale) archive is cached, that archive is served.
    /// A probe matching the cached fingerprint re-opens the TTL window
    /// without a download; anything else is a full download.
    pub fn ensure_fresh(&self) -> Result<(Arc<SourceArchive>, String)> {
        if let Some(hit) = self.cache.get() {
            return Ok(hit);
        }
        self.refresh()
    }

    /// Probe-and-refresh regardless of TTL.
    ///
    /// Called by the background refresh loop, never by request paths, so
    /// a slow upstream cannot stall user requests.
    pub fn force_refresh(&self) -> Result<(Arc<SourceArchive>, String)> {
        self.refresh()
    }

    fn refresh(&self) -> Result<(Arc<SourceArchive>, String)> {
        let stale = self.cache.get_any();

        let probed = match self.transport.probe_fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                return match stale {
                    Some(entry) => {
                        log::warn!("freshness probe failed, serving stale archive: {e}");
                        Ok(entry)
                    }
                    None => Err(e),
                };
            }
        };

        if let Some((archive, fingerprint)) = stale {
            if !probed.is_empty() && probed == fingerprint {
                self.cache.touch();
                return Ok((archive, fingerprint));
            }
        }

        let data = self.transport.download()?;
        let fingerprint = if probed.is_empty() {
            payload_fingerprint(&data)
        } else {
            probed
        };
        let archive = self.cache.set(data, &fingerprint)?;
        log::info!(
            "downloaded upstream archive: {} bytes (fingerprint {})",
            archive.raw().len(),
            short_fingerprint(&fingerprint)
        );
        Ok((archive, fingerprint))
    }
}

/// Truncate a fingerprint for log lines.
pub(crate) fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..8).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::build_archive;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockTransport {
        etag: Mutex<Result<String>>,
        payload: Mutex<Vec<u8>>,
        probes: AtomicUsize,
        downloads: AtomicUsize,
    }

    impl MockTransport {
        fn new(etag: &str, payload: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                etag: Mutex::new(Ok(etag.to_string())),
                payload: Mutex::new(payload),
                probes: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
            })
        }

        fn fail_probe(&self) {
            *self.etag.lock() = Err(Error::Transport("probe refused".to_string()));
        }

        fn publish(&self, etag: &str, payload: Vec<u8>) {
            *self.etag.lock() = Ok(etag.to_string());
            *self.payload.lock() = payload;
        }
    }

    impl ArchiveTransport for Arc<MockTransport> {
        fn probe_fingerprint(&self) -> Result<String> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            match &*self.etag.lock() {
                Ok(etag) => Ok(etag.clone()),
                Err(_) => Err(Error::Transport("probe refused".to_string())),
            }
        }

        fn download(&self) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.lock().clone())
        }
    }

    fn payload() -> Vec<u8> {
        build_archive(&[("google", "domain:google.com\n")])
    }

    #[test]
    fn test_first_fetch_downloads() {
        let transport = MockTransport::new("v1", payload());
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60)));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache);

        let (_, fingerprint) = fetcher.ensure_fresh().unwrap();
        assert_eq!(fingerprint, "v1");
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ttl_hit_skips_probe() {
        let transport = MockTransport::new("v1", payload());
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60)));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache);

        fetcher.ensure_fresh().unwrap();
        fetcher.ensure_fresh().unwrap();
        assert_eq!(transport.probes.load(Ordering::SeqCst), 1);
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matching_probe_reopens_window_without_download() {
        let transport = MockTransport::new("v1", payload());
        let cache = Arc::new(SourceCache::new(Duration::from_millis(10)));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache.clone());

        fetcher.ensure_fresh().unwrap();
        std::thread::sleep(Duration::from_millis(25));

        let (_, fingerprint) = fetcher.ensure_fresh().unwrap();
        assert_eq!(fingerprint, "v1");
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
        // Window was re-opened, so the next request is a plain cache hit.
        assert!(cache.get().is_some());
    }

    #[test]
    fn test_changed_fingerprint_triggers_download() {
        let transport = MockTransport::new("v1", payload());
        let cache = Arc::new(SourceCache::new(Duration::ZERO));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache);

        fetcher.ensure_fresh().unwrap();
        transport.publish("v2", build_archive(&[("google", "domain:google.org\n")]));
        std::thread::sleep(Duration::from_millis(5));

        let (archive, fingerprint) = fetcher.ensure_fresh().unwrap();
        assert_eq!(fingerprint, "v2");
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 2);
        assert!(archive.member_content("google").unwrap().contains("google.org"));
    }

    #[test]
    fn test_probe_failure_serves_stale() {
        let transport = MockTransport::new("v1", payload());
        let cache = Arc::new(SourceCache::new(Duration::ZERO));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache);

        fetcher.ensure_fresh().unwrap();
        transport.fail_probe();
        std::thread::sleep(Duration::from_millis(5));

        let (_, fingerprint) = fetcher.ensure_fresh().unwrap();
        assert_eq!(fingerprint, "v1");
        assert_eq!(transport.downloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probe_failure_with_empty_cache_propagates() {
        let transport = MockTransport::new("v1", payload());
        transport.fail_probe();
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60)));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache);

        assert!(matches!(
            fetcher.ensure_fresh(),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn test_empty_etag_falls_back_to_digest() {
        let transport = MockTransport::new("", payload());
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60)));
        let fetcher = Fetcher::new(Box::new(Arc::clone(&transport)), cache);

        let (_, fingerprint) = fetcher.ensure_fresh().unwrap();
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_clean_etag() {
        assert_eq!(clean_etag("\"abc123\""), "abc123");
        assert_eq!(clean_etag("W/\"abc123\""), "abc123");
        assert_eq!(clean_etag("abc123"), "abc123");
        assert_eq!(clean_etag(""), "");
    }
}
