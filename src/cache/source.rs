//! TTL-gated cache for the upstream archive, with optional disk snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::archive::SourceArchive;
use crate::error::{Error, Result};

/// Holds the current upstream archive together with its fingerprint.
///
/// Payload and fingerprint are only ever replaced together; a populated
/// cache never carries an empty fingerprint. Staleness is signalled to the
/// caller through [`SourceCache::get`] returning `None`; deciding what to
/// do about it (probe, re-download, serve stale) is the fetcher's job.
pub struct SourceCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    persist_path: Option<PathBuf>,
}

struct Inner {
    archive: Option<Arc<SourceArchive>>,
    fingerprint: String,
    fetched: SystemTime,
}

/// On-disk snapshot record, bincode-encoded.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    data: Vec<u8>,
    fingerprint: String,
    fetched_unix: u64,
}

impl SourceCache {
    /// Create an in-memory cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                archive: None,
                fingerprint: String::new(),
                fetched: UNIX_EPOCH,
            }),
            ttl,
            persist_path: None,
        }
    }

    /// Create a cache that snapshots every update to `path`.
    pub fn with_persistence(ttl: Duration, path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(ttl);
        cache.persist_path = Some(path.into());
        cache
    }

    /// Return the archive only while the TTL window is open.
    ///
    /// `None` does not mean the cache is empty: a stale entry is still
    /// reachable through [`SourceCache::get_any`].
    pub fn get(&self) -> Option<(Arc<SourceArchive>, String)> {
        let inner = self.inner.read();
        let archive = inner.archive.clone()?;
        if is_stale(inner.fetched, self.ttl) {
            return None;
        }
        Some((archive, inner.fingerprint.clone()))
    }

    /// Return whatever is cached, regardless of TTL.
    pub fn get_any(&self) -> Option<(Arc<SourceArchive>, String)> {
        let inner = self.inner.read();
        let archive = inner.archive.clone()?;
        Some((archive, inner.fingerprint.clone()))
    }

    /// Current fingerprint, if any archive is cached.
    pub fn fingerprint(&self) -> Option<String> {
        let inner = self.inner.read();
        inner
            .archive
            .is_some()
            .then(|| inner.fingerprint.clone())
    }

    /// Validate and atomically install a new payload.
    ///
    /// A payload that does not parse as a ZIP archive is rejected without
    /// touching the existing state. A persistence failure is logged and
    /// otherwise ignored; the in-memory cache stays authoritative.
    pub fn set(&self, data: Vec<u8>, fingerprint: &str) -> Result<Arc<SourceArchive>> {
        let archive = Arc::new(SourceArchive::new(data)?);
        let mut inner = self.inner.write();
        inner.archive = Some(Arc::clone(&archive));
        inner.fingerprint = fingerprint.to_string();
        inner.fetched = SystemTime::now();
        if let Some(path) = &self.persist_path {
            if let Err(e) = persist_snapshot(path, &inner) {
                log::warn!("failed to persist snapshot to {}: {}", path.display(), e);
            }
        }
        Ok(archive)
    }

    /// Re-open the TTL window without replacing the payload.
    ///
    /// Used after an upstream probe confirms the cached fingerprint is
    /// still current. No-op on an empty cache.
    pub fn touch(&self) {
        let mut inner = self.inner.write();
        if inner.archive.is_some() {
            inner.fetched = SystemTime::now();
        }
    }

    /// Restore a snapshot written by an earlier process.
    ///
    /// Returns `Ok(false)` when no snapshot exists; decode and validation
    /// errors are surfaced so the caller can log them, but a fresh fetch
    /// will recover either way.
    pub fn load_from_file(&self, path: &Path) -> Result<bool> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let (snapshot, _): (Snapshot, usize) =
            bincode::serde::decode_from_slice(&raw, bincode::config::standard())
                .map_err(|e| Error::Persist(e.to_string()))?;
        let archive = Arc::new(SourceArchive::new(snapshot.data)?);

        let mut inner = self.inner.write();
        inner.archive = Some(archive);
        inner.fingerprint = snapshot.fingerprint;
        inner.fetched = UNIX_EPOCH + Duration::from_secs(snapshot.fetched_unix);
        Ok(true)
    }
}

fn is_stale(fetched: SystemTime, ttl: Duration) -> bool {
    match SystemTime::now().duration_since(fetched) {
        Ok(age) => age > ttl,
        // System time went backwards, consider stale
        Err(_) => true,
    }
}

fn persist_snapshot(path: &Path, inner: &Inner) -> Result<()> {
    let Some(archive) = &inner.archive else {
        return Ok(());
    };
    let snapshot = Snapshot {
        data: archive.raw().to_vec(),
        fingerprint: inner.fingerprint.clone(),
        fetched_unix: inner
            .fetched
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    };
    let encoded = bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())
        .map_err(|e| Error::Persist(e.to_string()))?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, &encoded)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
