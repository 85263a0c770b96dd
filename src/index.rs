//! Published index of available members.
//!
//! The index is a JSON mapping of member name to its ruleset URL, derived
//! from the archive's member listing. It is re-derived only when the
//! source fingerprint changes and can optionally be mirrored to a file
//! for fronting servers to pick up directly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::archive::SourceArchive;
use crate::error::{Error, Result};

/// Build the index body: member names sorted lexicographically, mapped to
/// `<base_url>/<name>`.
pub fn build_index(archive: &SourceArchive, base_url: &str) -> Result<Vec<u8>> {
    let base = base_url.trim_end_matches('/');
    let index: BTreeMap<String, String> = archive
        .member_names()
        .map(|name| (name.to_string(), format!("{base}/{name}")))
        .collect();
    serde_json::to_vec_pretty(&index).map_err(|e| Error::Format(e.to_string()))
}

struct IndexState {
    fingerprint: String,
    body: Vec<u8>,
}

/// Caches the derived index against the fingerprint it was built from.
pub struct IndexPublisher {
    path: Option<PathBuf>,
    state: RwLock<Option<IndexState>>,
}

impl IndexPublisher {
    /// `path`, when set, receives a copy of every rebuilt index.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            state: RwLock::new(None),
        }
    }

    /// The most recently derived body, if any.
    pub fn body(&self) -> Option<Vec<u8>> {
        self.state.read().as_ref().map(|state| state.body.clone())
    }

    /// Re-derive the index unless `fingerprint` already matches the cached
    /// one (and the mirror file, when configured, is still in place).
    /// Returns whether a rebuild happened.
    pub fn refresh(
        &self,
        archive: &SourceArchive,
        fingerprint: &str,
        base_url: &str,
    ) -> Result<bool> {
        {
            let state = self.state.read();
            if let Some(state) = state.as_ref() {
                let mirror_ok = match &self.path {
                    Some(path) => path.exists(),
                    None => true,
                };
                if state.fingerprint == fingerprint && mirror_ok {
                    return Ok(false);
                }
            }
        }

        let body = build_index(archive, base_url)?;
        if let Some(path) = &self.path {
            save_atomic(path, &body)?;
            log::info!("index saved to {}", path.display());
        }
        *self.state.write() = Some(IndexState {
            fingerprint: fingerprint.to_string(),
            body,
        });
        Ok(true)
    }
}

fn save_atomic(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutil::build_archive;

    fn archive() -> SourceArchive {
        let data = build_archive(&[("google", ""), ("apple", ""), ("category-ads", "")]);
        SourceArchive::new(data).unwrap()
    }

    #[test]
    fn test_index_is_sorted_and_mapped() {
        let body = build_index(&archive(), "https://example.com/geosite/").unwrap();
        let text = String::from_utf8(body).unwrap();

        let apple = text.find("apple").unwrap();
        let ads = text.find("category-ads").unwrap();
        let google = text.find("\"google\"").unwrap();
        assert!(apple < ads && ads < google);
        assert!(text.contains("\"https://example.com/geosite/google\""));
    }

    #[test]
    fn test_refresh_only_on_fingerprint_change() {
        let publisher = IndexPublisher::new(None);
        let archive = archive();

        assert!(publisher.refresh(&archive, "v1", "http://x/geosite").unwrap());
        assert!(!publisher.refresh(&archive, "v1", "http://x/geosite").unwrap());
        assert!(publisher.refresh(&archive, "v2", "http://x/geosite").unwrap());
        assert!(publisher.body().is_some());
    }

    #[test]
    fn test_refresh_writes_mirror_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let publisher = IndexPublisher::new(Some(path.clone()));
        let archive = archive();

        publisher.refresh(&archive, "v1", "http://x/geosite").unwrap();
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk, publisher.body().unwrap());

        // A deleted mirror is restored even with an unchanged fingerprint.
        fs::remove_file(&path).unwrap();
        assert!(publisher.refresh(&archive, "v1", "http://x/geosite").unwrap());
        assert!(path.exists());
    }
}
