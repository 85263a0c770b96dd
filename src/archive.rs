//! Validated upstream archive snapshot and member access.
//!
//! The upstream dataset ships as a ZIP of the repository tree; the domain
//! lists live under a fixed data prefix. `SourceArchive` owns one validated
//! payload and hands out member text by short name. Parsing components
//! depend only on the [`MemberSource`] trait so they can be fed from tests
//! without any archive at all.

use std::io::{Cursor, Read};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Path prefix of the domain-list members inside the upstream ZIP.
pub const DATA_PREFIX: &str = "domain-list-community-master/data/";

/// Content accessor used by the parser to resolve `include:` directives.
pub trait MemberSource {
    /// Fetch the text of a named member.
    ///
    /// Returns [`Error::MemberNotFound`] when the name is absent, which
    /// callers treat as a client-visible failure; any other error is a
    /// transport or format fault.
    fn member(&self, name: &str) -> Result<String>;
}

/// One validated snapshot of the upstream ZIP archive.
///
/// Constructing a `SourceArchive` parses the ZIP central directory, so a
/// corrupt download is rejected before it can reach a cache. The instance
/// is immutable and shared behind `Arc` by the caches.
pub struct SourceArchive {
    data: Vec<u8>,
    names: Vec<String>,
}

impl SourceArchive {
    /// Validate a raw payload and take ownership of it.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let names = {
            let archive = ZipArchive::new(Cursor::new(&data[..]))?;
            archive.file_names().map(str::to_string).collect()
        };
        Ok(Self { data, names })
    }

    /// Raw archive bytes, as downloaded.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Short names of all top-level members under the data prefix.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .filter_map(|name| name.strip_prefix(DATA_PREFIX))
            .filter(|name| !name.is_empty() && !name.contains('/'))
    }

    /// Read one member's text by short name.
    pub fn member_content(&self, name: &str) -> Result<String> {
        let path = format!("{DATA_PREFIX}{name}");
        let mut archive = ZipArchive::new(Cursor::new(&self.data[..]))?;
        let mut file = match archive.by_name(&path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(Error::MemberNotFound(name.to_string())),
            Err(e) => return Err(Error::Archive(e)),
        };
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }
}

impl MemberSource for SourceArchive {
    fn member(&self, name: &str) -> Result<String> {
        self.member_content(name)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::build_archive;
    use super::*;

    #[test]
    fn test_rejects_corrupt_payload() {
        assert!(SourceArchive::new(vec![0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_member_content() {
        let data = build_archive(&[("google", "domain:google.com\n")]);
        let archive = SourceArchive::new(data).unwrap();

        let content = archive.member_content("google").unwrap();
        assert_eq!(content, "domain:google.com\n");
    }

    #[test]
    fn test_member_not_found() {
        let data = build_archive(&[("google", "domain:google.com\n")]);
        let archive = SourceArchive::new(data).unwrap();

        let err = archive.member_content("missing").unwrap_err();
        assert!(matches!(err, Error::MemberNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_member_names_are_top_level_only() {
        let data = build_archive(&[("google", ""), ("apple", ""), ("sub/nested", "")]);
        let archive = SourceArchive::new(data).unwrap();

        let mut names: Vec<&str> = archive.member_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["apple", "google"]);
    }
}
