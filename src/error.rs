//! Error types for rulecast.

use thiserror::Error;

/// Error type for rulecast operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Upstream probe or download failed. Retryable; callers holding a
    /// stale cached archive fall back to it instead of propagating this.
    #[error("transport error: {0}")]
    Transport(String),

    /// Archive payload could not be read as a ZIP file
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Named list is absent from the archive
    #[error("member not found: {0}")]
    MemberNotFound(String),

    /// An include chain revisited a member
    #[error("cyclic include chain at member: {0}")]
    CyclicInclude(String),

    /// Content could not be parsed or rendered
    #[error("format error: {0}")]
    Format(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encode/decode error
    #[error("snapshot error: {0}")]
    Persist(String),
}

/// Result type alias for rulecast operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error should surface as a client-visible not-found
    /// failure rather than a server fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::MemberNotFound(_))
    }
}
