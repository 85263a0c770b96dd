//! Shared caches: the upstream source snapshot and memoized render results.

mod result;
mod source;

pub use result::{ResultCache, ResultKey};
pub use source::SourceCache;
