pub mod cache;
pub mod entry;

pub use cache::{CacheConfig, QueryCache, DEFAULT_SWEEP_INTERVAL};
pub use entry::CacheEntry;

use std::sync::Arc;

/// Outcome of a failed single-flight build, shared by every waiter on the
/// same key. Implemented by hand rather than derived because the builder
/// error is held behind an `Arc` (all waiters see the same instance).
#[derive(Debug)]
pub enum BuildError<E> {
    /// The builder itself failed.
    Build(Arc<E>),

    /// The build task panicked or the runtime tore it down.
    Aborted,
}

impl<E> Clone for BuildError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Build(e) => Self::Build(Arc::clone(e)),
            Self::Aborted => Self::Aborted,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for BuildError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build(e) => write!(f, "cache build failed: {e}"),
            Self::Aborted => write!(f, "cache build task aborted"),
        }
    }
}

impl<E: std::fmt::Display + std::fmt::Debug> std::error::Error for BuildError<E> {}
