//! # Paperscope
//!
//! Vector-index backed recommendation engine for arXiv papers.
//!
//! Paperscope keeps an in-memory similarity index of paper embeddings,
//! lazily materialized from a durable remote copy, and serves concurrent
//! search and publish traffic against it while write-back to the remote
//! store happens in the background.
//!
//! ## Architecture
//!
//! - [`index::VectorIndex`] — the in-memory similarity index (append-only)
//! - [`remote`] — durable blob storage for the serialized index
//! - [`cache::IndexCache`] — lazy initialization, read-your-writes access,
//!   coalesced asynchronous persistence
//! - [`store`] — relational paper metadata keyed by index position
//! - [`service::RecommendationService`] — recommend/publish orchestration
//!
//! ## Example
//!
//! ```rust,ignore
//! use paperscope::{IndexCache, RecommendationService};
//!
//! let service = RecommendationService::new(cache, store, embedder);
//! let papers = service.recommend("attention is all you need", 5)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod arxiv;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod index;
pub mod models;
pub mod remote;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use arxiv::{ArxivClient, PaperResolver};
pub use cache::{CacheState, IndexCache};
pub use config::PaperscopeConfig;
pub use embedding::{CohereEmbedder, EmbedMode, Embedder};
pub use index::VectorIndex;
pub use models::{Embedding, PaperRecord, Recommendation};
pub use remote::{FsRemoteStore, HttpRemoteStore, RemoteIndexStore};
pub use service::RecommendationService;
pub use store::{MetadataStore, SqliteMetadataStore};

/// Error type for paperscope operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `NotReady` | The index cache failed to initialize; retryable after a delay |
/// | `RemoteUnavailable` | The remote index store cannot be reached; transient |
/// | `NotFound` | A blob key or local index file does not exist |
/// | `CorruptIndex` | A serialized index exists but cannot be decoded |
/// | `Duplicate` | A paper with the same title or arXiv id already exists |
/// | `DimensionMismatch` | A vector of the wrong dimensionality was supplied |
/// | `InvalidInput` | Malformed caller input (k <= 0, empty query, bad arXiv id) |
/// | `Upstream` | The embedding endpoint returned a non-2xx response |
/// | `Timeout` | An external call exceeded its deadline |
/// | `Inconsistent` | Metadata and index diverged during publish |
/// | `OperationFailed` | I/O errors, database failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The index cache has not (or could not) become ready.
    ///
    /// Recorded on initialization failure and re-raised to every caller
    /// until a new initialization attempt succeeds. Callers should retry
    /// after a delay rather than treat this as fatal.
    #[error("index not ready: {cause}")]
    NotReady {
        /// Why initialization failed.
        cause: String,
    },

    /// The remote index store is unreachable (network or credentials).
    #[error("remote index store unavailable: {0}")]
    RemoteUnavailable(String),

    /// A requested object does not exist.
    ///
    /// Distinct from [`Error::CorruptIndex`]: callers use this to decide
    /// whether to bootstrap a fresh index or abort.
    #[error("not found: {0}")]
    NotFound(String),

    /// A serialized index file exists but cannot be decoded.
    ///
    /// Fatal for that local copy. Requires a re-fetch from the remote
    /// store or operator intervention; never silently treated as empty.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// A uniqueness constraint was violated on insert.
    ///
    /// User input conflict, not a system fault.
    #[error("duplicate paper: {0}")]
    Duplicate(String),

    /// A vector of unexpected dimensionality was supplied.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions the index was built with.
        expected: usize,
        /// Dimensions of the offending vector.
        actual: usize,
    },

    /// Invalid input was provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An upstream service returned an error response.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// An external call exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Paper metadata and the vector index have diverged.
    ///
    /// Raised when a metadata insert succeeded but the corresponding
    /// index add failed, or the assigned position disagrees with the
    /// metadata id. Requires operator reconciliation.
    #[error("metadata/index inconsistency for paper {paper_id}: {cause}")]
    Inconsistent {
        /// Id of the paper record left without a matching index entry.
        paper_id: i64,
        /// What went wrong.
        cause: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns `true` if the condition is transient and a caller may
    /// reasonably retry after a delay.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotReady { .. } | Self::RemoteUnavailable(_) | Self::Timeout(_)
        )
    }
}

/// Result type alias for paperscope operations.
pub type Result<T> = std::result::Result<T, Error>;
