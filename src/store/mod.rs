//! Paper metadata storage.
//!
//! The metadata store is an external collaborator as far as the index
//! cache is concerned; only the operations the core needs are exposed
//! here. Record ids are index positions, assigned by the publish path.

mod sqlite;

pub use sqlite::SqliteMetadataStore;

use crate::Result;
use crate::models::PaperRecord;

/// Trait for paper metadata backends.
pub trait MetadataStore: Send + Sync {
    /// Inserts a record under its pre-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Duplicate`] if the id, title, or arXiv id
    /// collides with an existing record.
    fn insert(&self, record: &PaperRecord) -> Result<()>;

    /// Fetches the records for the given ids.
    ///
    /// Results come back in storage order, not argument order; missing
    /// ids are skipped. Callers needing rank order must re-sort by their
    /// original id list.
    fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<PaperRecord>>;

    /// Total number of stored records.
    fn count(&self) -> Result<usize>;
}
