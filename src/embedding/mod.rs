//! Embedding generation.
//!
//! The embedding model is hosted remotely; this module defines the
//! capability the core is handed at construction, plus the HTTP client
//! that implements it. No process-wide embedding state exists.

mod cohere;

pub use cohere::CohereEmbedder;

use crate::Result;
use crate::models::Embedding;

/// Preprocessing mode for an embedding request.
///
/// Documents and queries are embedded differently by the model; mixing
/// the two degrades retrieval quality, so the mode is explicit at every
/// call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// A search query (user input at recommend time).
    Query,
    /// A document being added to the corpus (title + abstract at publish time).
    Document,
}

impl EmbedMode {
    /// The wire value for the embedding API's `input_type` field.
    #[must_use]
    pub const fn input_type(self) -> &'static str {
        match self {
            Self::Query => "search_query",
            Self::Document => "search_document",
        }
    }
}

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates a unit-norm embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Upstream`] on a non-2xx response,
    /// [`crate::Error::Timeout`] when the call exceeds its deadline.
    fn embed(&self, text: &str, mode: EmbedMode) -> Result<Embedding>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_mode_wire_values() {
        assert_eq!(EmbedMode::Query.input_type(), "search_query");
        assert_eq!(EmbedMode::Document.input_type(), "search_document");
    }
}
