//! Core domain types.
//!
//! Embeddings, paper metadata records, and scored recommendation results.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A unit-norm dense embedding vector.
///
/// Embeddings are produced externally and L2-normalized at construction so
/// similarity can be computed as a plain inner product. Values are never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Creates an embedding from raw values, normalizing to unit length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the vector is empty or has zero
    /// norm (a zero vector has no direction to compare against).
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidInput("embedding is empty".to_string()));
        }
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(Error::InvalidInput(
                "embedding has zero or non-finite norm".to_string(),
            ));
        }
        Ok(Self(values.into_iter().map(|x| x / norm).collect()))
    }

    /// Wraps values that are already unit-norm without renormalizing.
    ///
    /// Used when reloading stored vectors, where renormalization would
    /// perturb the exact persisted values.
    #[must_use]
    pub const fn from_normalized(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Returns the raw values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Inner product against another vector of the same dimensionality.
    ///
    /// For unit-norm inputs this is the cosine similarity, in [-1, 1].
    #[must_use]
    pub fn dot(&self, other: &[f32]) -> f32 {
        self.0.iter().zip(other.iter()).map(|(a, b)| a * b).sum()
    }
}

/// Metadata record for a single paper.
///
/// The primary key matches the paper's position in the vector index; records
/// are immutable once created and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Primary key; equal to the embedding's index position.
    pub id: i64,
    /// Source identifier on arXiv (e.g. `1706.03762`).
    pub arxiv_id: String,
    /// Paper title as published.
    pub title: String,
    /// Full author list.
    pub authors: Vec<String>,
    /// Canonical URL (the arXiv abstract page).
    pub url: String,
}

impl PaperRecord {
    /// Title-cased title for display.
    #[must_use]
    pub fn display_title(&self) -> String {
        title_case(&self.title)
    }

    /// Author list collapsed for display: past two authors, the rest
    /// become "et al.".
    #[must_use]
    pub fn display_authors(&self) -> String {
        if self.authors.len() > 2 {
            format!("{} et al.", self.authors[..2].join(", "))
        } else {
            self.authors.join(", ")
        }
    }
}

/// A paper returned from a similarity search, with its display score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The matched paper.
    pub paper: PaperRecord,
    /// Cosine similarity scaled to [-100, 100] for display.
    pub score: f32,
}

/// Short connectives that stay lowercase unless they lead the title.
const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "in", "of", "on", "or", "the", "to", "via",
    "with",
];

fn title_case(title: &str) -> String {
    title
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    // Leave acronyms and mixed-case tokens (BERT, arXiv) untouched.
    if word.chars().filter(char::is_ascii_uppercase).count() > 1
        || word.chars().skip(1).any(|c| c.is_ascii_uppercase())
    {
        return word.to_string();
    }
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_authors(authors: &[&str]) -> PaperRecord {
        PaperRecord {
            id: 0,
            arxiv_id: "1706.03762".to_string(),
            title: "attention is all you need".to_string(),
            authors: authors.iter().map(ToString::to_string).collect(),
            url: "https://arxiv.org/abs/1706.03762".to_string(),
        }
    }

    #[test]
    fn test_embedding_normalizes() {
        let emb = Embedding::new(vec![3.0, 4.0]).expect("valid embedding");
        let norm: f32 = emb.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((emb.as_slice()[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_rejects_degenerate_input() {
        assert!(Embedding::new(Vec::new()).is_err());
        assert!(Embedding::new(vec![0.0, 0.0, 0.0]).is_err());
        assert!(Embedding::new(vec![f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_dot_of_identical_unit_vectors_is_one() {
        let emb = Embedding::new(vec![1.0, 2.0, 3.0]).expect("valid embedding");
        assert!((emb.dot(emb.as_slice()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_display_authors_collapses_long_lists() {
        let record = record_with_authors(&["Ashish Vaswani", "Noam Shazeer", "Niki Parmar"]);
        assert_eq!(record.display_authors(), "Ashish Vaswani, Noam Shazeer et al.");

        let record = record_with_authors(&["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(record.display_authors(), "Ashish Vaswani, Noam Shazeer");
    }

    #[test]
    fn test_display_title_is_title_cased() {
        let record = record_with_authors(&[]);
        assert_eq!(record.display_title(), "Attention Is All You Need");
    }

    #[test]
    fn test_title_case_keeps_minor_words_and_acronyms() {
        assert_eq!(
            title_case("pre-training of BERT for language understanding"),
            "Pre-training of BERT for Language Understanding"
        );
    }
}
