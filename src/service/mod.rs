//! Recommendation service.
//!
//! Orchestrates embedding generation, index search/append, and metadata
//! joins. This is the externally visible surface: `recommend` for lookups,
//! `publish` for adding papers to the corpus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{instrument, warn};

use crate::arxiv::{self, PaperResolver, ResolvedPaper};
use crate::cache::IndexCache;
use crate::embedding::{EmbedMode, Embedder};
use crate::models::{PaperRecord, Recommendation};
use crate::store::MetadataStore;
use crate::{Error, Result};

/// Similarity scale factor for display scores.
const SCORE_SCALE: f32 = 100.0;

/// Paper recommendation and publishing service.
///
/// All collaborators are injected at construction; the service holds no
/// hidden process-wide state.
pub struct RecommendationService {
    /// The index cache; owns the vector index and its persistence.
    cache: Arc<IndexCache>,
    /// Paper metadata keyed by index position.
    store: Arc<dyn MetadataStore>,
    /// Embedding provider.
    embedder: Arc<dyn Embedder>,
    /// Optional external catalog for resolving ids/titles to metadata.
    resolver: Option<Arc<dyn PaperResolver>>,
    /// Serializes publishes so id assignment is atomic: the next id is
    /// read, inserted, and confirmed as the index position under this
    /// lock, incremented exactly once per successful combined operation.
    publish_lock: Mutex<()>,
}

impl RecommendationService {
    /// Creates a service over the given collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<IndexCache>,
        store: Arc<dyn MetadataStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            cache,
            store,
            embedder,
            resolver: None,
            publish_lock: Mutex::new(()),
        }
    }

    /// Attaches an external paper catalog for arXiv-id queries and
    /// reference-based publishing.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn PaperResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Recommends the `k` papers most similar to `query`.
    ///
    /// A query containing an arXiv id is resolved to that paper's title
    /// before embedding, when a resolver is configured. Results come back
    /// in ANN rank order with scores scaled to [-100, 100].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty query or `k` of 0,
    /// [`Error::NotReady`] while the index cannot initialize, and the
    /// embedding provider's [`Error::Upstream`] / [`Error::Timeout`].
    #[instrument(skip(self), fields(k))]
    pub fn recommend(&self, query: &str, k: usize) -> Result<Vec<Recommendation>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query is empty".to_string()));
        }
        if k == 0 {
            return Err(Error::InvalidInput("k must be positive".to_string()));
        }

        let query_text = self.resolve_query_text(query)?;
        let embedding = self.embedder.embed(&query_text, EmbedMode::Query)?;
        let ranked = self.cache.search(&embedding, k)?;

        let ids: Vec<i64> = ranked
            .iter()
            .map(|&(_, position)| position_to_id(position))
            .collect::<Result<_>>()?;

        // The metadata lookup does not preserve order; re-join by the
        // original ANN rank, not storage order.
        let mut by_id: HashMap<i64, PaperRecord> = self
            .store
            .get_by_ids(&ids)?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        let mut recommendations = Vec::with_capacity(ranked.len());
        for (&(score, _), id) in ranked.iter().zip(&ids) {
            if let Some(paper) = by_id.remove(id) {
                recommendations.push(Recommendation {
                    paper,
                    score: score * SCORE_SCALE,
                });
            } else {
                // An index position without a metadata row means a past
                // publish diverged; surface it in the logs, not to users.
                warn!(position = id, "index position has no metadata record");
            }
        }
        Ok(recommendations)
    }

    /// Publishes a paper by reference: an arXiv id or a title, resolved
    /// through the configured catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no resolver is configured, plus
    /// all [`Self::publish_resolved`] failure modes.
    pub fn publish(&self, reference: &str) -> Result<PaperRecord> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            Error::InvalidInput("publishing by reference requires a paper resolver".to_string())
        })?;

        let resolved = if arxiv::is_arxiv_id(reference) {
            let id = arxiv::extract_arxiv_id(reference).unwrap_or(reference);
            resolver.by_id(id)?
        } else {
            resolver.by_title(reference)?
        };
        self.publish_resolved(&resolved)
    }

    /// Publishes a paper whose metadata is already known.
    ///
    /// The combined title + abstract is embedded in document mode, the
    /// metadata row is inserted under the next index position, and the
    /// embedding is appended. Metadata id and index position must
    /// correspond; any divergence is surfaced, never swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Duplicate`] if the title or arXiv id already
    /// exists (the index is untouched in that case), and
    /// [`Error::Inconsistent`] if the metadata insert succeeded but the
    /// index append failed or assigned a different position.
    #[instrument(skip_all, fields(arxiv_id = %resolved.arxiv_id))]
    pub fn publish_resolved(&self, resolved: &ResolvedPaper) -> Result<PaperRecord> {
        // Embed before touching any store: an embedding failure leaves
        // the system exactly as it was.
        let document = format!("{} {}", resolved.title, resolved.abstract_text);
        let embedding = self.embedder.embed(&document, EmbedMode::Document)?;

        let _guard = self.publish_lock.lock().map_err(|_| Error::OperationFailed {
            operation: "lock_publish".to_string(),
            cause: "publish lock poisoned".to_string(),
        })?;

        let next_id = position_to_id(self.cache.len()?)?;
        let record = PaperRecord {
            id: next_id,
            arxiv_id: resolved.arxiv_id.clone(),
            title: resolved.title.clone(),
            authors: resolved.authors.clone(),
            url: resolved.url.clone(),
        };

        // Duplicate surfaces here, before the index is mutated: no
        // orphaned embedding without metadata.
        self.store.insert(&record)?;

        let position = self.cache.add(&embedding).map_err(|e| Error::Inconsistent {
            paper_id: next_id,
            cause: format!("metadata inserted but index append failed: {e}"),
        })?;

        if position_to_id(position)? != next_id {
            return Err(Error::Inconsistent {
                paper_id: next_id,
                cause: format!("index assigned position {position}, metadata id is {next_id}"),
            });
        }
        Ok(record)
    }

    /// Approximate corpus size: the paper count rounded down to the
    /// nearest `10^round_exp`, for display on landing pages where the
    /// exact count churns too fast to be meaningful.
    ///
    /// # Errors
    ///
    /// Returns the metadata store's errors.
    pub fn total_papers(&self, round_exp: u32) -> Result<usize> {
        let count = self.store.count()?;
        let threshold = 10usize.saturating_pow(round_exp);
        Ok((count / threshold) * threshold)
    }

    /// Resolves an arXiv-id query to its paper title when possible, so
    /// the query embedding compares titles against titles.
    fn resolve_query_text(&self, query: &str) -> Result<String> {
        let Some(resolver) = &self.resolver else {
            return Ok(query.to_string());
        };
        match arxiv::extract_arxiv_id(query) {
            Some(id) => Ok(resolver.by_id(id)?.title),
            None => Ok(query.to_string()),
        }
    }
}

fn position_to_id(position: usize) -> Result<i64> {
    i64::try_from(position).map_err(|_| Error::OperationFailed {
        operation: "position_to_id".to_string(),
        cause: format!("index position {position} overflows the id space"),
    })
}
