//! arXiv metadata lookup.
//!
//! Resolves an arXiv id or a title to full paper metadata via the public
//! Atom export API. The service core depends only on [`PaperResolver`];
//! this module also ships the HTTP implementation.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

/// New-style arXiv identifiers: 4-digit year-month, 4 or 5 digit sequence.
static ARXIV_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9]{4}\.[0-9]{4,5}").expect("static pattern")
});

/// Returns `true` if the input contains an arXiv identifier.
#[must_use]
pub fn is_arxiv_id(input: &str) -> bool {
    ARXIV_ID.is_match(input)
}

/// Extracts the arXiv identifier from the input, if any.
///
/// The export API does not expose the id as a field, but it is always
/// embedded in the entry URL.
#[must_use]
pub fn extract_arxiv_id(input: &str) -> Option<&str> {
    ARXIV_ID.find(input).map(|m| m.as_str())
}

/// Paper metadata as resolved from arXiv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaper {
    /// The arXiv identifier.
    pub arxiv_id: String,
    /// Title as published.
    pub title: String,
    /// Full author list.
    pub authors: Vec<String>,
    /// Canonical abstract-page URL.
    pub url: String,
    /// Abstract text.
    pub abstract_text: String,
}

/// Capability for resolving paper metadata from an external catalog.
pub trait PaperResolver: Send + Sync {
    /// Resolves a paper by its arXiv id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id,
    /// [`Error::NotFound`] if the catalog has no such paper, or
    /// [`Error::Upstream`] / [`Error::Timeout`] on transport failures.
    fn by_id(&self, arxiv_id: &str) -> Result<ResolvedPaper>;

    /// Resolves the best-matching paper for a title.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PaperResolver::by_id`].
    fn by_title(&self, title: &str) -> Result<ResolvedPaper>;
}

/// HTTP client for the arXiv Atom export API.
pub struct ArxivClient {
    /// Export API base URL.
    endpoint: String,
    /// HTTP client with the configured deadline.
    client: reqwest::blocking::Client,
}

impl ArxivClient {
    /// Public export endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://export.arxiv.org/api/query";

    /// Default call deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client against the public export API.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT)
    }

    /// Creates a client against a specific endpoint (used in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    fn query(&self, params: &[(&str, &str)]) -> Result<ResolvedPaper> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout("arXiv lookup exceeded its deadline".to_string())
                } else {
                    Error::Upstream(format!("arXiv lookup failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "arXiv export API returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .map_err(|e| Error::Upstream(format!("arXiv response unreadable: {e}")))?;
        parse_first_entry(&body)
    }
}

impl PaperResolver for ArxivClient {
    fn by_id(&self, arxiv_id: &str) -> Result<ResolvedPaper> {
        if !is_arxiv_id(arxiv_id) {
            return Err(Error::InvalidInput(format!(
                "'{arxiv_id}' is not a valid arXiv id"
            )));
        }
        self.query(&[("id_list", arxiv_id), ("max_results", "1")])
    }

    fn by_title(&self, title: &str) -> Result<ResolvedPaper> {
        let search = format!("ti:\"{title}\"");
        self.query(&[("search_query", search.as_str()), ("max_results", "1")])
    }
}

static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<entry>(.*?)</entry>").expect("static pattern")
});
static TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<title>(.*?)</title>").expect("static pattern")
});
static SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<summary>(.*?)</summary>").expect("static pattern")
});
static ENTRY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<id>(.*?)</id>").expect("static pattern")
});
static AUTHOR_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<name>(.*?)</name>").expect("static pattern")
});

/// Extracts the first `<entry>` of an Atom feed.
///
/// The export API's feed shape has been stable for years and the crate
/// needs five fields of it, so targeted extraction beats carrying a full
/// XML parser.
fn parse_first_entry(feed: &str) -> Result<ResolvedPaper> {
    let entry = ENTRY
        .captures(feed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::NotFound("arXiv returned no matching paper".to_string()))?;

    let field = |pattern: &Regex, name: &str| -> Result<String> {
        pattern
            .captures(entry)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str().trim()))
            .ok_or_else(|| Error::Upstream(format!("arXiv entry is missing <{name}>")))
    };

    let title = field(&TITLE, "title")?;
    let abstract_text = field(&SUMMARY, "summary")?;
    let url = field(&ENTRY_URL, "id")?;
    let authors: Vec<String> = AUTHOR_NAME
        .captures_iter(entry)
        .filter_map(|c| c.get(1))
        .map(|m| unescape(m.as_str().trim()))
        .collect();

    let arxiv_id = extract_arxiv_id(&url)
        .ok_or_else(|| Error::Upstream(format!("no arXiv id in entry url '{url}'")))?
        .to_string();

    Ok(ResolvedPaper {
        arxiv_id,
        title: normalize_whitespace(&title),
        authors,
        url,
        abstract_text: normalize_whitespace(&abstract_text),
    })
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// The export API wraps long titles and abstracts with newline + indent.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
