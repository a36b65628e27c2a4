//! Cohere embedding client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{EmbedMode, Embedder};
use crate::models::Embedding;
use crate::{Error, Result};

/// HTTP client for a Cohere v3 embedding endpoint.
///
/// The corpus index stores unit-norm vectors, so responses are normalized
/// before they leave this client.
pub struct CohereEmbedder {
    /// API endpoint base.
    endpoint: String,
    /// Bearer credential.
    api_key: Option<String>,
    /// Model to use.
    model: String,
    /// Embedding dimensions the model produces.
    dimensions: usize,
    /// HTTP client with the configured deadline.
    client: reqwest::blocking::Client,
}

impl CohereEmbedder {
    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "embed-english-v3.0";

    /// Dimensions of the default model.
    pub const DEFAULT_DIMENSIONS: usize = 1024;

    /// Default call deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for the given endpoint, reading the credential
    /// from `EMBEDDING_KEY` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: std::env::var("EMBEDDING_KEY").ok(),
            model: Self::DEFAULT_MODEL.to_string(),
            dimensions: Self::DEFAULT_DIMENSIONS,
            client,
        })
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model and its output dimensions.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Validates that the client is configured.
    fn validate(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::Upstream(
                "embedding credential not configured (EMBEDDING_KEY)".to_string(),
            ));
        }
        Ok(())
    }

    fn request(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        self.validate()?;

        let api_key = self.api_key.as_deref().unwrap_or_default();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
            input_type: mode.input_type(),
            allow_ignored_params: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout("embedding call exceeded its deadline".to_string())
                } else {
                    Error::Upstream(format!("embedding request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Upstream(format!(
                "embedding endpoint returned status {status}: {body}"
            )));
        }

        let response: EmbeddingResponse = response.json().map_err(|e| {
            Error::Upstream(format!("malformed embedding response: {e}"))
        })?;

        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| Error::Upstream("embedding response carried no data".to_string()))
    }
}

impl Embedder for CohereEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str, mode: EmbedMode) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("text to embed is empty".to_string()));
        }

        let values = self.request(text, mode)?;
        if values.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: values.len(),
            });
        }

        // The corpus index holds unit-norm vectors; match that here.
        Embedding::new(values)
    }
}

/// Request body for the embeddings endpoint.
#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
    input_type: &'static str,
    allow_ignored_params: bool,
}

/// Response body from the embeddings endpoint.
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let embedder = CohereEmbedder::new("https://api.example.com/")
            .expect("client failed")
            .with_api_key("secret")
            .with_model("embed-multilingual-v3.0", 512);

        assert_eq!(embedder.endpoint, "https://api.example.com");
        assert_eq!(embedder.model, "embed-multilingual-v3.0");
        assert_eq!(embedder.dimensions(), 512);
    }

    #[test]
    fn test_missing_credential_is_upstream_error() {
        let mut embedder = CohereEmbedder::new("https://api.example.com").expect("client failed");
        embedder.api_key = None;

        let result = embedder.embed("attention is all you need", EmbedMode::Query);
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[test]
    fn test_empty_text_is_rejected_before_any_network_call() {
        let embedder = CohereEmbedder::new("https://api.example.com")
            .expect("client failed")
            .with_api_key("secret");

        let result = embedder.embed("   ", EmbedMode::Document);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
