//! Configuration management.
//!
//! Settings layer the same way throughout: built-in defaults, then the
//! TOML config file, then environment variables (loaded through `dotenvy`
//! so a local `.env` works in development).

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Environment variables recognized as overrides.
const ENV_VARS: &[&str] = &[
    "PAPERSCOPE_DATA_DIR",
    "DATABASE_PATH",
    "LOCAL_INDEX_PATH",
    "REMOTE_INDEX_KEY",
    "REMOTE_STORE_URL",
    "REMOTE_STORE_TOKEN",
    "EMBEDDING_URL",
    "EMBEDDING_KEY",
    "EMBEDDING_MODEL_ID",
    "EMBEDDING_DIMENSIONS",
];

/// Main configuration for paperscope.
#[derive(Debug, Clone)]
pub struct PaperscopeConfig {
    /// Directory for local durable state.
    pub data_dir: PathBuf,
    /// Path to the paper metadata database.
    pub database_path: PathBuf,
    /// Local staging path for the serialized index.
    pub local_index_path: PathBuf,
    /// Key of the canonical index blob in the remote store.
    pub remote_key: String,
    /// Remote object-store gateway base URL.
    pub remote_url: Option<String>,
    /// Remote store credential.
    pub remote_token: Option<String>,
    /// Embedding endpoint base URL.
    pub embedding_url: Option<String>,
    /// Embedding endpoint credential.
    pub embedding_key: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Embedding dimensions the deployment is pinned to.
    pub embedding_dimensions: usize,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Metadata database path.
    pub database_path: Option<String>,
    /// Index section.
    pub index: Option<ConfigFileIndex>,
    /// Remote store section.
    pub remote: Option<ConfigFileRemote>,
    /// Embedding section.
    pub embedding: Option<ConfigFileEmbedding>,
}

/// Index section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileIndex {
    /// Local staging path.
    pub local_path: Option<String>,
    /// Remote blob key.
    pub remote_key: Option<String>,
}

/// Remote store section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRemote {
    /// Gateway base URL.
    pub url: Option<String>,
    /// Bearer credential.
    pub token: Option<String>,
}

/// Embedding section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEmbedding {
    /// Endpoint base URL.
    pub url: Option<String>,
    /// API key.
    pub key: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Output dimensions.
    pub dimensions: Option<usize>,
}

impl Default for PaperscopeConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            database_path: data_dir.join("papers.db"),
            local_index_path: data_dir.join("paper_index.bin"),
            data_dir,
            remote_key: "data/paper_index.bin".to_string(),
            remote_url: None,
            remote_token: None,
            embedding_url: None,
            embedding_key: None,
            embedding_model: "embed-english-v3.0".to_string(),
            embedding_dimensions: 1024,
        }
    }
}

impl PaperscopeConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration: defaults, then the config file (if present),
    /// then environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing config file cannot be parsed.
    pub fn load() -> Result<Self> {
        // A local .env is a development convenience; absence is fine.
        let _ = dotenvy::dotenv();

        let path = std::env::var("PAPERSCOPE_CONFIG")
            .map_or_else(|_| default_config_path(), PathBuf::from);

        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_with(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads configuration from a file path (no environment overlay).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::from_config_file(file))
    }

    /// Builds a configuration from a parsed config file over defaults.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(dir) = file.data_dir {
            config.data_dir = PathBuf::from(&dir);
            config.database_path = config.data_dir.join("papers.db");
            config.local_index_path = config.data_dir.join("paper_index.bin");
        }
        if let Some(path) = file.database_path {
            config.database_path = PathBuf::from(path);
        }
        if let Some(index) = file.index {
            if let Some(path) = index.local_path {
                config.local_index_path = PathBuf::from(path);
            }
            if let Some(key) = index.remote_key {
                config.remote_key = key;
            }
        }
        if let Some(remote) = file.remote {
            config.remote_url = remote.url.or(config.remote_url);
            config.remote_token = remote.token.or(config.remote_token);
        }
        if let Some(embedding) = file.embedding {
            config.embedding_url = embedding.url.or(config.embedding_url);
            config.embedding_key = embedding.key.or(config.embedding_key);
            if let Some(model) = embedding.model {
                config.embedding_model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                config.embedding_dimensions = dimensions;
            }
        }
        config
    }

    /// Applies environment overrides through a lookup function.
    ///
    /// Factored out of [`Self::load`] so tests can substitute the
    /// process environment.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for &name in ENV_VARS {
            let Some(value) = lookup(name) else { continue };
            match name {
                "PAPERSCOPE_DATA_DIR" => {
                    self.data_dir = PathBuf::from(&value);
                    self.database_path = self.data_dir.join("papers.db");
                    self.local_index_path = self.data_dir.join("paper_index.bin");
                }
                "DATABASE_PATH" => self.database_path = PathBuf::from(value),
                "LOCAL_INDEX_PATH" => self.local_index_path = PathBuf::from(value),
                "REMOTE_INDEX_KEY" => self.remote_key = value,
                "REMOTE_STORE_URL" => self.remote_url = Some(value),
                "REMOTE_STORE_TOKEN" => self.remote_token = Some(value),
                "EMBEDDING_URL" => self.embedding_url = Some(value),
                "EMBEDDING_KEY" => self.embedding_key = Some(value),
                "EMBEDDING_MODEL_ID" => self.embedding_model = value,
                "EMBEDDING_DIMENSIONS" => {
                    if let Ok(dimensions) = value.parse() {
                        self.embedding_dimensions = dimensions;
                    }
                }
                _ => {}
            }
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "paperscope", "paperscope")
        .map_or_else(|| PathBuf::from(".paperscope"), |dirs| dirs.data_dir().to_path_buf())
}

fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "paperscope", "paperscope").map_or_else(
        || PathBuf::from("paperscope.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PaperscopeConfig::default();
        assert_eq!(config.remote_key, "data/paper_index.bin");
        assert_eq!(config.embedding_model, "embed-english-v3.0");
        assert_eq!(config.embedding_dimensions, 1024);
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            data_dir = "/var/lib/paperscope"

            [index]
            remote_key = "prod/index.bin"

            [embedding]
            url = "https://embed.example.com"
            model = "embed-multilingual-v3.0"
            dimensions = 512
            "#,
        )
        .expect("parse failed");

        let config = PaperscopeConfig::from_config_file(file);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/paperscope"));
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/paperscope/papers.db")
        );
        assert_eq!(config.remote_key, "prod/index.bin");
        assert_eq!(
            config.embedding_url.as_deref(),
            Some("https://embed.example.com")
        );
        assert_eq!(config.embedding_dimensions, 512);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EMBEDDING_KEY", "secret"),
            ("REMOTE_STORE_URL", "https://bucket.example.com"),
            ("EMBEDDING_DIMENSIONS", "384"),
        ]);

        let mut config = PaperscopeConfig::default();
        config.apply_env_with(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.embedding_key.as_deref(), Some("secret"));
        assert_eq!(
            config.remote_url.as_deref(),
            Some("https://bucket.example.com")
        );
        assert_eq!(config.embedding_dimensions, 384);
    }

    #[test]
    fn test_malformed_env_dimension_is_ignored() {
        let mut config = PaperscopeConfig::default();
        config.apply_env_with(|name| {
            (name == "EMBEDDING_DIMENSIONS").then(|| "not-a-number".to_string())
        });
        assert_eq!(config.embedding_dimensions, 1024);
    }
}
