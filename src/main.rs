//! Binary entry point for paperscope.
//!
//! Operator-facing CLI over the recommendation core: query the corpus,
//! publish papers, bulk-import metadata, and inspect deployment state.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use paperscope::{
    ArxivClient, CohereEmbedder, FsRemoteStore, HttpRemoteStore, IndexCache, MetadataStore,
    PaperRecord, PaperscopeConfig, RecommendationService, RemoteIndexStore, SqliteMetadataStore,
    VectorIndex,
};
use tracing_subscriber::EnvFilter;

/// Paperscope - vector-index backed paper recommendations.
#[derive(Parser)]
#[command(name = "paperscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "PAPERSCOPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Recommend papers similar to a title or arXiv id.
    Recommend {
        /// Paper title or arXiv id to search with.
        query: String,

        /// Number of papers to recommend.
        #[arg(short, default_value_t = 5)]
        k: usize,
    },

    /// Publish a paper to the corpus by arXiv id or title.
    Publish {
        /// arXiv id or title of the paper.
        reference: String,
    },

    /// Bulk-import paper metadata from a CSV file (columns: id, title, authors, url).
    Import {
        /// Path to the CSV file.
        csv: PathBuf,
    },

    /// Upload a serialized index file as the canonical remote copy.
    Bootstrap {
        /// Path to a serialized index file.
        index: PathBuf,
    },

    /// Show deployment state: config paths, corpus size, index copies.
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("paperscope=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paperscope=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = PaperscopeConfig::load_from_file(path)?;
            config.apply_env_with(|name| std::env::var(name).ok());
            config
        }
        None => PaperscopeConfig::load()?,
    };

    match cli.command {
        Commands::Recommend { query, k } => cmd_recommend(&config, &query, k),
        Commands::Publish { reference } => cmd_publish(&config, &reference),
        Commands::Import { csv } => cmd_import(&config, &csv),
        Commands::Bootstrap { index } => cmd_bootstrap(&config, &index),
        Commands::Status => cmd_status(&config),
    }
}

fn remote_store(config: &PaperscopeConfig) -> anyhow::Result<Arc<dyn RemoteIndexStore>> {
    match &config.remote_url {
        Some(url) => {
            let mut store = HttpRemoteStore::new(url)?;
            if let Some(token) = &config.remote_token {
                store = store.with_token(token);
            }
            Ok(Arc::new(store))
        }
        // No gateway configured: a directory under the data dir stands in,
        // which keeps single-host deployments working end to end.
        None => Ok(Arc::new(FsRemoteStore::new(
            config.data_dir.join("remote_store"),
        )?)),
    }
}

fn service(config: &PaperscopeConfig) -> anyhow::Result<RecommendationService> {
    let remote = remote_store(config)?;
    let cache = Arc::new(IndexCache::new(
        config.embedding_dimensions,
        &config.local_index_path,
        config.remote_key.clone(),
        remote,
    )?);

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("creating data directory")?;
    }
    let store = Arc::new(SqliteMetadataStore::new(&config.database_path)?);

    let endpoint = config
        .embedding_url
        .as_deref()
        .context("embedding.url is not configured")?;
    let mut embedder = CohereEmbedder::new(endpoint)?
        .with_model(config.embedding_model.clone(), config.embedding_dimensions);
    if let Some(key) = &config.embedding_key {
        embedder = embedder.with_api_key(key);
    }

    Ok(
        RecommendationService::new(cache, store, Arc::new(embedder))
            .with_resolver(Arc::new(ArxivClient::new()?)),
    )
}

fn cmd_recommend(config: &PaperscopeConfig, query: &str, k: usize) -> anyhow::Result<()> {
    let service = service(config)?;
    let recommendations = service.recommend(query, k)?;

    if recommendations.is_empty() {
        println!("no matching papers");
        return Ok(());
    }
    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "{:>2}. [{:>6.2}] {} — {}\n    {}",
            rank + 1,
            rec.score,
            rec.paper.display_title(),
            rec.paper.display_authors(),
            rec.paper.url,
        );
    }
    Ok(())
}

fn cmd_publish(config: &PaperscopeConfig, reference: &str) -> anyhow::Result<()> {
    let service = service(config)?;
    let record = service.publish(reference)?;
    println!(
        "published '{}' ({}) as paper {}",
        record.display_title(),
        record.arxiv_id,
        record.id
    );
    Ok(())
}

/// Row shape of the import CSV.
#[derive(serde::Deserialize)]
struct ImportRow {
    id: String,
    title: String,
    authors: String,
    url: String,
}

fn cmd_import(config: &PaperscopeConfig, csv: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("creating data directory")?;
    }
    let store = SqliteMetadataStore::new(&config.database_path)?;

    let mut reader = csv::Reader::from_path(csv)
        .with_context(|| format!("opening {}", csv.display()))?;

    let mut imported: usize = 0;
    for (row_number, row) in reader.deserialize::<ImportRow>().enumerate() {
        let row = row.with_context(|| format!("reading CSV row {row_number}"))?;
        // Positions in the prebuilt index are assignment order, so ids
        // enumerate rows.
        let record = PaperRecord {
            id: i64::try_from(row_number).context("row count overflows the id space")?,
            arxiv_id: row.id,
            title: row.title,
            authors: row
                .authors
                .split(';')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            url: row.url,
        };
        store.insert(&record)?;
        imported += 1;
    }
    println!("imported {imported} papers into {}", config.database_path.display());
    Ok(())
}

fn cmd_bootstrap(config: &PaperscopeConfig, index_path: &PathBuf) -> anyhow::Result<()> {
    let bytes = std::fs::read(index_path)
        .with_context(|| format!("reading {}", index_path.display()))?;
    // Refuse to upload bytes that will not load on the next cold start.
    let index = VectorIndex::from_bytes(&bytes)?;
    anyhow::ensure!(
        index.dimensions() == config.embedding_dimensions,
        "index carries {} dimensions, deployment expects {}",
        index.dimensions(),
        config.embedding_dimensions
    );

    let remote = remote_store(config)?;
    remote.store(&config.remote_key, &bytes)?;
    println!(
        "uploaded {} vectors ({} bytes) to '{}'",
        index.len(),
        bytes.len(),
        config.remote_key
    );
    Ok(())
}

fn cmd_status(config: &PaperscopeConfig) -> anyhow::Result<()> {
    println!("data dir:      {}", config.data_dir.display());
    println!("database:      {}", config.database_path.display());
    println!("local index:   {}", config.local_index_path.display());
    println!("remote key:    {}", config.remote_key);

    match SqliteMetadataStore::new(&config.database_path) {
        Ok(store) => match store.count() {
            Ok(count) => println!("papers:        {count}"),
            Err(e) => println!("papers:        unavailable ({e})"),
        },
        Err(e) => println!("papers:        unavailable ({e})"),
    }

    match VectorIndex::load(&config.local_index_path) {
        Ok(index) => println!("local copy:    {} vectors", index.len()),
        Err(e) => println!("local copy:    {e}"),
    }

    let remote = remote_store(config)?;
    match remote.fetch(&config.remote_key) {
        Ok(bytes) => println!("remote copy:   {} bytes", bytes.len()),
        Err(e) => println!("remote copy:   {e}"),
    }
    Ok(())
}
