use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scout_core::cache::{check_manifest, read_manifest, save_index};
use scout_core::{CacheOutcome, Corpus, DirStore, EngineConfig, SearchIndex};
use tracing_subscriber::{fmt, EnvFilter};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scout-indexer")]
#[command(about = "Precompute and inspect job similarity artifacts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build artifacts for a corpus, reusing the cache when it is current
    Build {
        /// Corpus path (JSON array, JSONL, or a directory of either)
        #[arg(long)]
        corpus: PathBuf,
        /// Artifact directory
        #[arg(long, default_value = "precomputed")]
        cache_dir: PathBuf,
        /// Recompute even when the manifest matches
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Optional JSON file overriding engine defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Report whether the cache matches a corpus
    Status {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long, default_value = "precomputed")]
        cache_dir: PathBuf,
    },
    /// Run a query against the cached artifacts and print the hits as JSON
    Search {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long, default_value = "precomputed")]
        cache_dir: PathBuf,
        query: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, cache_dir, force, config } => build(&corpus, cache_dir, force, config),
        Commands::Status { corpus, cache_dir } => status(&corpus, cache_dir),
        Commands::Search { corpus, cache_dir, query } => search(&corpus, cache_dir, &query),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else { return Ok(EngineConfig::default()) };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn build(corpus: &Path, cache_dir: PathBuf, force: bool, config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let corpus = Corpus::load(corpus)?;
    let store = DirStore::new(&cache_dir);

    if force {
        let index = SearchIndex::build(corpus, config);
        let manifest = save_index(&index, &store)?;
        tracing::info!(cache_dir = %cache_dir.display(), content_hash = %manifest.content_hash, "artifacts written");
        return Ok(());
    }

    let (index, outcome) = SearchIndex::load_or_build(corpus, &store, config);
    match outcome {
        CacheOutcome::Loaded => {
            tracing::info!(num_docs = index.len(), "artifacts already current");
        }
        CacheOutcome::Rebuilt { persisted: false, reason } => {
            bail!("rebuilt artifacts ({reason}) but could not write them to {}", cache_dir.display());
        }
        CacheOutcome::Rebuilt { reason, .. } => {
            tracing::info!(num_docs = index.len(), %reason, "artifacts rebuilt");
        }
    }
    Ok(())
}

fn status(corpus: &Path, cache_dir: PathBuf) -> Result<()> {
    let corpus = Corpus::load(corpus)?;
    let store = DirStore::new(&cache_dir);
    let hash = corpus.content_hash();
    println!("corpus hash:   {hash}");
    match check_manifest(&store, &hash) {
        Ok(manifest) => {
            println!("manifest hash: {}", manifest.content_hash);
            println!(
                "status:        valid ({} docs, {} terms, {} latent dims, built {})",
                manifest.num_docs, manifest.vocabulary_size, manifest.latent_dim, manifest.created_at
            );
        }
        Err(err) => {
            match read_manifest(&store) {
                Ok(stale) => println!("manifest hash: {}", stale.content_hash),
                Err(_) => println!("manifest hash: none"),
            }
            println!("status:        stale ({err})");
        }
    }
    Ok(())
}

fn search(corpus: &Path, cache_dir: PathBuf, query: &str) -> Result<()> {
    let corpus = Corpus::load(corpus)?;
    let store = DirStore::new(&cache_dir);
    let (index, _) = SearchIndex::load_or_build(corpus, &store, EngineConfig::default());
    let hits = index.search(query)?;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}
