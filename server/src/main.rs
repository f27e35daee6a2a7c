use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use scout_server::{build_app, load_index};
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Corpus path (JSON array, JSONL, or a directory of either)
    #[arg(long, default_value = "./jobs.json")]
    corpus: PathBuf,
    /// Artifact cache directory
    #[arg(long, default_value = "./precomputed")]
    cache_dir: PathBuf,
    /// Recompute artifacts even if the cache is current
    #[arg(long, default_value_t = false)]
    rebuild: bool,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 5000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    // Precompute finishes before the listener binds.
    let (corpus, cache_dir, rebuild) = (args.corpus.clone(), args.cache_dir.clone(), args.rebuild);
    let index = tokio::task::spawn_blocking(move || load_index(&corpus, &cache_dir, rebuild)).await?;
    let app: Router = build_app(index);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
