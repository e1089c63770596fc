use anyhow::Result;
use clap::Parser;
use mixsearch_core::{Engine, EngineConfig};
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON engine configuration; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Index root directory
    #[arg(long)]
    index: Option<PathBuf>,
    /// Directory of <id>.txt documents
    #[arg(long)]
    docs: Option<PathBuf>,
    /// Join key column
    #[arg(long)]
    key: Option<String>,
    /// SQLite database queried by /search
    #[arg(long)]
    db: PathBuf,
    /// Per-query deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(index) = args.index { config.index_root = index; }
    if let Some(docs) = args.docs { config.docs_dir = docs; }
    if let Some(key) = args.key { config.key_field = key; }

    let engine = Arc::new(Engine::open(config)?);
    let handle = engine.ensure_index()?;
    tracing::info!(generation = handle.generation(), num_docs = handle.num_docs(), "index ready");

    let mut state = AppState::new(engine, args.db);
    state.timeout = args.timeout_ms.map(Duration::from_millis);
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
