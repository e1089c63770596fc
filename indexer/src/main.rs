use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mixsearch_core::{EmptyTextPolicy, Engine, EngineConfig, Language};
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Document as found in JSON or JSONL import files.
#[derive(Debug, Deserialize)]
struct InputDoc {
    id: u64,
    body: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Manage the text index and documents of a mixed relational/full-text engine", long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// JSON engine configuration; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Index root holding the generations and the CURRENT pointer
    #[arg(long, global = true)]
    index: Option<PathBuf>,
    /// Directory of <id>.txt documents
    #[arg(long, global = true)]
    docs: Option<PathBuf>,
    /// Join key column
    #[arg(long, global = true)]
    key: Option<String>,
    /// Analyzer language (fr, en)
    #[arg(long, global = true)]
    language: Option<Language>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from the document directory into a new generation
    Build,
    /// Reuse the published index when compatible, build it otherwise
    Ensure,
    /// Delete old generations
    Prune {
        /// Previous generations to keep besides the published one
        #[arg(long, default_value_t = 1)]
        keep: usize,
    },
    /// Attach text to an identifier, or import JSON/JSONL files of {id, body}
    Add {
        #[arg(long, requires = "text", conflicts_with = "input")]
        id: Option<u64>,
        #[arg(long)]
        text: Option<String>,
        /// Input path (file or directory)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Detach the text of an identifier
    Remove {
        #[arg(long)]
        id: u64,
    },
    /// Number of valid documents in the document directory
    Count,
    /// Run a mixed query `<relational clause> WITH <text>` against an SQLite database
    Query {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,
        /// Abort after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Return every document for an empty text clause
        #[arg(long, default_value_t = false)]
        match_all: bool,
        mixed: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = load_config(&cli.engine)?;
    if let Commands::Query { match_all: true, .. } = cli.command {
        config.empty_text = EmptyTextPolicy::MatchAll;
    }
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Build => {
            let handle = engine.rebuild_index()?;
            println!("generation {} built with {} documents", handle.generation(), handle.num_docs());
        }
        Commands::Ensure => {
            let handle = engine.ensure_index()?;
            println!("generation {} ready with {} documents", handle.generation(), handle.num_docs());
        }
        Commands::Prune { keep } => {
            let removed = engine.prune_generations(keep)?;
            println!("{removed} generation(s) removed");
        }
        Commands::Add { id, text, input } => {
            let added = match (id, text, input) {
                (Some(id), Some(text), None) => {
                    engine.document_store().add(id, &text)?;
                    1
                }
                (None, None, Some(input)) => import(&engine, &input)?,
                _ => bail!("use either --id with --text, or --input"),
            };
            println!("{added} document(s) written; run `build` to index them");
        }
        Commands::Remove { id } => {
            if engine.document_store().remove(id)? {
                println!("document {id} removed; run `build` to update the index");
            } else {
                println!("no document for {id}");
            }
        }
        Commands::Count => {
            println!("{}", engine.document_store().count()?);
        }
        Commands::Query { db, timeout_ms, mixed, .. } => {
            let conn = Connection::open_with_flags(&db, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .with_context(|| format!("opening {}", db.display()))?;
            let started = Instant::now();
            let result = match timeout_ms {
                Some(ms) => engine.search_with_deadline(&conn, &mixed, started + Duration::from_millis(ms))?,
                None => engine.search(&conn, &mixed)?,
            };
            tracing::info!(hits = result.len(), took_ms = started.elapsed().as_millis() as u64, "query done");
            for hit in &result {
                println!("{}", serde_json::to_string(hit)?);
            }
        }
    }
    Ok(())
}

fn load_config(args: &EngineArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(index) = &args.index {
        config.index_root = index.clone();
    }
    if let Some(docs) = &args.docs {
        config.docs_dir = docs.clone();
    }
    if let Some(key) = &args.key {
        config.key_field = key.clone();
    }
    if let Some(language) = args.language {
        config.language = language;
    }
    Ok(config)
}

fn import(engine: &Engine, input: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }

    let mut docs = Vec::new();
    for file in &files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(file, &mut docs)?;
        } else {
            read_json(file, &mut docs)?;
        }
    }
    let store = engine.document_store();
    for doc in &docs {
        store.add(doc.id, &doc.body)?;
    }
    tracing::info!(files = files.len(), docs = docs.len(), "documents imported");
    Ok(docs.len())
}

fn read_jsonl(file: &Path, docs: &mut Vec<InputDoc>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        docs.push(doc);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<InputDoc>) -> Result<()> {
    let raw = fs::read_to_string(file)?;
    let json: serde_json::Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                docs.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => docs.push(serde_json::from_value(json)?),
        _ => bail!("{}: expected an object or an array of objects", file.display()),
    }
    Ok(())
}
