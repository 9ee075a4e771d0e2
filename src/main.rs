use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docdex::config::{load_config, Config};
use docdex::pipeline::IndexOutcome;
use docdex::provider::{create_backend, Backend};
use docdex::scan::ProjectScanner;

#[derive(Parser)]
#[command(
    name = "docdex",
    about = "Index project documents and answer questions against them",
    version
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "docdex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store and index every document under the project root
    Init,
    /// Index a single file, or the whole project with --all
    Index {
        /// File to index
        path: Option<PathBuf>,
        /// Index every supported file under the project root
        #[arg(long)]
        all: bool,
    },
    /// Remove a file from the index
    Remove { path: PathBuf },
    /// Rank indexed excerpts against a query
    Search { query: String },
    /// Answer a question using indexed documents as context
    Ask { question: String },
    /// Clear the index and rebuild it from a fresh scan
    Reindex,
    /// Show store metadata
    Info,
    /// List indexed files
    Files,
    /// Probe connectivity to the backing API
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let backend = create_backend(&config)
        .await
        .context("Failed to initialize backend")?;
    backend.initialize().await?;

    let result = run(&cli.command, &config, backend.as_ref()).await;
    backend.dispose().await?;
    result
}

async fn run(command: &Commands, config: &Config, backend: &dyn Backend) -> Result<()> {
    match command {
        Commands::Init => {
            index_all(config, backend).await?;
        }
        Commands::Index { path, all } => {
            if *all {
                index_all(config, backend).await?;
            } else if let Some(path) = path {
                report_outcome(path, backend.index(path).await?);
            } else {
                anyhow::bail!("Provide a file path or pass --all");
            }
        }
        Commands::Remove { path } => {
            if backend.remove(path).await? {
                println!("Removed {}", path.display());
            } else {
                println!("{} was not in the index", path.display());
            }
        }
        Commands::Search { query } => {
            let hits = backend.search(query).await?;
            if hits.is_empty() {
                println!("No results above the relevance floor.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.0}%] {} (chunk {})",
                    i + 1,
                    hit.relevance_percent(),
                    hit.segment.rel_path,
                    hit.segment.seq
                );
                println!("   {}", preview(&hit.segment.text));
            }
        }
        Commands::Ask { question } => {
            let answer = backend.ask(question).await?;
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  - {} ({:.0}%)", source.rel_path, source.relevance_percent);
                }
            }
        }
        Commands::Reindex => {
            backend.reindex_all().await?;
            index_all(config, backend).await?;
        }
        Commands::Info => {
            let info = backend.store_info().await?;
            println!("Store:     {}", info.id);
            println!("Label:     {}", info.label);
            println!("Project:   {}", info.project_name);
            println!("Root:      {}", info.root_path);
            println!("Documents: {}", info.document_count);
        }
        Commands::Files => {
            let files = backend.indexed_files().await?;
            if files.is_empty() {
                println!("No documents indexed.");
            }
            for file in &files {
                println!("{}  ({}, {} bytes)", file.rel_path, file.media_type, file.size_bytes);
            }
        }
        Commands::Check => {
            if backend.test_connection().await? {
                println!("API is reachable.");
            } else {
                // Bubble up so main still disposes the backend before
                // exiting non-zero.
                anyhow::bail!("API responded with a failure status");
            }
        }
    }
    Ok(())
}

/// Scan the project root and index every supported file, reporting each
/// outcome. A per-file failure is reported and the scan continues.
async fn index_all(config: &Config, backend: &dyn Backend) -> Result<()> {
    let scanner = ProjectScanner::new(&config.project)?;
    let files = scanner.scan();
    println!("Scanning {} ...", config.project.root.display());

    let mut indexed = 0usize;
    let mut failed = 0usize;
    for path in &files {
        match backend.index(path).await {
            Ok(outcome) => {
                if matches!(outcome, IndexOutcome::Indexed { .. }) {
                    indexed += 1;
                }
                report_outcome(path, outcome);
            }
            Err(e) => {
                failed += 1;
                eprintln!("  error: {}: {}", path.display(), e);
            }
        }
    }

    println!("Indexed {} of {} files ({} failed).", indexed, files.len(), failed);
    Ok(())
}

fn report_outcome(path: &std::path::Path, outcome: IndexOutcome) {
    match outcome {
        IndexOutcome::Indexed { segments } => {
            println!("  indexed {} ({} chunks)", path.display(), segments)
        }
        IndexOutcome::Empty => println!("  skipped {} (empty)", path.display()),
        IndexOutcome::Unsupported => println!("  skipped {} (unsupported type)", path.display()),
        IndexOutcome::Skipped => println!("  skipped {} (already in progress)", path.display()),
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(100).collect();
    if flat.chars().count() > 100 {
        out.push('…');
    }
    out
}
