//! # Notes Harness CLI (`notes`)
//!
//! ## Usage
//!
//! ```bash
//! notes --config ./config/notes.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `notes chunk <file>` | Extract and chunk one file, printing every window |
//! | `notes ingest` | Scan `[notes].root` and ingest every matching file |
//! | `notes search "<query>"` | Run retrieval and print the ranked selection |
//! | `notes ask "<question>"` | Answer a question from your notes |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use notes_harness::config::{self, Config};
use notes_harness::{chunk, ingest, search};

/// Notes Harness: ask questions of your own notes.
#[derive(Parser)]
#[command(
    name = "notes",
    about = "Question answering over your own notes",
    version,
    long_about = "Notes Harness chunks and embeds a directory of notes (Markdown, text, PDF), \
    retrieves diverse relevant passages with Maximal Marginal Relevance, and answers questions \
    with citations, telling apart what came from your notes and what came from the model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/notes.toml`. When the file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/notes.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and chunk a single file.
    ///
    /// Prints each chunk with its page and character count. Needs no
    /// embedding or generation provider.
    Chunk {
        /// File to chunk (`.md`, `.txt`, `.pdf`).
        file: PathBuf,
    },

    /// Ingest the notes directory.
    ///
    /// Scans `[notes].root`, embeds every matching file, and prints
    /// per-file chunk counts.
    Ingest,

    /// Search your notes.
    Search {
        /// The search query string.
        query: String,

        /// Number of passages to select.
        #[arg(long)]
        k: Option<usize>,

        /// Minimum cosine similarity a chunk needs to be considered.
        #[arg(long)]
        threshold: Option<f64>,

        /// MMR relevance/diversity trade-off in `[0, 1]`.
        #[arg(long)]
        lambda: Option<f64>,
    },

    /// Ask a question and get a cited answer.
    Ask {
        question: String,

        #[arg(long)]
        k: Option<usize>,

        #[arg(long)]
        threshold: Option<f64>,

        /// Forbid general-knowledge additions to the answer.
        #[arg(long)]
        no_enrich: bool,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_or_default(path: &std::path::Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Chunk { file } => {
            chunk::run_chunk(&cfg, &file)?;
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg).await?;
        }
        Commands::Search {
            query,
            k,
            threshold,
            lambda,
        } => {
            search::run_search(&cfg, &query, k, threshold, lambda).await?;
        }
        Commands::Ask {
            question,
            k,
            threshold,
            no_enrich,
            json,
        } => {
            search::run_ask(&cfg, &question, k, threshold, no_enrich, json).await?;
        }
    }

    Ok(())
}
