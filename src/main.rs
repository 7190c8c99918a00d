//! # Context Splice CLI (`splice`)
//!
//! ## Usage
//!
//! ```bash
//! splice --config ./config/splice.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `splice init` | Create the SQLite database and run schema migrations |
//! | `splice reconcile` | Trim a model suggestion to the lines it actually changes |
//! | `splice nearest "<query>"` | Print the workspace files nearest to a query |
//! | `splice cache stats` | Show the embedding cache for this workspace |
//! | `splice cache prune` | Drop cache entries for deleted files |
//! | `splice cache clear` | Delete the embedding cache for this workspace |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use context_splice::config;
use context_splice::{migrate, nearest_cmd, reconcile_cmd};

/// Context Splice CLI: trim model suggestions and retrieve nearby code.
#[derive(Parser)]
#[command(
    name = "splice",
    about = "Context Splice: trim model suggestions and retrieve nearby code",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Not needed by `reconcile`.
    #[arg(long, global = true, default_value = "./config/splice.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Trim a suggestion against the document region it replaces.
    ///
    /// Leading lines that repeat the lines above the region and trailing
    /// lines that repeat the lines below it are removed, ignoring
    /// whitespace differences.
    Reconcile {
        /// The original document.
        #[arg(long)]
        document: PathBuf,

        /// The model's suggestion (`-` reads stdin).
        #[arg(long)]
        candidate: PathBuf,

        /// First replaced line (zero-based).
        #[arg(long)]
        start: usize,

        /// Last replaced line (zero-based, inclusive). Defaults to `--start`.
        #[arg(long)]
        end: Option<usize>,

        /// Treat the candidate as code; skip fenced code-block extraction.
        #[arg(long)]
        raw: bool,
    },

    /// Find the workspace files most relevant to a query.
    ///
    /// Re-embeds only files whose content changed since the last run.
    Nearest {
        /// The query text.
        query: String,

        /// Number of files to return.
        #[arg(long)]
        k: Option<usize>,

        /// Path to leave out, relative to the corpus root (usually the
        /// current file). A leading `./` is ignored.
        #[arg(long)]
        exclude: Option<String>,

        /// Print `distance  path` lines instead of the context string.
        #[arg(long)]
        list: bool,
    },

    /// Inspect or reset the embedding cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the number of cached files.
    Stats,
    /// Drop entries for files no longer in the corpus.
    Prune,
    /// Delete the cache for this workspace.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "context_splice=info,context_splice_core=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile {
            document,
            candidate,
            start,
            end,
            raw,
        } => {
            reconcile_cmd::run_reconcile(&document, &candidate, start, end, raw)?;
        }
        Commands::Init => {
            let cfg = config::load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Nearest {
            query,
            k,
            exclude,
            list,
        } => {
            let cfg = config::load_config(&cli.config)?;
            nearest_cmd::run_nearest(&cfg, &query, k, exclude.as_deref(), list).await?;
        }
        Commands::Cache { action } => {
            let cfg = config::load_config(&cli.config)?;
            match action {
                CacheAction::Stats => nearest_cmd::run_cache_stats(&cfg).await?,
                CacheAction::Prune => nearest_cmd::run_cache_prune(&cfg).await?,
                CacheAction::Clear => nearest_cmd::run_cache_clear(&cfg).await?,
            }
        }
    }

    Ok(())
}
