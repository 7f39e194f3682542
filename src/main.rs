//! # filevault CLI (`fvault`)
//!
//! ## Usage
//!
//! ```bash
//! fvault --config ./config/fvault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fvault init` | Create the SQLite database and schema |
//! | `fvault sync <dir>` | Reconcile tracked records against a directory |
//! | `fvault index <dir>` | Admit new files and build the index |
//! | `fvault search "<query>"` | Query the index, resolving current locations |
//! | `fvault delete --identity H \| --path P` | Remove a tracked record |
//! | `fvault files` | List tracked records |
//! | `fvault status` | Store and index overview |
//! | `fvault serve` | Start the HTTP API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use filevault::files::{DeleteTarget, FilesQuery};
use filevault::identity::ContentIdentity;
use filevault::progress::ProgressMode;
use filevault::{admit, config, files, migrate, reconcile, search, server, status};

/// filevault: content-addressed file tracking with semantic search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fvault.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fvault",
    about = "filevault: track files by content, follow them across moves, search them semantically",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fvault.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Reconcile tracked records against the files under a directory.
    ///
    /// Confirms or invalidates every stored record, then hashes the files
    /// under `dir` to find new content and moved files. Never deletes.
    Sync {
        dir: PathBuf,

        /// Only scan the top level of `dir`.
        #[arg(long)]
        no_recursive: bool,
    },

    /// Admit untracked files under a directory and add them to the index.
    Index {
        dir: PathBuf,

        #[arg(long)]
        no_recursive: bool,

        /// Minimum extracted text length in characters (overrides config).
        #[arg(long)]
        min_length: Option<usize>,
    },

    /// Query the index and print hits at their current locations.
    Search {
        query: String,

        /// Number of hits (defaults to `[index].default_top_k`).
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,
    },

    /// Delete a tracked record by content identity or by path.
    #[command(group(ArgGroup::new("target").required(true).args(["identity", "path"])))]
    Delete {
        #[arg(long)]
        identity: Option<ContentIdentity>,

        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// List tracked records, newest first.
    Files {
        /// Include invalid records.
        #[arg(long)]
        all: bool,

        /// Filter by case-insensitive substring of the location.
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,
    },

    /// Show record counts and index readiness.
    Status,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Sync { dir, no_recursive } => {
            reconcile::run_sync(&cfg, &dir, !no_recursive, progress).await?;
        }
        Commands::Index {
            dir,
            no_recursive,
            min_length,
        } => {
            admit::run_index(&cfg, &dir, !no_recursive, min_length, progress).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Delete { identity, path } => {
            let target = match (identity, path) {
                (Some(id), _) => DeleteTarget::Identity(id),
                (None, Some(path)) => DeleteTarget::Path(path),
                (None, None) => anyhow::bail!("either --identity or --path is required"),
            };
            files::run_delete(&cfg, &target).await?;
        }
        Commands::Files {
            all,
            query,
            limit,
            offset,
        } => {
            let q = FilesQuery {
                all,
                query,
                limit,
                offset,
            };
            files::run_files(&cfg, &q).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
