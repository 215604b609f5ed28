//! # passport CLI
//!
//! ## Usage
//!
//! ```bash
//! passport --config ./passport.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `passport check` | Validate the Zotero API key and show its grants |
//! | `passport plan` | Dry-run the migration against an in-memory destination |
//! | `passport migrate` | Migrate the library into Zotero |
//!
//! The API key is read from `--token` or `ZOTERO_API_KEY`; an optional NCBI
//! key from `NCBI_API_KEY`. Logs go to stderr and are tuned
//! with `RUST_LOG` or `--verbose`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use passport::config;
use passport::enrich::EnrichField;
use passport::migrate::{self, MigrateArgs};
use passport::progress::ProgressMode;

/// Migrate a Papers 3 library into Zotero.
#[derive(Parser)]
#[command(
    name = "passport",
    about = "Migrate a Papers 3 library into Zotero",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./passport.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the API key and print the user id and grants.
    Check {
        /// Zotero API key (defaults to $ZOTERO_API_KEY).
        #[arg(long)]
        token: Option<String>,
    },

    /// Show what a migration would create, without writing anything.
    ///
    /// Reads the source library and runs every stage against an in-memory
    /// destination, so orphaned collections and other structural problems
    /// surface before any remote write.
    Plan {
        /// Migrate at most this many publications.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Migrate the library.
    ///
    /// Creates a new top-level collection named after the configured prefix
    /// and the current time, and recreates the collection tree, items,
    /// notes, PubMed links and PDFs under it. Not idempotent: running it
    /// twice imports the library twice.
    Migrate {
        /// Zotero API key (defaults to $ZOTERO_API_KEY).
        #[arg(long)]
        token: Option<String>,

        /// Backfill identifiers and metadata from PubMed.
        #[arg(long)]
        enrich: bool,

        /// Fields PubMed may overwrite (defaults to the config's list).
        #[arg(long, value_enum, value_delimiter = ',', requires = "enrich")]
        fields: Option<Vec<EnrichField>>,

        /// Migrate at most this many publications.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "passport=debug" } else { "passport=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Check { token } => {
            migrate::run_check(&cfg, token).await?;
        }
        Commands::Plan { limit } => {
            migrate::run_plan(&cfg, limit).await?;
        }
        Commands::Migrate {
            token,
            enrich,
            fields,
            limit,
            progress,
        } => {
            migrate::run_migrate(
                &cfg,
                MigrateArgs {
                    token,
                    enrich,
                    fields,
                    limit,
                    progress,
                },
            )
            .await?;
        }
    }

    Ok(())
}
