//! # MCP Catalog CLI (`catalog`)
//!
//! ## Usage
//!
//! ```bash
//! catalog --config ./config/catalog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catalog init` | Create the SQLite database and run schema migrations |
//! | `catalog collect` | Discover candidates and ingest them |
//! | `catalog add <owner/repo[/dir]>` | Ingest one repository README |
//! | `catalog reanalyze <id>` | Re-run extraction on a stored README |
//! | `catalog approve <id>` | Accept a pending proposed manifest |
//! | `catalog list` | List catalogued repositories |
//! | `catalog search "<text>"` | Search descriptions or READMEs |
//! | `catalog get <id>` | Print one record as JSON |
//! | `catalog serve` | Start the HTTP API (and the daily schedule if enabled) |
//!
//! `collect`, `add`, `reanalyze`, `approve` and `serve` need `GITHUB_TOKEN`
//! and `OPENAI_API_KEY`; a `.env` file in the working directory is honoured.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_catalog::commands::{self, ListArgs};
use mcp_catalog::{config, migrate};

/// MCP Catalog: discover, analyze and catalog MCP server repositories.
#[derive(Parser)]
#[command(
    name = "catalog",
    about = "MCP Catalog: discover, analyze and catalog MCP server repositories",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catalog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run discovery and ingest every candidate found.
    Collect {
        /// Re-analyze unchanged READMEs and write results as accepted.
        #[arg(long)]
        force: bool,

        /// Maximum number of candidates to collect.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ingest a single repository.
    Add {
        /// `owner/repo`, or `owner/repo/sub/dir` for a README in a subdirectory.
        full_name: String,

        #[arg(long)]
        force: bool,
    },

    /// Re-run extraction on the stored README of a repository.
    Reanalyze {
        id: i64,

        /// Write the result as the accepted manifest instead of a proposal.
        #[arg(long)]
        force: bool,
    },

    /// Promote a pending proposed manifest to the accepted one.
    Approve { id: i64 },

    /// List catalogued repositories.
    List {
        /// Only repositories carrying this category tag.
        #[arg(long)]
        tag: Option<String>,

        /// Sort key: `stars`, `name`, or `id`.
        #[arg(long, default_value = "stars")]
        sort: String,

        /// Sort ascending instead of descending.
        #[arg(long)]
        asc: bool,

        #[arg(long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Case-insensitive substring search.
    Search {
        text: String,

        /// Search README text instead of descriptions and names.
        #[arg(long)]
        readme: bool,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Print a repository record as JSON.
    Get { id: i64 },

    /// Start the HTTP API.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Collect { force, limit } => {
            commands::run_collect(&cfg, force, limit).await?;
        }
        Commands::Add { full_name, force } => {
            commands::run_add(&cfg, &full_name, force).await?;
        }
        Commands::Reanalyze { id, force } => {
            commands::run_reanalyze(&cfg, id, force).await?;
        }
        Commands::Approve { id } => {
            commands::run_approve(&cfg, id).await?;
        }
        Commands::List {
            tag,
            sort,
            asc,
            limit,
            offset,
        } => {
            let args = ListArgs {
                tag,
                sort,
                desc: !asc,
                limit,
                offset,
            };
            commands::run_list(&cfg, args).await?;
        }
        Commands::Search {
            text,
            readme,
            limit,
        } => {
            commands::run_search(&cfg, &text, readme, limit).await?;
        }
        Commands::Get { id } => {
            commands::run_get(&cfg, id).await?;
        }
        Commands::Serve => {
            commands::run_serve(&cfg).await?;
        }
    }

    Ok(())
}
