//! # nlsql CLI
//!
//! The `nlsql` binary answers natural-language questions against a SQLite
//! database through a guarded, read-only SQL pipeline.
//!
//! ## Usage
//!
//! ```bash
//! nlsql --config ./config/nlsql.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nlsql init` | Create the harness database and run schema migrations |
//! | `nlsql ask "<question>"` | Answer a question |
//! | `nlsql validate "<sql>"` | Run the SQL guardrail on a statement |
//! | `nlsql index status` | Show segment count and fingerprint state |
//! | `nlsql index sync` | Re-index the schema if it changed |
//! | `nlsql index rebuild` | Re-index the schema unconditionally |
//! | `nlsql index purge` | Remove every indexed segment |
//! | `nlsql serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! nlsql init --config ./config/nlsql.toml
//! nlsql index sync --config ./config/nlsql.toml
//! nlsql ask "Which characters are male?" --config ./config/nlsql.toml
//! nlsql ask "Ships with a hyperdrive rating under 1" --domain 2 --json
//! nlsql validate "SELECT name FROM people"
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use nlsql_harness::{ask_cmd, config, index_cmd, migrate, server};

/// nlsql: natural-language questions answered with guarded, read-only SQL.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nlsql.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nlsql",
    about = "nlsql: natural-language questions answered with guarded, read-only SQL",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nlsql.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the harness database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (segments, index_metadata, saved_prompts). Safe to run repeatedly.
    Init,

    /// Answer a natural-language question.
    ///
    /// Retrieves relevant schema context, asks the model for SQL, validates
    /// and runs it read-only, then summarizes the rows. Failed attempts are
    /// retried with the failure reason fed back to the model.
    Ask {
        /// The question.
        question: String,

        /// Restrict schema context and examples to this domain.
        #[arg(long)]
        domain: Option<String>,

        /// Print the full result record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check a SQL statement against the guardrail without running it.
    Validate {
        /// The SQL statement.
        sql: String,
    },

    /// Manage the schema segment index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Show segment count and whether the index matches the schema.
    Status,
    /// Re-index if the schema description or rules changed.
    Sync,
    /// Re-index unconditionally.
    Rebuild,
    /// Remove every segment and forget the fingerprint.
    Purge,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ask {
            question,
            domain,
            json,
        } => {
            ask_cmd::run_ask(&cfg, &question, domain.as_deref(), json).await?;
        }
        Commands::Validate { sql } => {
            ask_cmd::run_validate(&cfg, &sql)?;
        }
        Commands::Index { action } => match action {
            IndexAction::Status => index_cmd::run_index_status(&cfg).await?,
            IndexAction::Sync => index_cmd::run_index_sync(&cfg).await?,
            IndexAction::Rebuild => index_cmd::run_index_rebuild(&cfg).await?,
            IndexAction::Purge => index_cmd::run_index_purge(&cfg).await?,
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
