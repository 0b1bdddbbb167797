mod commands;
mod migrations;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::*;
use tidemark_core::{init_logging, LoggingConfig};

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(version)]
#[command(about = "Versioned schema migrations for PostgreSQL and SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Scaffold new source files
    Make {
        #[command(subcommand)]
        make_command: MakeCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply all pending migrations
    Run,

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the migration history table
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Revert one applied migration
    Rollback {
        /// Version to revert (e.g. 20241201_000002)
        version: String,
    },
}

#[derive(Subcommand)]
enum MakeCommands {
    /// Create a new migration file
    Migration {
        /// Migration name in snake_case (e.g. add_user_phone)
        name: String,

        /// Description recorded in the history table
        #[arg(long, short)]
        description: Option<String>,

        /// Target directory (defaults to MIGRATIONS_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate { migrate_command } => {
            let config = migrate::load_config()?;
            init_logging(LoggingConfig::from_app_config(&config).with_service("tidemark"))
                .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

            match migrate_command {
                MigrateCommands::Run => {
                    migrate::run(&config).await?;
                }
                MigrateCommands::Status { json } => {
                    migrate::status(&config, json).await?;
                }
                MigrateCommands::History { json } => {
                    migrate::history(&config, json).await?;
                }
                MigrateCommands::Rollback { version } => {
                    migrate::rollback(&config, &version).await?;
                }
            }
        }
        Commands::Make { make_command } => match make_command {
            MakeCommands::Migration { name, description, dir } => {
                make::migration(&name, description, dir).await?;
            }
        },
    }

    Ok(())
}
