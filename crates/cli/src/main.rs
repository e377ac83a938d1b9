mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::migrate;
use tidemark_core::{init_logging, AppConfig, AppConfigTrait};
use tidemark_orm::{MigrationRegistry, MigrationSession};

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(version, about = "Versioned schema migrations for PostgreSQL and SQLite")]
struct Cli {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

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
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply pending migrations
    Up {
        /// Highest version to apply
        #[arg(long)]
        target: Option<i64>,

        /// Only list the versions that would be applied
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll back applied migrations
    Down {
        /// Number of versions to roll back
        #[arg(long, default_value_t = 1, conflicts_with = "target")]
        steps: usize,

        /// Roll back every version above this one
        #[arg(long)]
        target: Option<i64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied and pending migrations
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-check the post-conditions of applied migrations
    Verify {
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded
async fn run(cli: Cli) -> anyhow::Result<bool> {
    if let Some(url) = &cli.database_url {
        std::env::set_var("DATABASE_URL", url);
    }

    let config = AppConfig::from_env()?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;
    tracing::debug!(environment = ?config.environment, "configuration loaded");

    let registry = MigrationRegistry::builtin();
    let session = MigrationSession::open(&config, &registry).await?;

    let result = match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Up { target, dry_run, json } => migrate::up(&session, target, dry_run, json).await,
            MigrateCommands::Down { steps, target, json } => migrate::down(&session, steps, target, json).await,
            MigrateCommands::Status { json } => migrate::status(&session, json).await,
            MigrateCommands::Verify { json } => migrate::verify(&session, json).await,
        },
    };

    session.close().await;
    result
}
