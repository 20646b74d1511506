//! taxon: command-line editor for hierarchical vocabularies.
//!
//! Store-backed commands need `DATABASE_URL`; `slug` runs offline.

mod cli;
mod commands;
mod config;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taxon_db::{log_pool_metrics, Database};

use crate::cli::{Cli, Commands};
use crate::config::{Config, LogFormat, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing on stderr so command output on stdout stays clean.
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    debug!(subsystem = "cli", log_format = ?format, "Logging initialized");
}

async fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    if let Commands::Slug {
        vocabulary_name,
        parent_slug,
        labels,
    } = cli.command
    {
        println!(
            "{}",
            commands::derive_slug(&vocabulary_name, parent_slug.as_deref(), labels)
        );
        return Ok(());
    }

    let db = connect(config).await?;

    match cli.command {
        Commands::Migrate => commands::migrate(&db).await,
        Commands::Vocab(command) => commands::vocab(&db, command).await,
        Commands::Entry(command) => commands::entry(&db, command).await,
        Commands::Tree {
            vocabulary_id,
            locale,
            json,
        } => commands::print_tree(&db, vocabulary_id, &locale, json).await,
        Commands::Move {
            vocabulary_id,
            item_id,
            target,
            rank,
            dry_run,
        } => {
            commands::move_entry(
                &db,
                vocabulary_id,
                item_id,
                target.parent_id(),
                rank,
                dry_run,
            )
            .await
        }
        Commands::Slug { .. } => Ok(()),
    }
}

async fn connect(config: &Config) -> anyhow::Result<Database> {
    let url = config.database_url()?;
    let db = Database::connect_with_config(url, config.pool_config())
        .await
        .context("Failed to connect to database")?;

    log_pool_metrics(db.pool());
    info!(
        subsystem = "cli",
        op = "connect",
        max_connections = config.max_connections,
        "Connected to database"
    );
    Ok(db)
}
