// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

mod api;
mod config;
mod db;
mod export;
mod logging;
mod models;
mod policy;
mod populate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf};
use tracing::error;

use crate::db::Table;
use crate::populate::UpdateOutcome;

#[derive(Parser)]
#[command(author, version, about = "Keeps a local SQLite copy of CryptoCompare price, volume, market cap and coin data")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh every outdated table (the default)
    Update,
    /// Show row counts and the newest stored date per table
    Status,
    /// Export a table to CSV
    Export {
        /// One of coin_info, price_history, trading_volumes, market_cap
        table: Table,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_logging(&logging::LoggingConfig::from_env())?;

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    let pool = db::create_db_pool(&config.database_url).await?;

    let result = match cli.command.unwrap_or(Commands::Update) {
        Commands::Update => run_update(&pool, &config).await,
        Commands::Status => show_status(&pool).await,
        Commands::Export { table, output_dir } => {
            export::export_table_csv(&pool, table, &output_dir)
                .await
                .map(|path| println!("📁 CSV file created: {}", path.display()))
        }
    };

    pool.close().await;

    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    result
}

async fn run_update(pool: &sqlx::SqlitePool, config: &config::Config) -> Result<()> {
    let api_key = env::var(config::API_KEY_VAR)
        .with_context(|| format!("{} must be set", config::API_KEY_VAR))?;
    let client = api::CryptoCompareClient::new(api_key)
        .with_base_url(&config.api_base_url)
        .with_quote_currency(&config.quote_currency);

    let outcomes = populate::update_all(pool, &client, config).await?;
    let updated = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, UpdateOutcome::Updated { .. }))
        .count();
    println!("✅ Update finished: {} of {} tables refreshed", updated, outcomes.len());

    Ok(())
}

async fn show_status(pool: &sqlx::SqlitePool) -> Result<()> {
    for table in Table::ALL {
        match db::table_status(pool, table).await? {
            Some(status) => println!(
                "{:<16} {:>8} rows  newest: {}",
                table.name(),
                status.rows,
                status
                    .newest
                    .map(db::format_date)
                    .unwrap_or_else(|| "-".to_string())
            ),
            None => println!("{:<16} not created yet", table.name()),
        }
    }

    Ok(())
}
