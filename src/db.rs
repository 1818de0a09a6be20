// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use std::fmt;
use std::str::FromStr;

/// Format of every `date` column. Lexicographic order equals chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    CoinInfo,
    PriceHistory,
    TradingVolumes,
    MarketCap,
}

impl Table {
    /// Tables in the order the updater refreshes them.
    pub const ALL: [Table; 4] = [
        Table::CoinInfo,
        Table::PriceHistory,
        Table::TradingVolumes,
        Table::MarketCap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::CoinInfo => "coin_info",
            Table::PriceHistory => "price_history",
            Table::TradingVolumes => "trading_volumes",
            Table::MarketCap => "market_cap",
        }
    }

    pub fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Table::CoinInfo => &[
                ("symbol", "TEXT PRIMARY KEY"),
                ("name", "TEXT"),
                ("description", "TEXT"),
                ("image_url", "TEXT"),
                ("date", "TEXT"),
            ],
            Table::PriceHistory => &[
                ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
                ("symbol", "TEXT"),
                ("date", "TEXT"),
                ("price", "REAL"),
                ("price_change", "REAL"),
            ],
            Table::TradingVolumes => &[
                ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
                ("symbol", "TEXT"),
                ("date", "TEXT"),
                ("volume", "REAL"),
            ],
            Table::MarketCap => &[
                ("symbol", "TEXT PRIMARY KEY"),
                ("market_cap", "REAL"),
                ("date", "TEXT"),
            ],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Table::ALL.iter().map(|t| t.name()).collect();
                format!("unknown table {:?}, expected one of {}", s, names.join(", "))
            })
    }
}

pub fn format_date(date: NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .with_context(|| format!("Invalid stored date {:?}", value))
}

/// Opens the database file, creating it if needed. The pool holds a single
/// long-lived connection; nothing else touches the file while we run.
pub async fn create_db_pool(db_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("Invalid database url {}", db_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_url))?;

    Ok(pool)
}

pub async fn table_exists(pool: &SqlitePool, table: Table) -> Result<bool> {
    let name = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table.name())
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to check whether {} exists", table))?;

    Ok(name.is_some())
}

/// Runs on a pool or inside an open transaction (`&mut *tx`).
pub async fn create_table<'e, E>(executor: E, table: Table) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|(name, kind)| format!("{} {}", name, kind))
        .collect();
    let query = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name(),
        columns.join(", ")
    );

    sqlx::query(&query)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to create table {}", table))?;

    Ok(())
}

pub async fn drop_table<'e, E>(executor: E, table: Table) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table.name()))
        .execute(executor)
        .await
        .with_context(|| format!("Failed to drop table {}", table))?;

    Ok(())
}

pub async fn row_count(pool: &SqlitePool, table: Table) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table.name()))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to count rows in {}", table))?;

    Ok(count)
}

/// Most recent `date` stored in `table`, `None` when the table is empty.
pub async fn newest_date(pool: &SqlitePool, table: Table) -> Result<Option<NaiveDateTime>> {
    let newest = sqlx::query_scalar::<_, Option<String>>(&format!(
        "SELECT MAX(date) FROM {}",
        table.name()
    ))
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to read newest date from {}", table))?;

    newest.as_deref().map(parse_date).transpose()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableStatus {
    pub rows: i64,
    pub newest: Option<NaiveDateTime>,
}

/// Row count and newest date, or `None` if the table was never created.
pub async fn table_status(pool: &SqlitePool, table: Table) -> Result<Option<TableStatus>> {
    if !table_exists(pool, table).await? {
        return Ok(None);
    }

    Ok(Some(TableStatus {
        rows: row_count(pool, table).await?,
        newest: newest_date(pool, table).await?,
    }))
}

#[cfg(test)]
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_db_pool("sqlite::memory:").await
}
