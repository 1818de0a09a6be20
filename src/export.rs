// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Result};
use chrono::Local;
use csv::Writer;
use sqlx::sqlite::SqlitePool;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::db::{self, format_date, Table};
use crate::models::{list_coin_info, list_market_caps, list_price_history, list_trading_volumes};

fn optional(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

/// Export a stored table to `{output_dir}/{table}_{timestamp}.csv`
pub async fn export_table_csv(pool: &SqlitePool, table: Table, output_dir: &Path) -> Result<PathBuf> {
    if !db::table_exists(pool, table).await? {
        bail!("Table {} does not exist yet, run an update first", table);
    }

    // Create output directory if it doesn't exist
    fs::create_dir_all(output_dir)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let csv_path = output_dir.join(format!("{}_{}.csv", table, timestamp));
    let mut writer = Writer::from_path(&csv_path)?;
    write_table(pool, table, &mut writer).await?;
    writer.flush()?;

    Ok(csv_path)
}

async fn write_table<W: Write>(pool: &SqlitePool, table: Table, writer: &mut Writer<W>) -> Result<()> {
    match table {
        Table::CoinInfo => {
            writer.write_record(["symbol", "name", "description", "image_url", "date"])?;
            for coin in list_coin_info(pool).await? {
                writer.write_record([
                    coin.symbol,
                    coin.name,
                    coin.description,
                    coin.image_url,
                    format_date(coin.date),
                ])?;
            }
        }
        Table::PriceHistory => {
            writer.write_record(["symbol", "date", "price", "price_change"])?;
            for record in list_price_history(pool).await? {
                writer.write_record([
                    record.symbol,
                    format_date(record.date),
                    record.price.to_string(),
                    optional(record.price_change),
                ])?;
            }
        }
        Table::TradingVolumes => {
            writer.write_record(["symbol", "date", "volume"])?;
            for record in list_trading_volumes(pool).await? {
                writer.write_record([
                    record.symbol,
                    format_date(record.date),
                    record.volume.to_string(),
                ])?;
            }
        }
        Table::MarketCap => {
            writer.write_record(["symbol", "market_cap", "date"])?;
            for record in list_market_caps(pool).await? {
                writer.write_record([
                    record.symbol,
                    record.market_cap.to_string(),
                    format_date(record.date),
                ])?;
            }
        }
    }

    Ok(())
}
