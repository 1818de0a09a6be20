// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePool;

use crate::db::{self, format_date, parse_date, Table};

#[derive(Debug, Clone, PartialEq)]
pub struct MarketCapRecord {
    pub symbol: String,
    pub market_cap: f64,
    pub date: NaiveDateTime,
}

/// Replace the whole market_cap table with `records`. The drop, create and
/// inserts share one transaction, so a failed batch keeps the old snapshot.
pub async fn replace_market_caps(pool: &SqlitePool, records: &[MarketCapRecord]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    db::drop_table(&mut *tx, Table::MarketCap).await?;
    db::create_table(&mut *tx, Table::MarketCap).await?;

    for record in records {
        sqlx::query("INSERT INTO market_cap (symbol, market_cap, date) VALUES (?, ?, ?)")
            .bind(&record.symbol)
            .bind(record.market_cap)
            .bind(format_date(record.date))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert market cap for {}", record.symbol))?;
    }
    tx.commit().await?;

    Ok(records.len() as u64)
}

pub async fn list_market_caps(pool: &SqlitePool) -> Result<Vec<MarketCapRecord>> {
    let rows = sqlx::query_as::<_, (String, f64, String)>(
        r#"
        SELECT symbol, market_cap, date
        FROM market_cap
        ORDER BY market_cap DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(symbol, market_cap, date)| {
            Ok(MarketCapRecord {
                symbol,
                market_cap,
                date: parse_date(&date)?,
            })
        })
        .collect()
}
