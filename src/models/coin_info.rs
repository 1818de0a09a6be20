// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePool;

use crate::db::{self, format_date, parse_date, Table};

#[derive(Debug, Clone, PartialEq)]
pub struct CoinInfo {
    pub symbol: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub date: NaiveDateTime,
}

/// Rebuild the coin_info table from `coins`. Drop, create and inserts run in
/// one transaction; `symbol` is the primary key, so a duplicate symbol aborts
/// the batch and the previous rows stay.
pub async fn replace_coin_info(pool: &SqlitePool, coins: &[CoinInfo]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    db::drop_table(&mut *tx, Table::CoinInfo).await?;
    db::create_table(&mut *tx, Table::CoinInfo).await?;

    for coin in coins {
        sqlx::query(
            r#"
            INSERT INTO coin_info (symbol, name, description, image_url, date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&coin.symbol)
        .bind(&coin.name)
        .bind(&coin.description)
        .bind(&coin.image_url)
        .bind(format_date(coin.date))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert coin info for {}", coin.symbol))?;
    }

    tx.commit().await?;
    Ok(coins.len() as u64)
}

pub async fn list_coin_info(pool: &SqlitePool) -> Result<Vec<CoinInfo>> {
    let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"
        SELECT symbol, name, description, image_url, date
        FROM coin_info
        ORDER BY symbol
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(symbol, name, description, image_url, date)| {
            Ok(CoinInfo {
                symbol,
                name,
                description,
                image_url,
                date: parse_date(&date)?,
            })
        })
        .collect()
}
