// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePool;

use super::series::{LongRow, WideTable};
use crate::db::{format_date, parse_date};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: NaiveDateTime,
    pub price: f64,
    pub price_change: Option<f64>,
}

/// Long-format price rows with their day-over-day change.
///
/// Rows dated at or after `stored_until` are kept. The newest stored day was
/// fetched before it closed, so its refetched bar replaces it. Seed `prices`
/// with [`prices_before`] so the first kept row is compared against the last
/// complete stored day.
pub fn price_records(prices: &WideTable, stored_until: Option<NaiveDateTime>) -> Vec<PriceRecord> {
    let changes = prices.pct_change();

    prices
        .melt()
        .into_iter()
        .filter(|row| stored_until.map_or(true, |newest| row.date >= newest))
        .map(|row| PriceRecord {
            price_change: changes.value(row.date, &row.symbol),
            symbol: row.symbol,
            date: row.date,
            price: row.value,
        })
        .collect()
}

/// Each symbol's last stored price dated before `date`
pub async fn prices_before(pool: &SqlitePool, date: NaiveDateTime) -> Result<Vec<LongRow>> {
    let rows = sqlx::query_as::<_, (String, String, f64)>(
        r#"
        SELECT symbol, date, price
        FROM price_history AS p
        WHERE date = (
            SELECT MAX(date) FROM price_history
            WHERE symbol = p.symbol AND date < ?
        )
        ORDER BY symbol
        "#,
    )
    .bind(format_date(date))
    .fetch_all(pool)
    .await
    .context("Failed to read stored prices")?;

    rows.into_iter()
        .map(|(symbol, date, value)| {
            Ok(LongRow {
                symbol,
                date: parse_date(&date)?,
                value,
            })
        })
        .collect()
}

/// Store price rows in one transaction, replacing any row already stored for
/// the same symbol and date. Nothing is stored if any row fails.
pub async fn insert_price_records(pool: &SqlitePool, records: &[PriceRecord]) -> Result<u64> {
    let mut tx = pool.begin().await?;

    for record in records {
        let date = format_date(record.date);
        sqlx::query("DELETE FROM price_history WHERE symbol = ? AND date = ?")
            .bind(&record.symbol)
            .bind(&date)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to replace price for {} on {}", record.symbol, date))?;

        sqlx::query(
            r#"
            INSERT INTO price_history (symbol, date, price, price_change)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(&date)
        .bind(record.price)
        .bind(record.price_change)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert price for {} on {}", record.symbol, date))?;
    }

    tx.commit().await?;
    Ok(records.len() as u64)
}

/// List stored prices ordered by date, then symbol
pub async fn list_price_history(pool: &SqlitePool) -> Result<Vec<PriceRecord>> {
    let rows = sqlx::query_as::<_, (String, String, f64, Option<f64>)>(
        r#"
        SELECT symbol, date, price, price_change
        FROM price_history
        ORDER BY date, symbol
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(symbol, date, price, price_change)| {
            Ok(PriceRecord {
                symbol,
                date: parse_date(&date)?,
                price,
                price_change,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Table};
    use crate::models::series::SymbolSeries;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_price_records_replace_newest_stored_day() {
        let mut prices = WideTable::outer_merge([
            SymbolSeries::new("BTC", vec![(day(2), 200.0), (day(3), 220.0)]),
            SymbolSeries::new("ETH", vec![(day(3), 11.0)]),
        ]);
        prices.fill_missing([
            LongRow { symbol: "BTC".to_string(), date: day(1), value: 90.0 },
            LongRow { symbol: "ETH".to_string(), date: day(1), value: 10.0 },
        ]);

        let records = price_records(&prices, Some(day(2)));

        assert_eq!(records.len(), 3);
        let btc_day2 = &records[0];
        assert_eq!((btc_day2.symbol.as_str(), btc_day2.date), ("BTC", day(2)));
        assert_relative_eq!(btc_day2.price, 200.0);
        assert_relative_eq!(btc_day2.price_change.unwrap(), 110.0 / 90.0 * 100.0, epsilon = 1e-9);
        assert_relative_eq!(records[1].price_change.unwrap(), 10.0, epsilon = 1e-9);

        // ETH has no bar on day 2, so day 3 has nothing to compare against
        let eth_day3 = &records[2];
        assert_eq!((eth_day3.symbol.as_str(), eth_day3.date), ("ETH", day(3)));
        assert_eq!(eth_day3.price_change, None);
    }

    #[test]
    fn test_price_records_without_history_keep_everything() {
        let prices = WideTable::outer_merge([SymbolSeries::new(
            "BTC",
            vec![(day(1), 1.0), (day(2), 2.0)],
        )]);

        let records = price_records(&prices, None);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].price_change, None);
        assert_relative_eq!(records[1].price_change.unwrap(), 100.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_insert_and_list_prices() -> Result<()> {
        let pool = db::create_test_pool().await?;
        db::create_table(&pool, Table::PriceHistory).await?;

        let records = vec![
            PriceRecord {
                symbol: "ETH".to_string(),
                date: day(2),
                price: 3000.5,
                price_change: Some(1.5),
            },
            PriceRecord {
                symbol: "BTC".to_string(),
                date: day(2),
                price: 60000.0,
                price_change: None,
            },
        ];

        assert_eq!(insert_price_records(&pool, &records).await?, 2);

        let stored = list_price_history(&pool).await?;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].symbol, "BTC");
        assert_eq!(stored[0].price_change, None);
        assert_eq!(stored[1], records[0]);
        assert_eq!(db::newest_date(&pool, Table::PriceHistory).await?, Some(day(2)));
        Ok(())
    }

    fn record(symbol: &str, date: NaiveDateTime, price: f64) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_string(),
            date,
            price,
            price_change: None,
        }
    }

    #[tokio::test]
    async fn test_insert_replaces_same_symbol_and_day() -> Result<()> {
        let pool = db::create_test_pool().await?;
        db::create_table(&pool, Table::PriceHistory).await?;
        insert_price_records(
            &pool,
            &[record("BTC", day(1), 90.0), record("BTC", day(2), 100.0), record("ETH", day(2), 5.0)],
        )
        .await?;

        insert_price_records(&pool, &[record("BTC", day(2), 200.0), record("BTC", day(3), 220.0)]).await?;

        let stored: Vec<_> = list_price_history(&pool)
            .await?
            .into_iter()
            .map(|r| (r.symbol, r.date, r.price))
            .collect();
        assert_eq!(
            stored,
            vec![
                ("BTC".to_string(), day(1), 90.0),
                ("BTC".to_string(), day(2), 200.0),
                ("ETH".to_string(), day(2), 5.0),
                ("BTC".to_string(), day(3), 220.0),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_prices_before_takes_last_day_per_symbol() -> Result<()> {
        let pool = db::create_test_pool().await?;
        db::create_table(&pool, Table::PriceHistory).await?;
        insert_price_records(
            &pool,
            &[
                record("BTC", day(1), 90.0),
                record("BTC", day(2), 95.0),
                record("BTC", day(3), 100.0),
                record("ETH", day(1), 5.0),
            ],
        )
        .await?;

        let previous = prices_before(&pool, day(3)).await?;

        let cells: Vec<_> = previous.iter().map(|r| (r.symbol.as_str(), r.date, r.value)).collect();
        assert_eq!(cells, vec![("BTC", day(2), 95.0), ("ETH", day(1), 5.0)]);
        assert!(prices_before(&pool, day(1)).await?.is_empty());
        Ok(())
    }
}
