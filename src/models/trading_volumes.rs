// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePool;

use super::series::WideTable;
use crate::db::{format_date, parse_date};

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub symbol: String,
    pub date: NaiveDateTime,
    pub volume: f64,
}

/// Long-format volume rows. Rows dated at or after `stored_until` are kept so
/// the refetched bar replaces the newest stored day.
pub fn volume_records(volumes: &WideTable, stored_until: Option<NaiveDateTime>) -> Vec<VolumeRecord> {
    volumes
        .melt()
        .into_iter()
        .filter(|row| stored_until.map_or(true, |newest| row.date >= newest))
        .map(|row| VolumeRecord {
            symbol: row.symbol,
            date: row.date,
            volume: row.value,
        })
        .collect()
}

/// Store volume rows in one transaction, replacing rows for the same symbol and date
pub async fn insert_volume_records(pool: &SqlitePool, records: &[VolumeRecord]) -> Result<u64> {
    let mut tx = pool.begin().await?;

    for record in records {
        let date = format_date(record.date);
        sqlx::query("DELETE FROM trading_volumes WHERE symbol = ? AND date = ?")
            .bind(&record.symbol)
            .bind(&date)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to replace volume for {} on {}", record.symbol, date))?;

        sqlx::query("INSERT INTO trading_volumes (symbol, date, volume) VALUES (?, ?, ?)")
            .bind(&record.symbol)
            .bind(&date)
            .bind(record.volume)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert volume for {} on {}", record.symbol, date))?;
    }

    tx.commit().await?;
    Ok(records.len() as u64)
}

pub async fn list_trading_volumes(pool: &SqlitePool) -> Result<Vec<VolumeRecord>> {
    let rows = sqlx::query_as::<_, (String, String, f64)>(
        "SELECT symbol, date, volume FROM trading_volumes ORDER BY date, symbol",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(symbol, date, volume)| {
            Ok(VolumeRecord {
                symbol,
                date: parse_date(&date)?,
                volume,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Table};
    use crate::models::series::SymbolSeries;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_refetched_day_replaces_partial_volume() -> Result<()> {
        let pool = db::create_test_pool().await?;
        db::create_table(&pool, Table::TradingVolumes).await?;

        let first = WideTable::outer_merge([SymbolSeries::new(
            "SOL",
            vec![(day(1), 10.0), (day(2), 20.0)],
        )]);
        insert_volume_records(&pool, &volume_records(&first, None)).await?;

        // Day 2 was stored mid-day; the refetch carries its full volume
        let second = WideTable::outer_merge([SymbolSeries::new(
            "SOL",
            vec![(day(1), 10.0), (day(2), 25.0), (day(3), 30.0)],
        )]);
        let stored_until = db::newest_date(&pool, Table::TradingVolumes).await?;
        let inserted = insert_volume_records(&pool, &volume_records(&second, stored_until)).await?;
        assert_eq!(inserted, 2);

        let volumes: Vec<_> = list_trading_volumes(&pool)
            .await?
            .into_iter()
            .map(|r| (r.date, r.volume))
            .collect();
        assert_eq!(volumes, vec![(day(1), 10.0), (day(2), 25.0), (day(3), 30.0)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_without_table_fails() -> Result<()> {
        let pool = db::create_test_pool().await?;
        let record = VolumeRecord {
            symbol: "SOL".to_string(),
            date: day(1),
            volume: 1.0,
        };

        assert!(insert_volume_records(&pool, &[record]).await.is_err());
        Ok(())
    }
}
