// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, SubsecRound, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::api::{CryptoCompareClient, DailyBar};
use crate::config::Config;
use crate::db::{self, Table};
use crate::models::series::{SymbolSeries, WideTable};
use crate::models::{
    insert_price_records, insert_volume_records, price_records, prices_before, replace_coin_info,
    replace_market_caps, volume_records, CoinInfo, MarketCapRecord,
};
use crate::policy::{self, FetchWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Stored data is within its freshness window; nothing was requested.
    Skipped,
    Updated { rows: u64 },
}

/// Refresh every table in order. The first error aborts the run.
pub async fn update_all(
    pool: &SqlitePool,
    client: &CryptoCompareClient,
    config: &Config,
) -> Result<Vec<(Table, UpdateOutcome)>> {
    let now = Utc::now().naive_utc().trunc_subsecs(0);
    let mut outcomes = Vec::with_capacity(Table::ALL.len());

    for table in Table::ALL {
        let outcome = update_table(pool, client, config, table, now).await?;
        if let UpdateOutcome::Updated { rows } = outcome {
            info!("✅ {} updated with {} rows", table, rows);
        }
        outcomes.push((table, outcome));
    }

    Ok(outcomes)
}

pub async fn update_table(
    pool: &SqlitePool,
    client: &CryptoCompareClient,
    config: &Config,
    table: Table,
    now: NaiveDateTime,
) -> Result<UpdateOutcome> {
    let max_age = config.freshness.max_age(table);
    if !policy::should_fetch_data(pool, table, max_age, now).await? {
        info!(
            "{} was updated within the last {} hours, skipping",
            table,
            max_age.num_hours()
        );
        return Ok(UpdateOutcome::Skipped);
    }

    let rows = match table {
        Table::CoinInfo => populate_coin_info(pool, client, config, now).await?,
        Table::PriceHistory => populate_price_history(pool, client, config, now).await?,
        Table::TradingVolumes => populate_trading_volumes(pool, client, config, now).await?,
        Table::MarketCap => populate_market_cap(pool, client, config, now).await?,
    };

    Ok(UpdateOutcome::Updated { rows })
}

/// Newest stored date, `None` when the table does not exist yet
async fn stored_until(pool: &SqlitePool, table: Table) -> Result<Option<NaiveDateTime>> {
    if db::table_exists(pool, table).await? {
        db::newest_date(pool, table).await
    } else {
        Ok(None)
    }
}

/// Requests daily history for each symbol in turn and joins the chosen field on date.
async fn fetch_history(
    client: &CryptoCompareClient,
    symbols: &[String],
    window: &FetchWindow,
    field: fn(&DailyBar) -> f64,
) -> Result<WideTable> {
    let progress = ProgressBar::new(symbols.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}")?
            .progress_chars("=>-"),
    );

    let mut series = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        progress.set_message(symbol.clone());
        let bars = client
            .get_daily_history(symbol, window.limit, window.end_timestamp())
            .await?;
        let points = bars.iter().map(|bar| (bar.time, field(bar))).collect();
        series.push(SymbolSeries::new(symbol.clone(), points));
        progress.inc(1);
    }
    progress.finish_and_clear();

    let table = WideTable::outer_merge(series);
    if table.is_empty() {
        warn!("No history returned for {}", symbols.join(","));
    } else {
        debug!(
            "Fetched {} days across {} symbols, {:?} to {:?}",
            table.len(),
            table.symbols().len(),
            table.dates().next(),
            table.dates().last()
        );
    }
    Ok(table)
}

async fn populate_price_history(
    pool: &SqlitePool,
    client: &CryptoCompareClient,
    config: &Config,
    now: NaiveDateTime,
) -> Result<u64> {
    let newest = stored_until(pool, Table::PriceHistory).await?;
    let window = FetchWindow::new(newest, now);
    info!(
        "Fetching price history for {} symbols (limit {} days, {} days since last update)",
        config.symbols.len(),
        window.limit,
        window.lookback_days()
    );

    let mut prices = fetch_history(client, &config.symbols, &window, |bar| bar.close).await?;
    if let Some(newest) = newest {
        // The first refetched day needs its predecessor for the change
        prices.fill_missing(prices_before(pool, newest).await?);
    }
    let records = price_records(&prices, newest);

    db::create_table(pool, Table::PriceHistory).await?;
    insert_price_records(pool, &records)
        .await
        .context("Failed to store price history")
}

async fn populate_trading_volumes(
    pool: &SqlitePool,
    client: &CryptoCompareClient,
    config: &Config,
    now: NaiveDateTime,
) -> Result<u64> {
    let newest = stored_until(pool, Table::TradingVolumes).await?;
    let window = FetchWindow::new(newest, now);
    info!(
        "Fetching trading volumes for {} symbols (limit {} days, {} days since last update)",
        config.symbols.len(),
        window.limit,
        window.lookback_days()
    );

    let volumes = fetch_history(client, &config.symbols, &window, |bar| bar.volume_to).await?;
    let records = volume_records(&volumes, newest);

    db::create_table(pool, Table::TradingVolumes).await?;
    insert_volume_records(pool, &records)
        .await
        .context("Failed to store trading volumes")
}

async fn populate_market_cap(
    pool: &SqlitePool,
    client: &CryptoCompareClient,
    config: &Config,
    now: NaiveDateTime,
) -> Result<u64> {
    info!("Fetching market caps for {}", config.symbols.join(","));
    let records: Vec<MarketCapRecord> = client
        .get_market_caps(&config.symbols)
        .await?
        .into_iter()
        .map(|(symbol, market_cap)| MarketCapRecord {
            symbol,
            market_cap,
            date: now,
        })
        .collect();

    replace_market_caps(pool, &records)
        .await
        .context("Failed to store market caps")
}

/// Coin descriptions change rarely; the table is rebuilt from scratch on each refresh.
async fn populate_coin_info(
    pool: &SqlitePool,
    client: &CryptoCompareClient,
    config: &Config,
    now: NaiveDateTime,
) -> Result<u64> {
    info!("Fetching coin list");
    let coin_list = client.get_coin_list().await?;

    let mut coins = Vec::with_capacity(config.symbols.len());
    for symbol in &config.symbols {
        let listing = coin_list
            .get(symbol)
            .with_context(|| format!("{} is missing from the coin list", symbol))?;
        coins.push(CoinInfo {
            symbol: symbol.clone(),
            name: listing.coin_name.clone(),
            description: listing.description.clone().unwrap_or_default(),
            image_url: listing
                .image_url
                .as_ref()
                .map(|path| format!("{}{}", config.image_base_url, path))
                .unwrap_or_default(),
            date: now,
        });
    }

    replace_coin_info(pool, &coins)
        .await
        .context("Failed to store coin info")
}
