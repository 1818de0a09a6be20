// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::db::Table;

pub const API_KEY_VAR: &str = "CRYPTOCOMPARE_API_KEY";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub api_base_url: String,
    pub image_base_url: String,
    pub quote_currency: String,
    pub symbols: Vec<String>,
    pub freshness: Freshness,
}

/// Maximum age per table, in hours, before stored data counts as outdated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Freshness {
    pub coin_info_hours: u32,
    pub price_history_hours: u32,
    pub trading_volumes_hours: u32,
    pub market_cap_hours: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://crypto_data.db".to_string(),
            api_base_url: crate::api::DEFAULT_BASE_URL.to_string(),
            image_base_url: "https://www.cryptocompare.com".to_string(),
            quote_currency: "USD".to_string(),
            symbols: ["BTC", "ETH", "BNB", "XRP", "ADA", "SOL", "DOGE", "DOT", "LTC", "LINK"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            freshness: Freshness::default(),
        }
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self {
            coin_info_hours: 4380, // roughly six months
            price_history_hours: 24,
            trading_volumes_hours: 24,
            market_cap_hours: 24,
        }
    }
}

impl Freshness {
    pub fn max_age(&self, table: Table) -> Duration {
        let hours = match table {
            Table::CoinInfo => self.coin_info_hours,
            Table::PriceHistory => self.price_history_hours,
            Table::TradingVolumes => self.trading_volumes_hours,
            Table::MarketCap => self.market_cap_hours,
        };
        Duration::hours(i64::from(hours))
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("config must list at least one symbol");
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
                bail!("invalid symbol {:?}: expected ASCII letters and digits", symbol);
            }
            if !seen.insert(symbol.as_str()) {
                bail!("symbol {} is listed more than once", symbol);
            }
        }
        if self.quote_currency.trim().is_empty() {
            bail!("quote_currency must not be empty");
        }
        Ok(())
    }
}

/// Loads the config file at `path`, falling back to defaults when it does not exist.
/// `DATABASE_URL` in the environment takes precedence over the file.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        parse_config(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        info!("No config file at {}, using defaults", path.display());
        Config::default()
    };

    if let Ok(url) = env::var(DATABASE_URL_VAR) {
        config.database_url = url;
    }

    config.validate()?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(config_str)?;
    Ok(config)
}
