// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://min-api.cryptocompare.com";

/// Client for the CryptoCompare min-api
#[derive(Clone)]
pub struct CryptoCompareClient {
    client: Client,
    base_url: String,
    api_key: String,
    quote_currency: String,
}

/// One day of history for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub time: NaiveDateTime,
    pub close: f64,
    pub volume_to: f64,
}

/// Entry of the full coin list
#[derive(Debug, Clone, Deserialize)]
pub struct CoinListing {
    #[serde(rename = "CoinName")]
    pub coin_name: String,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "ImageUrl", default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoDayResponse {
    #[serde(rename = "Response", default)]
    response: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "Data", default)]
    data: HistoDayData,
}

#[derive(Debug, Default, Deserialize)]
struct HistoDayData {
    #[serde(rename = "Data", default)]
    data: Vec<HistoDayPoint>,
}

#[derive(Debug, Deserialize)]
struct HistoDayPoint {
    time: i64,
    close: f64,
    #[serde(rename = "volumeto")]
    volume_to: f64,
}

#[derive(Debug, Deserialize)]
struct PriceMultiFullResponse {
    #[serde(rename = "Response", default)]
    response: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "RAW", default)]
    raw: HashMap<String, HashMap<String, RawQuote>>,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "MKTCAP")]
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoinListResponse {
    #[serde(rename = "Response", default)]
    response: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "Data", default)]
    data: HashMap<String, CoinListing>,
}

/// CryptoCompare answers some failures with HTTP 200 and `"Response": "Error"`.
fn ensure_api_success(response: Option<&str>, message: Option<&str>) -> Result<()> {
    if response == Some("Error") {
        bail!("CryptoCompare API error: {}", message.unwrap_or("no message"));
    }
    Ok(())
}

impl CryptoCompareClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            quote_currency: "USD".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_quote_currency(mut self, quote_currency: &str) -> Self {
        self.quote_currency = quote_currency.to_string();
        self
    }

    pub fn histoday_url(&self, symbol: &str, limit: i64, to_ts: i64) -> String {
        format!(
            "{}/data/v2/histoday?fsym={}&tsym={}&limit={}&toTs={}&api_key={}",
            self.base_url, symbol, self.quote_currency, limit, to_ts, self.api_key
        )
    }

    pub fn price_multi_full_url(&self, symbols: &[String]) -> String {
        format!(
            "{}/data/pricemultifull?fsyms={}&tsyms={}&api_key={}",
            self.base_url,
            symbols.join(","),
            self.quote_currency,
            self.api_key
        )
    }

    pub fn coin_list_url(&self) -> String {
        format!("{}/data/all/coinlist?api_key={}", self.base_url, self.api_key)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;

        if !status.is_success() {
            bail!("{} request failed with status {}: {}", what, status, text);
        }

        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} response", what))
    }

    /// Daily bars up to `to_ts`. The API returns `limit + 1` bars, oldest first.
    pub async fn get_daily_history(&self, symbol: &str, limit: i64, to_ts: i64) -> Result<Vec<DailyBar>> {
        if symbol.is_empty() {
            bail!("symbol empty");
        }

        debug!(symbol, limit, to_ts, "requesting daily history");
        let body: HistoDayResponse = self
            .get_json(&self.histoday_url(symbol, limit, to_ts), "histoday")
            .await
            .with_context(|| format!("Daily history for {}", symbol))?;
        ensure_api_success(body.response.as_deref(), body.message.as_deref())
            .with_context(|| format!("Daily history for {}", symbol))?;

        body.data
            .data
            .into_iter()
            .map(|point| {
                let time = DateTime::from_timestamp(point.time, 0)
                    .with_context(|| format!("Invalid timestamp {} for {}", point.time, symbol))?
                    .naive_utc();
                Ok(DailyBar {
                    time,
                    close: point.close,
                    volume_to: point.volume_to,
                })
            })
            .collect()
    }

    /// Current market cap per symbol, in the order of `symbols`
    pub async fn get_market_caps(&self, symbols: &[String]) -> Result<Vec<(String, f64)>> {
        let body: PriceMultiFullResponse = self
            .get_json(&self.price_multi_full_url(symbols), "pricemultifull")
            .await?;
        ensure_api_success(body.response.as_deref(), body.message.as_deref())?;

        let mut market_caps = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let market_cap = body
                .raw
                .get(symbol)
                .and_then(|quotes| quotes.get(&self.quote_currency))
                .and_then(|quote| quote.market_cap);

            match market_cap {
                Some(market_cap) => market_caps.push((symbol.clone(), market_cap)),
                None => warn!("No market cap returned for {}", symbol),
            }
        }

        Ok(market_caps)
    }

    /// Full coin list keyed by symbol
    pub async fn get_coin_list(&self) -> Result<HashMap<String, CoinListing>> {
        let body: CoinListResponse = self.get_json(&self.coin_list_url(), "coinlist").await?;
        ensure_api_success(body.response.as_deref(), body.message.as_deref())?;
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server) -> CryptoCompareClient {
        CryptoCompareClient::new("test-key".to_string()).with_base_url(&server.url())
    }

    #[test]
    fn test_urls() {
        let client = CryptoCompareClient::new("secret".to_string());

        assert_eq!(
            client.histoday_url("BTC", 30, 1700000000),
            "https://min-api.cryptocompare.com/data/v2/histoday?fsym=BTC&tsym=USD&limit=30&toTs=1700000000&api_key=secret"
        );
        assert_eq!(
            client
                .clone()
                .with_quote_currency("EUR")
                .price_multi_full_url(&["BTC".to_string(), "ETH".to_string()]),
            "https://min-api.cryptocompare.com/data/pricemultifull?fsyms=BTC,ETH&tsyms=EUR&api_key=secret"
        );
        assert_eq!(
            client.with_base_url("http://localhost:9000/").coin_list_url(),
            "http://localhost:9000/data/all/coinlist?api_key=secret"
        );
    }

    #[tokio::test]
    async fn test_get_daily_history() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data/v2/histoday")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("fsym".into(), "ETH".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
                Matcher::UrlEncoded("toTs".into(), "1700092800".into()),
                Matcher::UrlEncoded("api_key".into(), "test-key".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "Response": "Success",
                    "Message": "",
                    "Data": {
                        "Aggregated": false,
                        "Data": [
                            {"time": 1700006400, "close": 2010.5, "volumeto": 1.5e9, "high": 2050.0},
                            {"time": 1700092800, "close": 2050.0, "volumeto": 1.2e9, "high": 2100.0}
                        ]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let bars = client(&server).get_daily_history("ETH", 1, 1700092800).await?;

        mock.assert_async().await;
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].time,
            NaiveDate::from_ymd_opt(2023, 11, 15).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(bars[1].close, 2050.0);
        assert_eq!(bars[1].volume_to, 1.2e9);
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/v2/histoday")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let err = client(&server)
            .get_daily_history("BTC", 10, 1700092800)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("500"));
    }

    #[tokio::test]
    async fn test_api_error_body_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/v2/histoday")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "Response": "Error",
                    "Message": "You are over your rate limit please upgrade your account!",
                    "Data": {}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = client(&server)
            .get_daily_history("BTC", 10, 1700092800)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("rate limit"));
    }

    #[tokio::test]
    async fn test_get_market_caps_skips_missing_symbols() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/pricemultifull")
            .match_query(Matcher::UrlEncoded("fsyms".into(), "BTC,ETH,XYZ".into()))
            .with_status(200)
            .with_body(
                json!({
                    "RAW": {
                        "ETH": {"USD": {"PRICE": 2000.0, "MKTCAP": 2.4e11}},
                        "BTC": {"USD": {"PRICE": 37000.0, "MKTCAP": 7.2e11}}
                    },
                    "DISPLAY": {}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let symbols: Vec<String> = ["BTC", "ETH", "XYZ"].iter().map(|s| s.to_string()).collect();
        let market_caps = client(&server).get_market_caps(&symbols).await?;

        assert_eq!(
            market_caps,
            vec![("BTC".to_string(), 7.2e11), ("ETH".to_string(), 2.4e11)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_get_coin_list() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/all/coinlist")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "Response": "Success",
                    "Data": {
                        "BTC": {
                            "Id": "1182",
                            "ImageUrl": "/media/37746251/btc.png",
                            "Symbol": "BTC",
                            "CoinName": "Bitcoin",
                            "Description": "Bitcoin is the first decentralized digital currency."
                        },
                        "NOIMG": {"CoinName": "No Image"}
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let coins = client(&server).get_coin_list().await?;

        let btc = &coins["BTC"];
        assert_eq!(btc.coin_name, "Bitcoin");
        assert_eq!(btc.image_url.as_deref(), Some("/media/37746251/btc.png"));
        assert_eq!(coins["NOIMG"].image_url, None);
        assert_eq!(coins["NOIMG"].description, None);
        Ok(())
    }
}
