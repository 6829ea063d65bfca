//! Perpetual funding rates from Binance and Bybit

use super::get_json;
use crate::error::{EdgeError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct FundingClient {
    http: Client,
    binance_url: String,
    bybit_url: String,
}

/// Funding rate of one pair on one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRow {
    pub symbol: String,
    pub funding_rate: Option<f64>,
    /// Unix millis
    pub next_funding_time: Option<i64>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinancePremiumIndex {
    symbol: String,
    last_funding_rate: String,
    next_funding_time: Option<i64>,
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitEnvelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<BybitResult>,
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BybitResult {
    #[serde(default)]
    list: Vec<BybitTicker>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    symbol: String,
    funding_rate: Option<String>,
    next_funding_time: Option<String>,
}

fn parse_rate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|r| r.is_finite())
}

fn from_millis(ms: Option<i64>) -> DateTime<Utc> {
    ms.and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

impl FundingClient {
    pub fn with_http(http: Client, binance_url: &str, bybit_url: &str) -> Self {
        Self {
            http,
            binance_url: binance_url.to_string(),
            bybit_url: bybit_url.to_string(),
        }
    }

    /// Binance USD-M premium index. `None` returns every listed pair.
    pub async fn binance(&self, symbol: Option<&str>) -> Result<Vec<FundingRow>> {
        let query: Vec<(&str, String)> = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        let resp: OneOrMany<BinancePremiumIndex> =
            get_json(&self.http, "binance-funding", &self.binance_url, &query).await?;

        Ok(resp
            .into_vec()
            .into_iter()
            .map(|item| FundingRow {
                funding_rate: parse_rate(&item.last_funding_rate),
                next_funding_time: item.next_funding_time,
                observed_at: from_millis(item.time),
                symbol: item.symbol,
            })
            .collect())
    }

    /// Bybit linear tickers. `None` returns every listed pair.
    pub async fn bybit(&self, symbol: Option<&str>) -> Result<Vec<FundingRow>> {
        let mut query = vec![("category", "linear".to_string())];
        if let Some(s) = symbol {
            query.push(("symbol", s.to_string()));
        }
        let resp: BybitEnvelope =
            get_json(&self.http, "bybit-funding", &self.bybit_url, &query).await?;

        if resp.ret_code != 0 {
            return Err(EdgeError::Api(format!(
                "bybit retCode {}: {}",
                resp.ret_code, resp.ret_msg
            )));
        }
        let observed_at = from_millis(resp.time);
        let list = resp
            .result
            .ok_or_else(|| EdgeError::Malformed("bybit response without result".to_string()))?
            .list;

        Ok(list
            .into_iter()
            .map(|item| FundingRow {
                funding_rate: item.funding_rate.as_deref().and_then(parse_rate),
                next_funding_time: item
                    .next_funding_time
                    .as_deref()
                    .and_then(|t| t.trim().parse().ok()),
                observed_at,
                symbol: item.symbol,
            })
            .collect())
    }
}
