//! CoinGecko API client for spot market data

use super::get_json;
use crate::error::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PROVIDER: &str = "coingecko";

/// CoinGecko free API client
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
}

/// One entry of `/simple/price`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimplePrice {
    pub usd: Option<f64>,
    pub usd_market_cap: Option<f64>,
    pub usd_24h_vol: Option<f64>,
    pub usd_24h_change: Option<f64>,
    /// Unix seconds
    pub last_updated_at: Option<i64>,
}

/// Market-wide figures from `/global`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalOverview {
    pub active_cryptocurrencies: Option<u64>,
    pub markets: Option<u64>,
    pub total_market_cap_usd: Option<f64>,
    pub total_volume_24h_usd: Option<f64>,
    pub btc_dominance_pct: Option<f64>,
    pub eth_dominance_pct: Option<f64>,
    pub market_cap_change_24h_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoin {
    pub id: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub market_cap_rank: Option<u32>,
    pub thumb: Option<String>,
    pub score: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GlobalEnvelope {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    active_cryptocurrencies: Option<u64>,
    markets: Option<u64>,
    #[serde(default)]
    total_market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
    market_cap_change_percentage_24h_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TrendingEnvelope {
    #[serde(default)]
    coins: Vec<TrendingEntry>,
}

#[derive(Debug, Deserialize)]
struct TrendingEntry {
    item: TrendingCoin,
}

impl CoinGeckoClient {
    pub fn with_http(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// USD price, market cap, volume and 24h change keyed by coin id.
    /// Ids CoinGecko does not know are simply absent from the map.
    pub async fn simple_prices(&self, coin_ids: &[String]) -> Result<HashMap<String, SimplePrice>> {
        let url = format!("{}/simple/price", self.base_url);
        let query = [
            ("ids", coin_ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("include_last_updated_at", "true".to_string()),
        ];
        get_json(&self.http, PROVIDER, &url, &query).await
    }

    pub async fn global(&self) -> Result<GlobalOverview> {
        let url = format!("{}/global", self.base_url);
        let resp: GlobalEnvelope = get_json(&self.http, PROVIDER, &url, &[]).await?;
        let data = resp.data;

        Ok(GlobalOverview {
            active_cryptocurrencies: data.active_cryptocurrencies,
            markets: data.markets,
            total_market_cap_usd: data.total_market_cap.get("usd").copied(),
            total_volume_24h_usd: data.total_volume.get("usd").copied(),
            btc_dominance_pct: data.market_cap_percentage.get("btc").copied(),
            eth_dominance_pct: data.market_cap_percentage.get("eth").copied(),
            market_cap_change_24h_pct: data.market_cap_change_percentage_24h_usd,
        })
    }

    pub async fn trending(&self, limit: usize) -> Result<Vec<TrendingCoin>> {
        let url = format!("{}/search/trending", self.base_url);
        let resp: TrendingEnvelope = get_json(&self.http, PROVIDER, &url, &[]).await?;
        Ok(resp.coins.into_iter().take(limit).map(|c| c.item).collect())
    }
}
