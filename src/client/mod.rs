//! Upstream market-data API clients
//!
//! Thin wrappers around the public JSON endpoints the dashboard reads:
//! - CoinGecko: spot prices, global overview, trending coins
//! - Alternative.me: Fear & Greed index
//! - Binance / Bybit: perpetual funding rates

mod coingecko;
mod fear_greed;
mod funding;

pub use coingecko::{CoinGeckoClient, GlobalOverview, SimplePrice, TrendingCoin};
pub use fear_greed::{FearGreedClient, FearGreedPoint, MAX_HISTORY_DAYS};
pub use funding::{FundingClient, FundingRow};

use crate::config::ProviderConfig;
use crate::error::{EdgeError, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// All upstream clients, sharing one connection pool
#[derive(Clone)]
pub struct MarketClients {
    pub coingecko: CoinGeckoClient,
    pub fear_greed: FearGreedClient,
    pub funding: FundingClient,
}

impl MarketClients {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = build_http(Duration::from_millis(config.timeout_ms))?;
        Ok(Self {
            coingecko: CoinGeckoClient::with_http(http.clone(), &config.coingecko_url),
            fear_greed: FearGreedClient::with_http(http.clone(), &config.fear_greed_url),
            funding: FundingClient::with_http(
                http,
                &config.binance_funding_url,
                &config.bybit_funding_url,
            ),
        })
    }
}

pub(crate) fn build_http(timeout: Duration) -> Result<Client> {
    let http = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("busyedge/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(http)
}

/// GET a JSON document, mapping rate limits and non-2xx statuses to typed errors
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    provider: &str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T> {
    let response = http.get(url).query(query).send().await?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(EdgeError::RateLimited {
            provider: provider.to_string(),
        });
    }
    if !status.is_success() {
        return Err(EdgeError::Api(format!("{} returned HTTP {}", provider, status)));
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}
