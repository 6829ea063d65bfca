//! Market momentum from CoinGecko's 24h price change

use super::{classify, SourceFetcher};
use crate::client::CoinGeckoClient;
use crate::types::{FailureReason, FetchFailure, Metric, SourceReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const PROVIDER: &str = "coingecko";

pub struct MomentumFetcher {
    client: CoinGeckoClient,
    /// Symbol -> CoinGecko id
    coins: BTreeMap<String, String>,
}

impl MomentumFetcher {
    pub fn new(client: CoinGeckoClient, coins: BTreeMap<String, String>) -> Self {
        Self { client, coins }
    }

    fn failure(&self, reason: FailureReason, detail: String) -> FetchFailure {
        FetchFailure::new(PROVIDER, Metric::PriceChangePct, reason, detail)
    }
}

#[async_trait]
impl SourceFetcher for MomentumFetcher {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn metric(&self) -> Metric {
        Metric::PriceChangePct
    }

    async fn fetch(&self, symbol: &str) -> Result<SourceReading, FetchFailure> {
        let coin_id = self.coins.get(&symbol.to_uppercase()).ok_or_else(|| {
            self.failure(
                FailureReason::ParseError,
                format!("no CoinGecko id configured for {}", symbol),
            )
        })?;

        let mut prices = self
            .client
            .simple_prices(std::slice::from_ref(coin_id))
            .await
            .map_err(|e| classify(PROVIDER, Metric::PriceChangePct, e))?;

        let entry = prices.remove(coin_id).ok_or_else(|| {
            self.failure(
                FailureReason::ParseError,
                format!("{} missing from response", coin_id),
            )
        })?;
        let change = entry.usd_24h_change.ok_or_else(|| {
            self.failure(
                FailureReason::ParseError,
                format!("{} has no 24h change", coin_id),
            )
        })?;

        let observed_at = entry
            .last_updated_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        Ok(SourceReading::live(
            PROVIDER,
            Metric::PriceChangePct,
            change,
            observed_at,
        ))
    }
}
