//! Market-wide sentiment from the Fear & Greed index

use super::{classify, SourceFetcher};
use crate::client::FearGreedClient;
use crate::types::{FetchFailure, Metric, SourceReading};
use async_trait::async_trait;

pub const PROVIDER: &str = "alternative.me";

pub struct FearGreedFetcher {
    client: FearGreedClient,
}

impl FearGreedFetcher {
    pub fn new(client: FearGreedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for FearGreedFetcher {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn metric(&self) -> Metric {
        Metric::FearGreedValue
    }

    fn market_wide(&self) -> bool {
        true
    }

    async fn fetch(&self, _symbol: &str) -> Result<SourceReading, FetchFailure> {
        let point = self
            .client
            .current()
            .await
            .map_err(|e| classify(PROVIDER, Metric::FearGreedValue, e))?;

        Ok(SourceReading::live(
            PROVIDER,
            Metric::FearGreedValue,
            f64::from(point.value),
            point.timestamp,
        ))
    }
}
