//! Perpetual funding rate per pair, one fetcher per exchange

use super::{classify, SourceFetcher};
use crate::client::FundingClient;
use crate::types::{FailureReason, FetchFailure, Metric, SourceReading};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Venue {
    Binance,
    Bybit,
}

impl Venue {
    pub fn provider(&self) -> &'static str {
        match self {
            Venue::Binance => "binance-funding",
            Venue::Bybit => "bybit-funding",
        }
    }
}

pub struct FundingFetcher {
    client: FundingClient,
    venue: Venue,
    /// Quote asset appended to the symbol, e.g. USDT
    quote: String,
}

impl FundingFetcher {
    pub fn binance(client: FundingClient, quote: &str) -> Self {
        Self::new(client, Venue::Binance, quote)
    }

    pub fn bybit(client: FundingClient, quote: &str) -> Self {
        Self::new(client, Venue::Bybit, quote)
    }

    fn new(client: FundingClient, venue: Venue, quote: &str) -> Self {
        Self {
            client,
            venue,
            quote: quote.to_uppercase(),
        }
    }

    pub fn pair(&self, symbol: &str) -> String {
        format!("{}{}", symbol.to_uppercase(), self.quote)
    }
}

#[async_trait]
impl SourceFetcher for FundingFetcher {
    fn provider(&self) -> &str {
        self.venue.provider()
    }

    fn metric(&self) -> Metric {
        Metric::FundingRate
    }

    async fn fetch(&self, symbol: &str) -> Result<SourceReading, FetchFailure> {
        let pair = self.pair(symbol);
        let rows = match self.venue {
            Venue::Binance => self.client.binance(Some(&pair)).await,
            Venue::Bybit => self.client.bybit(Some(&pair)).await,
        }
        .map_err(|e| classify(self.provider(), Metric::FundingRate, e))?;

        let row = rows.into_iter().find(|r| r.symbol == pair);
        match row.and_then(|r| r.funding_rate.map(|rate| (rate, r.observed_at))) {
            Some((rate, observed_at)) => Ok(SourceReading::live(
                self.provider(),
                Metric::FundingRate,
                rate,
                observed_at,
            )),
            None => Err(FetchFailure::new(
                self.provider(),
                Metric::FundingRate,
                FailureReason::ParseError,
                format!("no funding rate for {}", pair),
            )),
        }
    }
}
