//! Source fetchers
//!
//! Each fetcher retrieves one metric from one provider:
//! - CoinGecko 24h price change (momentum)
//! - Alternative.me Fear & Greed index (market wide)
//! - Binance / Bybit perpetual funding rate
//!
//! A fetch yields either a live `SourceReading` or a typed `FetchFailure`.
//! Fetchers keep no state and never retry.

pub mod coingecko;
pub mod fear_greed;
pub mod funding;
pub mod source;


pub use coingecko::MomentumFetcher;
pub use fear_greed::FearGreedFetcher;
pub use funding::{FundingFetcher, Venue};
pub use source::{classify, default_fetchers, fetch_with_timeout};

use crate::types::{FetchFailure, Metric, SourceReading};
use async_trait::async_trait;

/// Symbol key used for readings that do not depend on the asset
pub const MARKET_WIDE: &str = "*";

/// One metric from one upstream provider
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Provider identifier, e.g. "coingecko"
    fn provider(&self) -> &str;

    fn metric(&self) -> Metric;

    /// Market-wide fetchers are called once per request, not per symbol
    fn market_wide(&self) -> bool {
        false
    }

    async fn fetch(&self, symbol: &str) -> Result<SourceReading, FetchFailure>;
}
