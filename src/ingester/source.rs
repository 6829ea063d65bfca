//! Common fetcher utilities

use super::{FearGreedFetcher, FundingFetcher, MomentumFetcher, SourceFetcher};
use crate::client::MarketClients;
use crate::config::Config;
use crate::error::EdgeError;
use crate::types::{FailureReason, FetchFailure, Metric, SourceReading};
use std::sync::Arc;
use std::time::Duration;

/// Map a client error onto the fetch failure taxonomy
pub fn classify(provider: &str, metric: Metric, err: EdgeError) -> FetchFailure {
    let reason = match &err {
        EdgeError::RateLimited { .. } => FailureReason::RateLimited,
        EdgeError::Network(e) if e.is_timeout() => FailureReason::Timeout,
        EdgeError::Network(e) if e.is_decode() => FailureReason::ParseError,
        EdgeError::Json(_) | EdgeError::Malformed(_) => FailureReason::ParseError,
        _ => FailureReason::HttpError,
    };
    FetchFailure::new(provider, metric, reason, err.to_string())
}

/// Run one fetch under a hard deadline. Elapsed counts as a timeout failure.
pub async fn fetch_with_timeout(
    fetcher: &dyn SourceFetcher,
    symbol: &str,
    timeout: Duration,
) -> Result<SourceReading, FetchFailure> {
    match tokio::time::timeout(timeout, fetcher.fetch(symbol)).await {
        Ok(result) => result,
        Err(_) => Err(FetchFailure::new(
            fetcher.provider(),
            fetcher.metric(),
            FailureReason::Timeout,
            format!("no response within {}ms", timeout.as_millis()),
        )),
    }
}

/// The production fetcher set: momentum, sentiment and two funding venues
pub fn default_fetchers(config: &Config, clients: &MarketClients) -> Vec<Arc<dyn SourceFetcher>> {
    vec![
        Arc::new(MomentumFetcher::new(
            clients.coingecko.clone(),
            config.coins.clone(),
        )),
        Arc::new(FearGreedFetcher::new(clients.fear_greed.clone())),
        Arc::new(FundingFetcher::binance(
            clients.funding.clone(),
            &config.funding.quote,
        )),
        Arc::new(FundingFetcher::bybit(
            clients.funding.clone(),
            &config.funding.quote,
        )),
    ]
}
