//! Market data service
//!
//! Prices, global overview, funding and the Fear & Greed index for the
//! dashboard. Every feed keeps its last successful response; when the
//! upstream fails that response is served again, labelled stale, instead of
//! an error. Without a stored response the failure is reported as is.


use crate::client::{
    FearGreedPoint, FundingRow, GlobalOverview, MarketClients, TrendingCoin, MAX_HISTORY_DAYS,
};
use crate::config::Config;
use crate::error::{EdgeError, Result};
use crate::storage::TtlCache;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

const COINGECKO: &str = "coingecko";
const COINGECKO_CACHE: &str = "coingecko_cache";
const ALTERNATIVE_ME: &str = "alternative_me";
const ALTERNATIVE_ME_CACHE: &str = "alternative_me_cache";

/// Trending coins shown on the overview
pub const TRENDING_LIMIT: usize = 5;

/// A payload plus the provenance a dashboard needs to label it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served<T> {
    pub data: T,
    pub is_stale: bool,
    pub data_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl<T> Served<T> {
    pub fn live(data: T, source: &str) -> Self {
        Self {
            data,
            is_stale: false,
            data_source: source.to_string(),
            fallback_reason: None,
        }
    }

    pub fn stale(data: T, source: &str, reason: impl Into<String>) -> Self {
        Self {
            data,
            is_stale: true,
            data_source: source.to_string(),
            fallback_reason: Some(reason.into()),
        }
    }
}

/// Spot market row for one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub id: String,
    pub symbol: String,
    pub price_usd: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub change_24h_pct: Option<f64>,
    pub last_updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub global: GlobalOverview,
    pub trending: Vec<TrendingCoin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRate {
    pub funding_rate: Option<f64>,
    pub next_funding_time: Option<i64>,
}

/// Funding rate of one pair across venues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingBoard {
    pub symbol: String,
    pub binance: Option<VenueRate>,
    pub bybit: Option<VenueRate>,
    /// Mean of the venue rates that are present
    pub average_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub prices: Vec<PriceRow>,
    pub overview: MarketOverview,
    pub funding: Vec<FundingBoard>,
    pub is_stale: bool,
    /// "live" or "partial_cache"
    pub data_source: String,
    pub stale_reasons: Vec<String>,
}

/// USD prices keyed by symbol, with their provenance
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceQuote {
    pub prices: HashMap<String, f64>,
    pub is_stale: bool,
    pub data_source: String,
}

/// Where alerts and the portfolio read spot prices from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn usd_prices(&self, symbols: &[String]) -> Result<PriceQuote>;
}

pub struct MarketService {
    clients: MarketClients,
    coins: BTreeMap<String, String>,
    default_coin_ids: Vec<String>,
    default_pairs: Vec<String>,
    prices: TtlCache<String, Vec<PriceRow>>,
    overview: TtlCache<(), MarketOverview>,
    fear_greed: TtlCache<(), FearGreedPoint>,
    fear_greed_history: TtlCache<u32, Vec<FearGreedPoint>>,
}

impl MarketService {
    pub fn new(config: &Config, clients: MarketClients) -> Self {
        let ttl = config.cache.ttl_secs;
        let default_coin_ids = config
            .signal
            .default_symbols
            .iter()
            .filter_map(|s| config.coin_id(s).map(String::from))
            .collect();

        Self {
            clients,
            coins: config.coins.clone(),
            default_coin_ids,
            default_pairs: config.funding.default_pairs.clone(),
            prices: TtlCache::new(ttl),
            overview: TtlCache::new(ttl),
            fear_greed: TtlCache::new(ttl),
            fear_greed_history: TtlCache::new(ttl),
        }
    }

    fn symbol_for(&self, coin_id: &str) -> String {
        self.coins
            .iter()
            .find(|(_, id)| id.as_str() == coin_id)
            .map(|(symbol, _)| symbol.clone())
            .unwrap_or_else(|| coin_id.to_uppercase())
    }

    /// Spot prices for CoinGecko ids, largest market cap first
    pub async fn prices(&self, coin_ids: &[String]) -> Result<Served<Vec<PriceRow>>> {
        let ids = self.resolve_coin_ids(coin_ids)?;
        let key = ids.join(",");

        if let Some(rows) = self.prices.get_fresh(&key) {
            debug!("Serving prices for {} from fresh cache", key);
            return Ok(Served::live(rows, COINGECKO));
        }

        match self.clients.coingecko.simple_prices(&ids).await {
            Ok(mut payload) => {
                let mut rows: Vec<PriceRow> = ids
                    .iter()
                    .filter_map(|id| {
                        payload.remove(id).map(|p| PriceRow {
                            id: id.clone(),
                            symbol: self.symbol_for(id),
                            price_usd: p.usd,
                            market_cap: p.usd_market_cap,
                            volume_24h: p.usd_24h_vol,
                            change_24h_pct: p.usd_24h_change,
                            last_updated_at: p.last_updated_at,
                        })
                    })
                    .collect();
                rows.sort_by(|a, b| {
                    b.market_cap
                        .unwrap_or(0.0)
                        .total_cmp(&a.market_cap.unwrap_or(0.0))
                });
                if !rows.is_empty() {
                    self.prices.put(key, rows.clone());
                }
                Ok(Served::live(rows, COINGECKO))
            }
            Err(err) => {
                warn!("CoinGecko prices failed: {}", err);
                match self.cached_prices(&ids) {
                    Some(rows) => Ok(Served::stale(rows, COINGECKO_CACHE, err.to_string())),
                    None => Err(unavailable(COINGECKO, err)),
                }
            }
        }
    }

    /// Configured ids only, sorted and deduplicated so each set has one cache key
    fn resolve_coin_ids(&self, coin_ids: &[String]) -> Result<Vec<String>> {
        let requested: &[String] = if coin_ids.is_empty() {
            &self.default_coin_ids
        } else {
            coin_ids
        };

        let mut ids: Vec<String> = requested
            .iter()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .collect();
        let unknown: Vec<&str> = ids
            .iter()
            .filter(|id| !self.coins.values().any(|known| known == *id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(EdgeError::InvalidRequest(format!(
                "unknown coin ids: {} (supported: {})",
                unknown.join(", "),
                self.coins.values().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        if ids.is_empty() {
            return Err(EdgeError::InvalidRequest("no coin ids requested".to_string()));
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Last stored rows for exactly these ids, or a slice of a stored superset
    fn cached_prices(&self, ids: &[String]) -> Option<Vec<PriceRow>> {
        if let Some(cached) = self.prices.get(&ids.join(",")) {
            return Some(cached.value);
        }
        self.prices.find_map(|_, rows| {
            let by_id: HashMap<&str, &PriceRow> =
                rows.iter().map(|row| (row.id.as_str(), row)).collect();
            ids.iter()
                .map(|id| by_id.get(id.as_str()).map(|row| (*row).clone()))
                .collect::<Option<Vec<_>>>()
        })
    }

    /// Global market figures plus the top trending coins
    pub async fn overview(&self) -> Result<Served<MarketOverview>> {
        if let Some(overview) = self.overview.get_fresh(&()) {
            return Ok(Served::live(overview, COINGECKO));
        }

        let fetched = tokio::try_join!(
            self.clients.coingecko.global(),
            self.clients.coingecko.trending(TRENDING_LIMIT)
        );
        match fetched {
            Ok((global, trending)) => {
                let overview = MarketOverview { global, trending };
                self.overview.put((), overview.clone());
                Ok(Served::live(overview, COINGECKO))
            }
            Err(err) => {
                warn!("CoinGecko overview failed: {}", err);
                match self.overview.get(&()) {
                    Some(cached) => Ok(Served::stale(cached.value, COINGECKO_CACHE, err.to_string())),
                    None => Err(unavailable(COINGECKO, err)),
                }
            }
        }
    }

    /// Binance and Bybit funding per pair. A failing venue leaves its
    /// column empty; the call itself never fails.
    pub async fn funding(&self, pairs: &[String]) -> Vec<FundingBoard> {
        let targets: Vec<String> = if pairs.is_empty() {
            self.default_pairs.clone()
        } else {
            pairs.iter().map(|p| p.trim().to_uppercase()).collect()
        };

        let (binance, bybit) = tokio::join!(
            self.clients.funding.binance(None),
            self.clients.funding.bybit(None)
        );
        let binance = venue_rows("Binance", binance);
        let bybit = venue_rows("Bybit", bybit);

        targets
            .into_iter()
            .map(|symbol| {
                let binance = binance.get(&symbol).cloned();
                let bybit = bybit.get(&symbol).cloned();
                let rates: Vec<f64> = [&binance, &bybit]
                    .into_iter()
                    .filter_map(|v| v.as_ref().and_then(|v| v.funding_rate))
                    .collect();
                let average_rate =
                    (!rates.is_empty()).then(|| rates.iter().sum::<f64>() / rates.len() as f64);

                FundingBoard {
                    symbol,
                    binance,
                    bybit,
                    average_rate,
                }
            })
            .collect()
    }

    pub async fn fear_greed(&self) -> Result<Served<FearGreedPoint>> {
        if let Some(point) = self.fear_greed.get_fresh(&()) {
            return Ok(Served::live(point, ALTERNATIVE_ME));
        }

        match self.clients.fear_greed.current().await {
            Ok(point) => {
                self.fear_greed.put((), point.clone());
                Ok(Served::live(point, ALTERNATIVE_ME))
            }
            Err(err) => {
                warn!("Fear & Greed current failed: {}", err);
                match self.fear_greed.get(&()) {
                    Some(cached) => Ok(Served::stale(
                        cached.value,
                        ALTERNATIVE_ME_CACHE,
                        err.to_string(),
                    )),
                    None => Err(unavailable(ALTERNATIVE_ME, err)),
                }
            }
        }
    }

    /// Newest-first daily values for 1 to 100 days
    pub async fn fear_greed_history(&self, days: u32) -> Result<Served<Vec<FearGreedPoint>>> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(EdgeError::InvalidRequest(format!(
                "days must be between 1 and {}",
                MAX_HISTORY_DAYS
            )));
        }
        if let Some(history) = self.fear_greed_history.get_fresh(&days) {
            return Ok(Served::live(history, ALTERNATIVE_ME));
        }

        match self.clients.fear_greed.history(days).await {
            Ok(history) => {
                self.fear_greed_history.put(days, history.clone());
                Ok(Served::live(history, ALTERNATIVE_ME))
            }
            Err(err) => {
                warn!("Fear & Greed history failed: {}", err);
                match self.fear_greed_history.get(&days) {
                    Some(cached) => Ok(Served::stale(
                        cached.value,
                        ALTERNATIVE_ME_CACHE,
                        err.to_string(),
                    )),
                    None => Err(unavailable(ALTERNATIVE_ME, err)),
                }
            }
        }
    }

    /// Prices, overview and funding in one concurrent round
    pub async fn dashboard(&self, coin_ids: &[String], pairs: &[String]) -> Result<Dashboard> {
        let (prices, overview, funding) = tokio::join!(
            self.prices(coin_ids),
            self.overview(),
            self.funding(pairs)
        );
        let prices = prices?;
        let overview = overview?;

        let mut stale_reasons = Vec::new();
        if prices.is_stale {
            stale_reasons.push(format!("prices: {}", prices.data_source));
        }
        if overview.is_stale {
            stale_reasons.push(format!("overview: {}", overview.data_source));
        }
        if !funding.is_empty() && funding.iter().all(|row| row.average_rate.is_none()) {
            stale_reasons.push("funding: unavailable".to_string());
        }
        let is_stale = !stale_reasons.is_empty();

        Ok(Dashboard {
            generated_at: Utc::now(),
            prices: prices.data,
            overview: overview.data,
            funding,
            is_stale,
            data_source: if is_stale { "partial_cache" } else { "live" }.to_string(),
            stale_reasons,
        })
    }
}

#[async_trait]
impl PriceSource for MarketService {
    async fn usd_prices(&self, symbols: &[String]) -> Result<PriceQuote> {
        let mut ids = Vec::new();
        for symbol in symbols {
            let id = self
                .coins
                .get(&symbol.to_uppercase())
                .ok_or_else(|| EdgeError::UnsupportedSymbol {
                    symbol: symbol.to_uppercase(),
                    supported: self.coins.keys().cloned().collect::<Vec<_>>().join(", "),
                })?;
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.is_empty() {
            return Ok(PriceQuote {
                data_source: COINGECKO.to_string(),
                ..PriceQuote::default()
            });
        }

        let served = self.prices(&ids).await?;
        let prices = served
            .data
            .iter()
            .filter_map(|row| row.price_usd.map(|p| (row.symbol.clone(), p)))
            .collect();

        Ok(PriceQuote {
            prices,
            is_stale: served.is_stale,
            data_source: served.data_source,
        })
    }
}

/// Upstream failure with nothing stored to fall back on
fn unavailable(source: &str, err: EdgeError) -> EdgeError {
    EdgeError::UpstreamUnavailable {
        source_name: source.to_string(),
        detail: err.to_string(),
    }
}

fn venue_rows(venue: &str, rows: Result<Vec<FundingRow>>) -> HashMap<String, VenueRate> {
    match rows {
        Ok(rows) => rows
            .into_iter()
            .map(|row| {
                (
                    row.symbol,
                    VenueRate {
                        funding_rate: row.funding_rate,
                        next_funding_time: row.next_funding_time,
                    },
                )
            })
            .collect(),
        Err(err) => {
            warn!("{} funding unavailable: {}", venue, err);
            HashMap::new()
        }
    }
}
