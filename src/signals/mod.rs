//! Signal engine
//!
//! Request-scoped fan-out over every fetcher, cache fallback through the
//! freshness policy, then composition per symbol. Market-wide fetchers run
//! once per request however many symbols are asked for.

pub mod policy;


pub use policy::FreshnessPolicy;

use crate::client::MarketClients;
use crate::config::Config;
use crate::error::{EdgeError, Result};
use crate::fusion::ScoreComposer;
use crate::ingester::{default_fetchers, fetch_with_timeout, SourceFetcher, MARKET_WIDE};
use crate::storage::{CacheKey, ReadingCache};
use crate::types::{
    Analysis, FetchFailure, Freshness, Provenance, ReadingReport, SignalResult, SourceReading,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-symbol result of a multi-symbol request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignalOutcome {
    Available(SignalResult),
    Unavailable {
        symbol: String,
        reason: String,
        data_source: Provenance,
    },
}

impl SignalOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SignalOutcome::Available(result) => &result.symbol,
            SignalOutcome::Unavailable { symbol, .. } => symbol,
        }
    }

    pub fn result(&self) -> Option<&SignalResult> {
        match self {
            SignalOutcome::Available(result) => Some(result),
            SignalOutcome::Unavailable { .. } => None,
        }
    }
}

/// A reading resolved for one fetcher on this request
#[derive(Debug, Clone)]
struct Resolved {
    reading: SourceReading,
    age_secs: Option<i64>,
    failure: Option<FetchFailure>,
}

pub struct SignalEngine {
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    cache: ReadingCache,
    composer: ScoreComposer,
    policy: FreshnessPolicy,
    coins: BTreeMap<String, String>,
    default_symbols: Vec<String>,
    fetch_timeout: Duration,
}

impl SignalEngine {
    pub fn new(config: &Config, fetchers: Vec<Arc<dyn SourceFetcher>>, cache: ReadingCache) -> Self {
        Self {
            fetchers,
            cache,
            composer: ScoreComposer::new(config.signal.clone()),
            policy: FreshnessPolicy::from_config(&config.cache),
            coins: config.coins.clone(),
            default_symbols: config.signal.default_symbols.clone(),
            fetch_timeout: Duration::from_millis(config.providers.timeout_ms),
        }
    }

    /// Engine wired to the production providers
    pub fn from_clients(config: &Config, clients: &MarketClients) -> Self {
        let cache = ReadingCache::new(config.cache.ttl_secs);
        Self::new(config, default_fetchers(config, clients), cache)
    }

    pub fn cache(&self) -> &ReadingCache {
        &self.cache
    }

    pub fn composer(&self) -> &ScoreComposer {
        &self.composer
    }

    /// Uppercase a symbol and check it is configured
    pub fn validate_symbol(&self, symbol: &str) -> Result<String> {
        let normalized = symbol.trim().to_uppercase();
        if self.coins.contains_key(&normalized) {
            Ok(normalized)
        } else {
            Err(EdgeError::UnsupportedSymbol {
                symbol: normalized,
                supported: self.coins.keys().cloned().collect::<Vec<_>>().join(", "),
            })
        }
    }

    /// Signal for one symbol. Total unavailability is an error.
    pub async fn signal(&self, symbol: &str) -> Result<SignalResult> {
        let symbol = self.validate_symbol(symbol)?;
        let mut gathered = self.gather(std::slice::from_ref(&symbol)).await;
        let resolved = gathered.remove(&symbol).unwrap_or_default();
        self.compose(&symbol, &resolved)
            .ok_or(EdgeError::SymbolUnavailable { symbol })
    }

    /// Signals for several symbols sharing one fan-out.
    ///
    /// An empty list means the configured defaults. Unsupported symbols fail
    /// the whole request before anything is fetched.
    pub async fn signals(&self, symbols: &[String]) -> Result<Vec<SignalOutcome>> {
        let requested = if symbols.is_empty() {
            self.default_symbols.as_slice()
        } else {
            symbols
        };

        let mut validated: Vec<String> = Vec::with_capacity(requested.len());
        for symbol in requested {
            let symbol = self.validate_symbol(symbol)?;
            if !validated.contains(&symbol) {
                validated.push(symbol);
            }
        }

        let gathered = self.gather(&validated).await;
        Ok(validated
            .into_iter()
            .map(|symbol| {
                let resolved = gathered.get(&symbol).cloned().unwrap_or_default();
                match self.compose(&symbol, &resolved) {
                    Some(result) => SignalOutcome::Available(result),
                    None => SignalOutcome::Unavailable {
                        reason: EdgeError::SymbolUnavailable {
                            symbol: symbol.clone(),
                        }
                        .to_string(),
                        data_source: Provenance::from_readings(
                            resolved.iter().map(|r| &r.reading),
                        ),
                        symbol,
                    },
                }
            })
            .collect())
    }

    /// Signal together with every reading and failure behind it
    pub async fn analysis(&self, symbol: &str) -> Result<Analysis> {
        let symbol = self.validate_symbol(symbol)?;
        let mut gathered = self.gather(std::slice::from_ref(&symbol)).await;
        let resolved = gathered.remove(&symbol).unwrap_or_default();

        let signal = self
            .compose(&symbol, &resolved)
            .ok_or_else(|| EdgeError::SymbolUnavailable {
                symbol: symbol.clone(),
            })?;

        let readings = resolved
            .into_iter()
            .map(|r| {
                let used = signal.contributing_readings.iter().find(|c| {
                    c.reading.provider == r.reading.provider && c.reading.metric == r.reading.metric
                });
                ReadingReport {
                    normalized: used.map(|c| c.normalized),
                    weight: used.map(|c| c.weight),
                    age_secs: r.age_secs,
                    failure: r.failure,
                    reading: r.reading,
                }
            })
            .collect();

        Ok(Analysis {
            symbol,
            signal,
            readings,
        })
    }

    fn compose(&self, symbol: &str, resolved: &[Resolved]) -> Option<SignalResult> {
        let readings: Vec<SourceReading> = resolved.iter().map(|r| r.reading.clone()).collect();
        self.composer.compose(symbol, &readings)
    }

    /// Fan out every fetch for the given symbols and wait for all to settle.
    ///
    /// Market-wide readings are copied into each symbol's set.
    async fn gather(&self, symbols: &[String]) -> HashMap<String, Vec<Resolved>> {
        let shared = join_all(
            self.fetchers
                .iter()
                .filter(|f| f.market_wide())
                .map(|f| self.resolve(f.as_ref(), MARKET_WIDE)),
        );
        let specific = join_all(symbols.iter().flat_map(|symbol| {
            self.fetchers
                .iter()
                .filter(|f| !f.market_wide())
                .map(move |f| async move {
                    (symbol.clone(), self.resolve(f.as_ref(), symbol).await)
                })
        }));
        let (shared, specific) = tokio::join!(shared, specific);

        let mut by_symbol: HashMap<String, Vec<Resolved>> = symbols
            .iter()
            .map(|s| (s.clone(), shared.clone()))
            .collect();
        for (symbol, resolved) in specific {
            by_symbol.entry(symbol).or_default().push(resolved);
        }
        by_symbol
    }

    /// Fresh cache, else live fetch, else policy fallback.
    ///
    /// The cache write happens as soon as the fetch returns, so it survives
    /// cancellation of the surrounding request.
    async fn resolve(&self, fetcher: &dyn SourceFetcher, symbol: &str) -> Resolved {
        let key = CacheKey::new(fetcher.provider(), fetcher.metric(), symbol);
        let stored = self.cache.get(&key);

        if let Some(reading) = stored.as_ref().and_then(|c| self.policy.reuse(c)) {
            debug!("Cache hit for {}", key);
            return Resolved {
                reading,
                age_secs: stored.map(|c| c.age_secs()),
                failure: None,
            };
        }

        match fetch_with_timeout(fetcher, symbol, self.fetch_timeout).await {
            Ok(reading) => {
                if reading.usable_value().is_some() {
                    self.cache.put(key, reading.clone());
                }
                Resolved {
                    reading,
                    age_secs: None,
                    failure: None,
                }
            }
            Err(failure) => {
                warn!(
                    "{} {} fetch failed for {}: {} ({})",
                    failure.provider, failure.metric, symbol, failure.reason, failure.detail
                );
                let reading = self
                    .policy
                    .fallback(stored.as_ref(), fetcher.provider(), fetcher.metric());
                let age_secs = match reading.freshness {
                    Freshness::Cached => {
                        debug!("Falling back to cached {}", key);
                        stored.map(|c| c.age_secs())
                    }
                    _ => None,
                };
                Resolved {
                    reading,
                    age_secs,
                    failure: Some(failure),
                }
            }
        }
    }
}
