//! Core data model shared by fetchers, the composer and the API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of observation a provider reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// 24h spot price change in percent
    PriceChangePct,
    /// Fear & Greed index, 0 (extreme fear) to 100 (extreme greed)
    FearGreedValue,
    /// Perpetual funding rate per interval, as a fraction
    FundingRate,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::PriceChangePct,
        Metric::FearGreedValue,
        Metric::FundingRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::PriceChangePct => "price_change_pct",
            Metric::FearGreedValue => "fear_greed_value",
            Metric::FundingRate => "funding_rate",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a reading came from on this request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Live,
    Cached,
    Unavailable,
}

/// One normalized observation from one upstream provider.
///
/// Readings with `Freshness::Unavailable` carry no value and never take
/// part in composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReading {
    pub provider: String,
    pub metric: Metric,
    /// Provider-native units
    pub value: Option<f64>,
    /// Timestamp of the upstream data, not of the fetch
    pub observed_at: Option<DateTime<Utc>>,
    pub freshness: Freshness,
}

impl SourceReading {
    pub fn live(
        provider: impl Into<String>,
        metric: Metric,
        value: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider: provider.into(),
            metric,
            value: Some(value),
            observed_at: Some(observed_at),
            freshness: Freshness::Live,
        }
    }

    pub fn unavailable(provider: impl Into<String>, metric: Metric) -> Self {
        Self {
            provider: provider.into(),
            metric,
            value: None,
            observed_at: None,
            freshness: Freshness::Unavailable,
        }
    }

    /// Relabel a stored reading as a cache fallback. The value is untouched.
    pub fn into_cached(self) -> Self {
        Self {
            freshness: Freshness::Cached,
            ..self
        }
    }

    /// Value eligible for composition, if any
    pub fn usable_value(&self) -> Option<f64> {
        if self.freshness == Freshness::Unavailable {
            return None;
        }
        self.value.filter(|v| v.is_finite())
    }
}

/// Recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// A reading as it was used in composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedReading {
    #[serde(flatten)]
    pub reading: SourceReading,
    /// Signed contribution scale in [-1, +1]
    pub normalized: f64,
    /// Effective weight after redistribution
    pub weight: f64,
}

/// Which providers backed a result, split by freshness
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub live: Vec<String>,
    pub cached: Vec<String>,
    pub unavailable: Vec<String>,
}

impl Provenance {
    /// Build from every reading seen for a symbol, usable or not
    pub fn from_readings<'a>(readings: impl IntoIterator<Item = &'a SourceReading>) -> Self {
        let mut prov = Provenance::default();
        for reading in readings {
            let bucket = match reading.freshness {
                Freshness::Live => &mut prov.live,
                Freshness::Cached => &mut prov.cached,
                Freshness::Unavailable => &mut prov.unavailable,
            };
            bucket.push(reading.provider.clone());
        }
        for bucket in [&mut prov.live, &mut prov.cached, &mut prov.unavailable] {
            bucket.sort();
            bucket.dedup();
        }
        prov
    }

    /// Human readable form, e.g. `live: coingecko; cached: alternative.me`
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            ("live", &self.live),
            ("cached", &self.cached),
            ("unavailable", &self.unavailable),
        ]
        .into_iter()
        .filter(|(_, providers)| !providers.is_empty())
        .map(|(label, providers)| format!("{}: {}", label, providers.join(", ")))
        .collect();
        parts.join("; ")
    }
}

/// The computed recommendation for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub symbol: String,
    pub action: Action,
    /// Always within the configured floor/ceiling (52..=95 by default)
    pub confidence: u8,
    /// Composite score in [-1, +1]
    pub score: f64,
    pub reason: String,
    pub model_version: String,
    pub contributing_readings: Vec<WeightedReading>,
    pub data_source: Provenance,
    pub is_stale: bool,
    pub generated_at: DateTime<Utc>,
}

/// Why a single fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    HttpError,
    ParseError,
    RateLimited,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::HttpError => write!(f, "http_error"),
            FailureReason::ParseError => write!(f, "parse_error"),
            FailureReason::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Failure of one source fetch. Recovered locally, never surfaced as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub provider: String,
    pub metric: Metric,
    pub reason: FailureReason,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(
        provider: impl Into<String>,
        metric: Metric,
        reason: FailureReason,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            metric,
            reason,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} failed ({}): {}",
            self.provider, self.metric, self.reason, self.detail
        )
    }
}

/// One fetcher's contribution to an analysis, including failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingReport {
    #[serde(flatten)]
    pub reading: SourceReading,
    /// Normalized value when the reading took part in composition
    pub normalized: Option<f64>,
    pub weight: Option<f64>,
    /// Age of the cached copy, when one was used
    pub age_secs: Option<i64>,
    /// Upstream failure seen on this request, if any
    pub failure: Option<FetchFailure>,
}

/// Signal plus the per-source detail it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub symbol: String,
    pub signal: SignalResult,
    pub readings: Vec<ReadingReport>,
}
