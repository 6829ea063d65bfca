//! Degradation policy
//!
//! Decides how a cached reading may stand in for a live one:
//! - age <= ttl: reused without an upstream call, still live
//! - age <= max staleness: fallback after a failed fetch, labelled cached
//! - older, or nothing stored: unavailable

use crate::config::CacheConfig;
use crate::storage::Cached;
use crate::types::{Freshness, Metric, SourceReading};
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    ttl: Duration,
    max_staleness: Duration,
}

impl FreshnessPolicy {
    pub fn new(ttl_secs: i64, max_staleness_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            max_staleness: Duration::seconds(max_staleness_secs.max(ttl_secs)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl_secs, config.max_staleness_secs)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    /// A stored reading young enough to skip the upstream call
    pub fn reuse(&self, cached: &Cached<SourceReading>) -> Option<SourceReading> {
        if cached.within(self.ttl) && cached.value.usable_value().is_some() {
            Some(SourceReading {
                freshness: Freshness::Live,
                ..cached.value.clone()
            })
        } else {
            None
        }
    }

    /// What a failed fetch degrades to. The stored value is passed through
    /// unchanged; only its freshness label differs.
    pub fn fallback(
        &self,
        cached: Option<&Cached<SourceReading>>,
        provider: &str,
        metric: Metric,
    ) -> SourceReading {
        match cached {
            Some(entry)
                if entry.within(self.max_staleness) && entry.value.usable_value().is_some() =>
            {
                entry.value.clone().into_cached()
            }
            _ => SourceReading::unavailable(provider, metric),
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
