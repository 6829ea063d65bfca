//! Score Composer
//!
//! Turns the readings gathered for one symbol into a single recommendation.
//!
//! # Pipeline
//!
//! ```text
//! ┌───────────┐  ┌────────────┐  ┌───────────┐
//! │ Momentum  │  │Fear & Greed│  │  Funding  │
//! └─────┬─────┘  └─────┬──────┘  └─────┬─────┘
//!       └──────────────┼───────────────┘
//!              ┌───────▼───────┐
//!              │   Normalize   │   each metric -> [-1, +1]
//!              └───────┬───────┘
//!              ┌───────▼───────┐
//!              │ Redistribute  │   weights over present metrics sum to 1
//!              └───────┬───────┘
//!              ┌───────▼───────┐
//!              │ Score/Action  │   +/- threshold, confidence band
//!              └───────────────┘
//! ```
//!
//! Composition is a pure function of its inputs. Readings are sorted before
//! summation so the result does not depend on the order fetches settled in.

use crate::config::SignalConfig;
use crate::types::{
    Action, Freshness, Metric, Provenance, SignalResult, SourceReading, WeightedReading,
};
use chrono::Utc;
use std::collections::BTreeMap;

/// Tolerance used when comparing composed weights
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Weighted, redistributing composer for one symbol at a time
#[derive(Debug, Clone)]
pub struct ScoreComposer {
    config: SignalConfig,
}

impl ScoreComposer {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Configured weight of a metric before redistribution
    pub fn base_weight(&self, metric: Metric) -> f64 {
        match metric {
            Metric::PriceChangePct => self.config.momentum_weight,
            Metric::FearGreedValue => self.config.fear_greed_weight,
            Metric::FundingRate => self.config.funding_weight,
        }
    }

    /// Map a provider-native value onto the signed [-1, +1] scale.
    ///
    /// Greed and positive funding count as bullish.
    pub fn normalize(&self, metric: Metric, value: f64) -> f64 {
        let scaled = match metric {
            Metric::PriceChangePct => value / self.config.momentum_full_scale_pct,
            Metric::FearGreedValue => (value - 50.0) / 50.0,
            Metric::FundingRate => value / self.config.funding_full_scale,
        };
        scaled.clamp(-1.0, 1.0)
    }

    /// Effective weight per metric once missing metrics are removed.
    ///
    /// Each present metric keeps its share of the configured total, so the
    /// result always sums to 1. Returns `None` when nothing carries weight.
    pub fn effective_weights(&self, present: &[Metric]) -> Option<BTreeMap<Metric, f64>> {
        let mut metrics: Vec<Metric> = present.to_vec();
        metrics.sort();
        metrics.dedup();

        let total: f64 = metrics.iter().map(|m| self.base_weight(*m)).sum();
        if !(total > 0.0) {
            return None;
        }

        Some(
            metrics
                .into_iter()
                .map(|m| (m, self.base_weight(m) / total))
                .collect(),
        )
    }

    pub fn action_for(&self, score: f64) -> Action {
        let threshold = self.config.action_threshold;
        if score > threshold {
            Action::Buy
        } else if score < -threshold {
            Action::Sell
        } else {
            Action::Hold
        }
    }

    /// floor + round(span * min(1, |score| / saturation)), kept inside the band
    pub fn confidence_for(&self, score: f64) -> u8 {
        let floor = self.config.confidence_floor;
        let ceiling = self.config.confidence_ceiling;
        let span = f64::from(ceiling.saturating_sub(floor));

        let ratio = if score.is_finite() {
            (score.abs() / self.config.saturation).min(1.0)
        } else {
            0.0
        };
        let raw = f64::from(floor) + (span * ratio).round();
        raw.clamp(f64::from(floor), f64::from(ceiling)) as u8
    }

    /// Compose a recommendation, or `None` when no reading is usable.
    ///
    /// Unavailable readings are only recorded in the provenance. A missing
    /// metric is dropped from the weighting, never replaced by a neutral value.
    /// Readings of a metric configured with zero weight take no part at all.
    pub fn compose(&self, symbol: &str, readings: &[SourceReading]) -> Option<SignalResult> {
        let mut usable: Vec<(&SourceReading, f64)> = readings
            .iter()
            .filter(|r| self.base_weight(r.metric) > 0.0)
            .filter_map(|r| r.usable_value().map(|v| (r, v)))
            .collect();
        if usable.is_empty() {
            return None;
        }
        usable.sort_by(|(a, va), (b, vb)| {
            a.metric
                .cmp(&b.metric)
                .then_with(|| a.provider.cmp(&b.provider))
                .then_with(|| va.total_cmp(vb))
        });

        let mut per_metric: BTreeMap<Metric, usize> = BTreeMap::new();
        for (reading, _) in &usable {
            *per_metric.entry(reading.metric).or_default() += 1;
        }
        let present: Vec<Metric> = per_metric.keys().copied().collect();
        let weights = self.effective_weights(&present)?;

        // Several providers for one metric share that metric's weight evenly
        let contributing: Vec<WeightedReading> = usable
            .iter()
            .map(|(reading, value)| {
                let share = weights.get(&reading.metric).copied().unwrap_or(0.0);
                let count = per_metric.get(&reading.metric).copied().unwrap_or(1).max(1);
                WeightedReading {
                    reading: (*reading).clone(),
                    normalized: self.normalize(reading.metric, *value),
                    weight: share / count as f64,
                }
            })
            .collect();

        let score = contributing
            .iter()
            .map(|c| c.weight * c.normalized)
            .sum::<f64>()
            .clamp(-1.0, 1.0);

        let action = self.action_for(score);
        let confidence = self.confidence_for(score);
        let is_stale = contributing
            .iter()
            .any(|c| c.reading.freshness == Freshness::Cached);
        let data_source = Provenance::from_readings(readings);
        let reason = self.describe(action, score, &contributing, &data_source, is_stale);

        Some(SignalResult {
            symbol: symbol.to_uppercase(),
            action,
            confidence,
            score,
            reason,
            model_version: self.config.model_version.clone(),
            contributing_readings: contributing,
            data_source,
            is_stale,
            generated_at: Utc::now(),
        })
    }

    fn describe(
        &self,
        action: Action,
        score: f64,
        contributing: &[WeightedReading],
        provenance: &Provenance,
        is_stale: bool,
    ) -> String {
        let inputs: Vec<String> = contributing
            .iter()
            .map(|c| {
                let value = c.reading.value.unwrap_or_default();
                let shown = match c.reading.metric {
                    Metric::PriceChangePct => format!("24h change {:+.2}%", value),
                    Metric::FearGreedValue => format!("fear & greed {:.0}", value),
                    Metric::FundingRate => format!("funding {:+.4}%", value * 100.0),
                };
                format!("{} via {} (w {:.2})", shown, c.reading.provider, c.weight)
            })
            .collect();

        let mut reason = format!("{} on score {:+.3}: {}", action, score, inputs.join(", "));
        if !provenance.unavailable.is_empty() {
            reason.push_str(&format!(
                "; missing {}",
                provenance.unavailable.join(", ")
            ));
        }
        if is_stale {
            reason.push_str(&format!(
                "; cached data from {}",
                provenance.cached.join(", ")
            ));
        }
        reason
    }
}

impl Default for ScoreComposer {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(provider: &str, metric: Metric, value: f64) -> SourceReading {
        SourceReading::live(provider, metric, value, Utc::now())
    }

    fn momentum(pct: f64) -> SourceReading {
        live("coingecko", Metric::PriceChangePct, pct)
    }

    fn fear_greed(value: f64) -> SourceReading {
        live("alternative.me", Metric::FearGreedValue, value)
    }

    fn funding(provider: &str, rate: f64) -> SourceReading {
        live(provider, Metric::FundingRate, rate)
    }

    fn weight_sum(result: &SignalResult) -> f64 {
        result.contributing_readings.iter().map(|c| c.weight).sum()
    }

    #[test]
    fn test_normalization_scales() {
        let composer = ScoreComposer::default();
        assert!((composer.normalize(Metric::PriceChangePct, 8.0) - 0.8).abs() < 1e-12);
        assert_eq!(composer.normalize(Metric::PriceChangePct, -40.0), -1.0);
        assert_eq!(composer.normalize(Metric::FearGreedValue, 50.0), 0.0);
        assert!((composer.normalize(Metric::FearGreedValue, 20.0) + 0.6).abs() < 1e-12);
        assert_eq!(composer.normalize(Metric::FearGreedValue, 100.0), 1.0);
        assert!((composer.normalize(Metric::FundingRate, 0.0001) - 0.1).abs() < 1e-12);
        assert_eq!(composer.normalize(Metric::FundingRate, 0.01), 1.0);
    }

    #[test]
    fn test_all_unavailable_yields_nothing() {
        let composer = ScoreComposer::default();
        let readings = vec![
            SourceReading::unavailable("coingecko", Metric::PriceChangePct),
            SourceReading::unavailable("alternative.me", Metric::FearGreedValue),
            SourceReading::unavailable("binance-funding", Metric::FundingRate),
        ];
        assert!(composer.compose("BTC", &readings).is_none());
        assert!(composer.compose("BTC", &[]).is_none());
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let composer = ScoreComposer::default();
        let readings = vec![momentum(f64::NAN), fear_greed(f64::INFINITY)];
        assert!(composer.compose("BTC", &readings).is_none());
    }

    #[test]
    fn test_only_zero_weight_metrics_yields_nothing() {
        let mut config = SignalConfig::default();
        config.funding_weight = 0.0;
        let composer = ScoreComposer::new(config);
        assert!(composer
            .compose("BTC", &[funding("binance-funding", 0.0005)])
            .is_none());
    }

    #[test]
    fn test_zero_weight_metric_neither_contributes_nor_marks_stale() {
        let mut config = SignalConfig::default();
        config.funding_weight = 0.0;
        let composer = ScoreComposer::new(config);

        let result = composer
            .compose(
                "BTC",
                &[
                    momentum(4.0),
                    fear_greed(50.0),
                    funding("binance-funding", 0.0005).into_cached(),
                ],
            )
            .unwrap();

        assert_eq!(result.contributing_readings.len(), 2);
        assert!(result
            .contributing_readings
            .iter()
            .all(|c| c.reading.metric != Metric::FundingRate && c.weight > 0.0));
        assert!(!result.is_stale);
        assert!((weight_sum(&result) - 1.0).abs() < WEIGHT_EPSILON);
    }

    #[test]
    fn test_weights_sum_to_one_for_every_subset() {
        let composer = ScoreComposer::default();
        let subsets: Vec<Vec<SourceReading>> = vec![
            vec![momentum(3.0)],
            vec![fear_greed(30.0)],
            vec![funding("binance-funding", 0.0002)],
            vec![momentum(3.0), fear_greed(30.0)],
            vec![momentum(3.0), funding("bybit-funding", -0.0001)],
            vec![fear_greed(30.0), funding("binance-funding", 0.0002)],
            vec![momentum(3.0), fear_greed(30.0), funding("binance-funding", 0.0002)],
            vec![
                momentum(3.0),
                fear_greed(30.0),
                funding("binance-funding", 0.0002),
                funding("bybit-funding", 0.0004),
            ],
        ];

        for readings in subsets {
            let result = composer.compose("ETH", &readings).unwrap();
            assert!(
                (weight_sum(&result) - 1.0).abs() < WEIGHT_EPSILON,
                "weights for {:?} sum to {}",
                readings.iter().map(|r| r.metric).collect::<Vec<_>>(),
                weight_sum(&result)
            );
        }
    }

    #[test]
    fn test_effective_weights_proportional() {
        let composer = ScoreComposer::default();
        let weights = composer
            .effective_weights(&[Metric::FearGreedValue, Metric::FundingRate])
            .unwrap();
        assert!((weights[&Metric::FearGreedValue] - 0.30 / 0.45).abs() < 1e-12);
        assert!((weights[&Metric::FundingRate] - 0.15 / 0.45).abs() < 1e-12);
        assert!(composer.effective_weights(&[]).is_none());
    }

    #[test]
    fn test_confidence_stays_in_band() {
        let composer = ScoreComposer::default();
        let mut score = -1.5;
        while score <= 1.5 {
            let c = composer.confidence_for(score);
            assert!((52..=95).contains(&c), "score {} gave {}", score, c);
            score += 0.01;
        }
        assert_eq!(composer.confidence_for(f64::NAN), 52);
        assert_eq!(composer.confidence_for(0.0), 52);
        assert_eq!(composer.confidence_for(0.5), 95);
        assert_eq!(composer.confidence_for(-1.0), 95);
    }

    #[test]
    fn test_confidence_grows_with_magnitude() {
        let composer = ScoreComposer::default();
        let mut last = 0;
        for step in 0..=50 {
            let c = composer.confidence_for(step as f64 / 100.0);
            assert!(c >= last);
            last = c;
        }
    }

    #[test]
    fn test_action_thresholds() {
        let composer = ScoreComposer::default();
        assert_eq!(composer.action_for(0.16), Action::Buy);
        assert_eq!(composer.action_for(0.15), Action::Hold);
        assert_eq!(composer.action_for(-0.15), Action::Hold);
        assert_eq!(composer.action_for(-0.16), Action::Sell);
    }

    #[test]
    fn test_staleness_follows_contributing_readings() {
        let composer = ScoreComposer::default();

        let all_live = composer
            .compose("BTC", &[momentum(2.0), fear_greed(60.0)])
            .unwrap();
        assert!(!all_live.is_stale);

        let one_cached = composer
            .compose("BTC", &[momentum(2.0), fear_greed(60.0).into_cached()])
            .unwrap();
        assert!(one_cached.is_stale);
        assert_eq!(one_cached.data_source.cached, vec!["alternative.me"]);
        assert_eq!(one_cached.data_source.live, vec!["coingecko"]);
    }

    #[test]
    fn test_unavailable_reading_does_not_mark_stale() {
        let composer = ScoreComposer::default();
        let result = composer
            .compose(
                "BTC",
                &[
                    momentum(2.0),
                    SourceReading::unavailable("alternative.me", Metric::FearGreedValue),
                ],
            )
            .unwrap();
        assert!(!result.is_stale);
        assert_eq!(result.data_source.unavailable, vec!["alternative.me"]);
        assert_eq!(result.contributing_readings.len(), 1);
    }

    #[test]
    fn test_order_independence() {
        let composer = ScoreComposer::default();
        let readings = vec![
            momentum(4.2),
            fear_greed(27.0),
            funding("binance-funding", 0.00031),
            funding("bybit-funding", -0.00007),
            SourceReading::unavailable("coingecko", Metric::PriceChangePct),
        ];
        let baseline = composer.compose("SOL", &readings).unwrap();

        let mut permuted = readings.clone();
        for rotation in 0..readings.len() {
            permuted.rotate_left(1);
            let result = composer.compose("SOL", &permuted).unwrap();
            assert_eq!(result.action, baseline.action, "rotation {}", rotation);
            assert_eq!(result.confidence, baseline.confidence);
            assert_eq!(result.score, baseline.score);
            assert_eq!(result.reason, baseline.reason);
        }

        let mut reversed = readings;
        reversed.reverse();
        let result = composer.compose("SOL", &reversed).unwrap();
        assert_eq!(result.score, baseline.score);
    }

    #[test]
    fn test_strong_uptrend_buys_with_high_confidence() {
        let composer = ScoreComposer::default();
        // momentum +0.8, neutral sentiment, flat funding
        let result = composer
            .compose(
                "btc",
                &[momentum(8.0), fear_greed(50.0), funding("binance-funding", 0.0)],
            )
            .unwrap();

        assert!((result.score - 0.44).abs() < 1e-9);
        assert_eq!(result.action, Action::Buy);
        assert_eq!(result.confidence, 90);
        assert_eq!(result.symbol, "BTC");
        assert!(!result.is_stale);
        assert_eq!(result.model_version, "busyedge-rules-v1");
    }

    #[test]
    fn test_all_neutral_holds_at_floor() {
        let composer = ScoreComposer::default();
        let result = composer
            .compose(
                "ETH",
                &[momentum(0.0), fear_greed(50.0), funding("binance-funding", 0.0)],
            )
            .unwrap();

        assert_eq!(result.score, 0.0);
        assert_eq!(result.action, Action::Hold);
        assert_eq!(result.confidence, 52);
        // A computed HOLD still lists what it was computed from
        assert_eq!(result.contributing_readings.len(), 3);
    }

    #[test]
    fn test_missing_momentum_redistributes_to_sell() {
        let composer = ScoreComposer::default();
        // fear & greed -0.6, funding +0.1, momentum down
        let result = composer
            .compose(
                "XRP",
                &[
                    SourceReading::unavailable("coingecko", Metric::PriceChangePct),
                    fear_greed(20.0),
                    funding("binance-funding", 0.0001),
                ],
            )
            .unwrap();

        assert!((result.score + 0.366_666_666).abs() < 1e-6);
        assert_eq!(result.action, Action::Sell);
        assert_eq!(result.confidence, 84);

        let fg = result
            .contributing_readings
            .iter()
            .find(|c| c.reading.metric == Metric::FearGreedValue)
            .unwrap();
        assert!((fg.weight - 0.30 / 0.45).abs() < 1e-12);
        assert!(result
            .contributing_readings
            .iter()
            .all(|c| c.reading.metric != Metric::PriceChangePct));
    }

    #[test]
    fn test_funding_venues_share_weight() {
        let composer = ScoreComposer::default();
        let result = composer
            .compose(
                "BTC",
                &[
                    momentum(0.0),
                    fear_greed(50.0),
                    funding("binance-funding", 0.0004),
                    funding("bybit-funding", 0.0002),
                ],
            )
            .unwrap();

        let funding_weights: Vec<f64> = result
            .contributing_readings
            .iter()
            .filter(|c| c.reading.metric == Metric::FundingRate)
            .map(|c| c.weight)
            .collect();
        assert_eq!(funding_weights.len(), 2);
        assert!(funding_weights.iter().all(|w| (w - 0.075).abs() < 1e-12));
        // Average funding 0.0003 -> 0.3 normalized, weighted 0.15
        assert!((result.score - 0.045).abs() < 1e-12);
    }

    #[test]
    fn test_reason_names_inputs_and_gaps() {
        let composer = ScoreComposer::default();
        let result = composer
            .compose(
                "BTC",
                &[
                    momentum(-6.0).into_cached(),
                    SourceReading::unavailable("alternative.me", Metric::FearGreedValue),
                ],
            )
            .unwrap();

        assert!(result.reason.starts_with("SELL on score"));
        assert!(result.reason.contains("24h change -6.00% via coingecko"));
        assert!(result.reason.contains("missing alternative.me"));
        assert!(result.reason.contains("cached data from coingecko"));
    }

    #[test]
    fn test_composition_is_reproducible() {
        let composer = ScoreComposer::default();
        let readings = vec![momentum(1.3), fear_greed(61.0)];
        let a = composer.compose("ADA", &readings).unwrap();
        let b = composer.compose("ADA", &readings).unwrap();
        assert_eq!(a.score, b.score);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.contributing_readings, b.contributing_readings);
    }
}
