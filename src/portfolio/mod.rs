//! Portfolio valuation
//!
//! Holdings come from configuration; prices come from the live market feed.
//! All money math is done in `Decimal` and rounded to cents on output.

#[cfg(test)]
mod tests;

use crate::config::PositionConfig;
use crate::error::{EdgeError, Result};
use crate::market::PriceSource;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Suffix appended to the price feed's source label
const POSITIONS_SOURCE: &str = "portfolio_config";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub coin: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_cost_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_basis_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub market_value_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_pct: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub allocation_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_positions: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_cost_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pnl_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pnl_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    pub positions: Vec<PositionView>,
    pub summary: PortfolioSummary,
    pub is_stale: bool,
    pub data_source: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    pub position: PositionView,
    pub is_stale: bool,
    pub data_source: String,
    pub updated_at: DateTime<Utc>,
}

pub struct Portfolio {
    positions: Vec<PositionConfig>,
    coins: BTreeMap<String, String>,
    prices: Arc<dyn PriceSource>,
}

impl Portfolio {
    pub fn new(
        positions: Vec<PositionConfig>,
        coins: BTreeMap<String, String>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            positions,
            coins,
            prices,
        }
    }

    /// Check configured holdings, normalising symbols to upper case
    fn holdings(&self) -> Result<Vec<PositionConfig>> {
        if self.positions.is_empty() {
            return Err(EdgeError::Config(
                "no portfolio positions configured (set portfolio.positions or PORTFOLIO_POSITIONS_JSON)"
                    .to_string(),
            ));
        }

        self.positions
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                let symbol = p.symbol.trim().to_uppercase();
                if !self.coins.contains_key(&symbol) {
                    return Err(EdgeError::Config(format!(
                        "position {}: unsupported coin {:?}, supported: {}",
                        idx + 1,
                        symbol,
                        self.coins.keys().cloned().collect::<Vec<_>>().join(", ")
                    )));
                }
                if p.quantity <= Decimal::ZERO || p.avg_cost_usd <= Decimal::ZERO {
                    return Err(EdgeError::Config(format!(
                        "position {}: quantity and avg_cost_usd must be greater than 0",
                        idx + 1
                    )));
                }
                Ok(PositionConfig {
                    symbol,
                    quantity: p.quantity,
                    avg_cost_usd: p.avg_cost_usd,
                })
            })
            .collect()
    }

    /// Value every holding at the current spot price
    pub async fn report(&self) -> Result<PortfolioReport> {
        let holdings = self.holdings()?;
        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let quote = self.prices.usd_prices(&symbols).await?;

        let mut valued = Vec::with_capacity(holdings.len());
        for holding in &holdings {
            let price = quote
                .prices
                .get(&holding.symbol)
                .and_then(|p| Decimal::try_from(*p).ok())
                .ok_or_else(|| EdgeError::UpstreamUnavailable {
                    source_name: quote.data_source.clone(),
                    detail: format!("no current price for {}", holding.symbol),
                })?;
            valued.push((holding, price));
        }

        let total_cost: Decimal = valued
            .iter()
            .map(|(h, _)| h.quantity * h.avg_cost_usd)
            .sum();
        let total_value: Decimal = valued.iter().map(|(h, price)| h.quantity * *price).sum();

        let mut positions: Vec<PositionView> = valued
            .into_iter()
            .map(|(h, price)| value_position(h, price, total_value))
            .collect();
        positions.sort_by(|a, b| {
            b.market_value_usd
                .cmp(&a.market_value_usd)
                .then_with(|| a.coin.cmp(&b.coin))
        });

        let total_pnl = total_value - total_cost;
        debug!(
            "Portfolio valued: {} positions, value {} cost {}",
            positions.len(),
            total_value,
            total_cost
        );

        Ok(PortfolioReport {
            summary: PortfolioSummary {
                total_positions: positions.len(),
                total_cost_usd: cents(total_cost),
                total_value_usd: cents(total_value),
                total_pnl_usd: cents(total_pnl),
                total_pnl_pct: cents(percent(total_pnl, total_cost)),
            },
            positions,
            is_stale: quote.is_stale,
            data_source: format!("{}+{}", quote.data_source, POSITIONS_SOURCE),
            updated_at: Utc::now(),
        })
    }

    /// One holding, valued within the whole portfolio
    pub async fn position(&self, coin: &str) -> Result<PositionReport> {
        let target = coin.trim().to_uppercase();
        let report = self.report().await?;
        let position = report
            .positions
            .into_iter()
            .find(|p| p.coin == target)
            .ok_or_else(|| EdgeError::NotFound(format!("portfolio position {}", target)))?;

        Ok(PositionReport {
            position,
            is_stale: report.is_stale,
            data_source: report.data_source,
            updated_at: report.updated_at,
        })
    }
}

fn value_position(holding: &PositionConfig, price: Decimal, total_value: Decimal) -> PositionView {
    let cost_basis = holding.quantity * holding.avg_cost_usd;
    let market_value = holding.quantity * price;
    let pnl = market_value - cost_basis;

    PositionView {
        coin: holding.symbol.clone(),
        quantity: holding.quantity,
        avg_cost_usd: holding.avg_cost_usd.round_dp(6),
        current_price_usd: price.round_dp(6),
        cost_basis_usd: cents(cost_basis),
        market_value_usd: cents(market_value),
        pnl_usd: cents(pnl),
        pnl_pct: cents(percent(pnl, cost_basis)),
        allocation_pct: cents(percent(market_value, total_value)),
    }
}

/// `part / whole * 100`, zero when `whole` is zero
fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole * dec!(100)
    }
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
