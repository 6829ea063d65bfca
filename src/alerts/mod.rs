//! Price alerts
//!
//! In-memory store of price thresholds. A check compares every active alert
//! with the current spot price, fires the ones whose condition holds and
//! sends one Telegram message per fired alert. A fired alert is deactivated.

#[cfg(test)]
mod tests;

use crate::error::{EdgeError, Result};
use crate::market::PriceSource;
use crate::notify::{Delivery, Notifier};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

pub const MAX_SYMBOL_LEN: usize = 12;
pub const MAX_NOTE_LEN: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    #[default]
    Above,
    Below,
}

impl AlertDirection {
    pub fn is_triggered(&self, price: f64, target: f64) -> bool {
        match self {
            AlertDirection::Above => price >= target,
            AlertDirection::Below => price <= target,
        }
    }
}

/// Request body for a new alert
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlert {
    pub symbol: String,
    pub target_price_usd: f64,
    #[serde(default)]
    pub direction: AlertDirection,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub symbol: String,
    pub target_price_usd: f64,
    pub direction: AlertDirection,
    pub note: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: u32,
}

/// Summary of notification delivery for one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// No active alerts
    Skipped,
    NotTriggered,
    TelegramNotConfigured,
    Sent,
    SendFailed,
}

impl DeliveryStatus {
    /// Fold one delivery into the running status. Any successful send wins.
    fn record(self, delivery: Delivery) -> Self {
        match (self, delivery) {
            (_, Delivery::Sent) | (DeliveryStatus::Sent, _) => DeliveryStatus::Sent,
            (_, Delivery::NotConfigured) => DeliveryStatus::TelegramNotConfigured,
            (_, Delivery::Failed) => DeliveryStatus::SendFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub checked_count: usize,
    pub triggered_count: usize,
    pub triggered_alert_ids: Vec<String>,
    pub checked_at: DateTime<Utc>,
    pub delivery: DeliveryStatus,
}

pub struct AlertStore {
    alerts: RwLock<HashMap<String, Alert>>,
    coins: BTreeMap<String, String>,
    prices: Arc<dyn PriceSource>,
    notifier: Notifier,
}

impl AlertStore {
    pub fn new(
        coins: BTreeMap<String, String>,
        prices: Arc<dyn PriceSource>,
        notifier: Notifier,
    ) -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            coins,
            prices,
            notifier,
        }
    }

    /// All alerts, newest first
    pub fn list(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts.read().values().cloned().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    pub fn create(&self, request: CreateAlert) -> Result<Alert> {
        let symbol = request.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(EdgeError::InvalidRequest("symbol must not be empty".to_string()));
        }
        if symbol.chars().count() > MAX_SYMBOL_LEN {
            return Err(EdgeError::InvalidRequest(format!(
                "symbol must be at most {} characters",
                MAX_SYMBOL_LEN
            )));
        }
        if !self.coins.contains_key(&symbol) {
            return Err(EdgeError::UnsupportedSymbol {
                symbol,
                supported: self.coins.keys().cloned().collect::<Vec<_>>().join(", "),
            });
        }
        if !(request.target_price_usd.is_finite() && request.target_price_usd > 0.0) {
            return Err(EdgeError::InvalidRequest(
                "target_price_usd must be greater than 0".to_string(),
            ));
        }
        if let Some(note) = &request.note {
            if note.chars().count() > MAX_NOTE_LEN {
                return Err(EdgeError::InvalidRequest(format!(
                    "note must be at most {} characters",
                    MAX_NOTE_LEN
                )));
            }
        }

        let alert = Alert {
            id: new_alert_id(),
            symbol,
            target_price_usd: (request.target_price_usd * 10_000.0).round() / 10_000.0,
            direction: request.direction,
            note: request.note,
            is_active: true,
            created_at: Utc::now(),
            last_checked_at: None,
            last_triggered_at: None,
            trigger_count: 0,
        };

        self.alerts.write().insert(alert.id.clone(), alert.clone());
        info!(
            "Alert {} created: {} {:?} {}",
            alert.id, alert.symbol, alert.direction, alert.target_price_usd
        );
        Ok(alert)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        match self.alerts.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(EdgeError::NotFound(format!("alert {}", id))),
        }
    }

    /// Evaluate every active alert against current prices
    pub async fn check(&self) -> Result<CheckReport> {
        let active: Vec<Alert> = self
            .alerts
            .read()
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();

        if active.is_empty() {
            return Ok(CheckReport {
                checked_count: 0,
                triggered_count: 0,
                triggered_alert_ids: Vec::new(),
                checked_at: Utc::now(),
                delivery: DeliveryStatus::Skipped,
            });
        }

        let mut symbols: Vec<String> = active.iter().map(|a| a.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        let quote = self.prices.usd_prices(&symbols).await?;

        let checked_at = Utc::now();
        let mut fired: Vec<(Alert, f64)> = Vec::new();
        {
            let mut alerts = self.alerts.write();
            for candidate in &active {
                // Deleted while prices were in flight
                let Some(alert) = alerts.get_mut(&candidate.id) else {
                    continue;
                };
                if !alert.is_active {
                    continue;
                }
                alert.last_checked_at = Some(checked_at);

                let Some(price) = quote.prices.get(&alert.symbol).copied() else {
                    continue;
                };
                if !alert.direction.is_triggered(price, alert.target_price_usd) {
                    continue;
                }

                alert.is_active = false;
                alert.last_triggered_at = Some(checked_at);
                alert.trigger_count += 1;
                fired.push((alert.clone(), price));
            }
        }
        fired.sort_by(|(a, _), (b, _)| a.created_at.cmp(&b.created_at));

        let mut delivery = DeliveryStatus::NotTriggered;
        for (alert, price) in &fired {
            info!(
                "Alert {} triggered: {} at {} ({:?} {})",
                alert.id, alert.symbol, price, alert.direction, alert.target_price_usd
            );
            delivery = delivery.record(self.notifier.price_alert(alert, *price).await);
        }

        Ok(CheckReport {
            checked_count: active.len(),
            triggered_count: fired.len(),
            triggered_alert_ids: fired.into_iter().map(|(a, _)| a.id).collect(),
            checked_at,
            delivery,
        })
    }

    /// Run `check` on a fixed interval until the task is aborted
    pub fn spawn_checker(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.check().await {
                    Ok(report) if report.triggered_count > 0 => {
                        info!(
                            "Alert check: {} of {} triggered ({:?})",
                            report.triggered_count, report.checked_count, report.delivery
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("Alert check failed: {}", e),
                }
            }
        })
    }
}

/// `alt_` followed by 10 hex characters
fn new_alert_id() -> String {
    let uuid = Uuid::new_v4();
    format!("alt_{}", hex::encode(&uuid.as_bytes()[..5]))
}
