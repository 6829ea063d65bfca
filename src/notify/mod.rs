//! Telegram notification module
//!
//! Delivers triggered price alerts to a Telegram chat.


use crate::alerts::{Alert, AlertDirection};
use crate::config::TelegramConfig;
use crate::error::{EdgeError, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NotConfigured,
    Failed,
}

/// Telegram notifier
#[derive(Clone)]
pub struct Notifier {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_base: TELEGRAM_API.to_string(),
            bot_token,
            chat_id,
            enabled: true,
        }
    }

    /// Create a disabled notifier (for when Telegram is not configured)
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            api_base: TELEGRAM_API.to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
        }
    }

    pub fn from_config(config: Option<&TelegramConfig>) -> Self {
        match config {
            Some(tg) if !tg.bot_token.is_empty() && !tg.chat_id.is_empty() => {
                Self::new(tg.bot_token.clone(), tg.chat_id.clone())
            }
            _ => Self::disabled(),
        }
    }

    /// Point at a different Bot API host
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send a plain text message. Failures are logged, not returned.
    pub async fn send(&self, text: &str) -> Delivery {
        if !self.enabled {
            return Delivery::NotConfigured;
        }

        match self.post(text).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                tracing::error!("Telegram send failed: {}", e);
                Delivery::Failed
            }
        }
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let msg = TelegramMessage {
            chat_id: &self.chat_id,
            text,
        };

        let response = self.http.post(&url).json(&msg).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EdgeError::Api(format!(
                "telegram returned HTTP {}: {}",
                status,
                truncate(&body, 200)
            )));
        }
        Ok(())
    }

    /// Notify that a price alert fired
    pub async fn price_alert(&self, alert: &Alert, current_price: f64) -> Delivery {
        self.send(&alert_message(alert, current_price)).await
    }
}

pub(crate) fn alert_message(alert: &Alert, current_price: f64) -> String {
    let condition = match alert.direction {
        AlertDirection::Above => "above",
        AlertDirection::Below => "below",
    };
    let mut text = format!(
        "🔔 BusyEdge price alert\n\
        Symbol: {}\n\
        Price: ${:.4}\n\
        Condition: {} ${:.4}",
        alert.symbol, current_price, condition, alert.target_price_usd,
    );
    if let Some(note) = alert.note.as_deref().filter(|n| !n.is_empty()) {
        text.push_str(&format!("\nNote: {}", truncate(note, 120)));
    }
    text
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
