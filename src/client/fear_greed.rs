//! Alternative.me Fear & Greed index client

use super::get_json;
use crate::error::{EdgeError, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "alternative.me";

/// The API serves at most this many days per request
pub const MAX_HISTORY_DAYS: u32 = 100;

#[derive(Clone)]
pub struct FearGreedClient {
    http: Client,
    base_url: String,
}

/// One daily index value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreedPoint {
    /// 0 = extreme fear, 100 = extreme greed
    pub value: u32,
    pub value_classification: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FngEnvelope {
    #[serde(default)]
    data: Vec<FngEntry>,
}

// Numbers arrive as strings
#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
    value_classification: String,
    timestamp: String,
}

impl FngEntry {
    fn parse(self) -> Result<FearGreedPoint> {
        let value: u32 = self
            .value
            .trim()
            .parse()
            .map_err(|_| EdgeError::Malformed(format!("fear & greed value {:?}", self.value)))?;
        let secs: i64 = self.timestamp.trim().parse().map_err(|_| {
            EdgeError::Malformed(format!("fear & greed timestamp {:?}", self.timestamp))
        })?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| EdgeError::Malformed(format!("timestamp out of range: {}", secs)))?;

        Ok(FearGreedPoint {
            value,
            value_classification: self.value_classification,
            timestamp,
        })
    }
}

impl FearGreedClient {
    pub fn with_http(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    /// Most recent index value
    pub async fn current(&self) -> Result<FearGreedPoint> {
        self.history(1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EdgeError::Malformed("fear & greed returned no data".to_string()))
    }

    /// Newest-first daily values, capped at 100 days
    pub async fn history(&self, days: u32) -> Result<Vec<FearGreedPoint>> {
        let limit = days.clamp(1, MAX_HISTORY_DAYS);
        let resp: FngEnvelope = get_json(
            &self.http,
            PROVIDER,
            &self.base_url,
            &[("limit", limit.to_string())],
        )
        .await?;

        resp.data.into_iter().map(FngEntry::parse).collect()
    }
}
