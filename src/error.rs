//! Error types for the dashboard backend

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Upstream {source_name} unavailable: {detail}")]
    UpstreamUnavailable { source_name: String, detail: String },

    #[error("No usable data for {symbol}")]
    SymbolUnavailable { symbol: String },

    #[error("Unsupported symbol {symbol}, supported: {supported}")]
    UnsupportedSymbol { symbol: String, supported: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EdgeError>;
