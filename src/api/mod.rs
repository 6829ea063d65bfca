//! HTTP API
//!
//! Successful responses wrap their payload as `{"data": ...}`; market
//! endpoints that can fall back to cache also carry `is_stale` and
//! `data_source` beside it. Errors are `{"detail": "..."}`.


use crate::alerts::{AlertStore, CreateAlert};
use crate::error::EdgeError;
use crate::market::MarketService;
use crate::portfolio::Portfolio;
use crate::signals::SignalEngine;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

const DEFAULT_HISTORY_DAYS: u32 = 30;

/// Shared state behind every handler
pub struct AppState {
    pub engine: Arc<SignalEngine>,
    pub market: Arc<MarketService>,
    pub alerts: Arc<AlertStore>,
    pub portfolio: Arc<Portfolio>,
    pub started_at: DateTime<Utc>,
    pub telegram_enabled: bool,
}

#[derive(Debug, Serialize)]
struct Data<T> {
    data: T,
}

fn data<T: Serialize>(payload: T) -> Json<Data<T>> {
    Json(Data { data: payload })
}

type ApiResult<T> = std::result::Result<T, EdgeError>;

pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/api/ai/signals", get(list_signals))
        .route("/api/ai/signals/:coin", get(coin_signal))
        .route("/api/ai/analysis/:coin", get(coin_analysis))
        .route("/api/market/prices", get(market_prices))
        .route("/api/market/overview", get(market_overview))
        .route("/api/market/funding", get(market_funding))
        .route("/api/market/dashboard", get(market_dashboard))
        .route("/api/market/fear-greed", get(fear_greed))
        .route("/api/market/fear-greed/history", get(fear_greed_history))
        .route("/api/alerts", get(list_alerts).post(create_alert))
        .route("/api/alerts/check", post(check_alerts))
        .route("/api/alerts/:id", delete(delete_alert))
        .route("/api/portfolio", get(portfolio))
        .route("/api/portfolio/:coin", get(portfolio_position))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            EdgeError::UnsupportedSymbol { .. } | EdgeError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            EdgeError::NotFound(_) => StatusCode::NOT_FOUND,
            EdgeError::UpstreamUnavailable { .. }
            | EdgeError::RateLimited { .. }
            | EdgeError::Network(_) => StatusCode::BAD_GATEWAY,
            EdgeError::SymbolUnavailable { .. } | EdgeError::Config(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Split a comma separated query value, dropping blanks
fn csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct SymbolsQuery {
    symbols: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CoinIdsQuery {
    coin_ids: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    coin_ids: Option<String>,
    symbols: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = Utc::now() - state.started_at;
    let active_alerts = state.alerts.list().iter().filter(|a| a.is_active).count();
    data(json!({
        "service": "busyedge",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at,
        "uptime_secs": uptime.num_seconds(),
        "model_version": state.engine.composer().config().model_version,
        "reading_cache": state.engine.cache().stats(),
        "active_alerts": active_alerts,
        "telegram_enabled": state.telegram_enabled,
    }))
}

async fn list_signals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SymbolsQuery>,
) -> ApiResult<impl IntoResponse> {
    let symbols = csv(query.symbols.as_deref());
    Ok(data(state.engine.signals(&symbols).await?))
}

async fn coin_signal(
    State(state): State<Arc<AppState>>,
    Path(coin): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.engine.signal(&coin).await?))
}

async fn coin_analysis(
    State(state): State<Arc<AppState>>,
    Path(coin): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.engine.analysis(&coin).await?))
}

async fn market_prices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CoinIdsQuery>,
) -> ApiResult<impl IntoResponse> {
    let coin_ids = csv(query.coin_ids.as_deref());
    Ok(Json(state.market.prices(&coin_ids).await?))
}

async fn market_overview(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.market.overview().await?))
}

async fn market_funding(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SymbolsQuery>,
) -> impl IntoResponse {
    let pairs = csv(query.symbols.as_deref());
    data(state.market.funding(&pairs).await)
}

async fn market_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<impl IntoResponse> {
    let coin_ids = csv(query.coin_ids.as_deref());
    let pairs = csv(query.symbols.as_deref());
    Ok(data(state.market.dashboard(&coin_ids, &pairs).await?))
}

async fn fear_greed(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.market.fear_greed().await?))
}

async fn fear_greed_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    Ok(Json(state.market.fear_greed_history(days).await?))
}

async fn list_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    data(state.alerts.list())
}

async fn create_alert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAlert>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.alerts.create(request)?))
}

async fn delete_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.alerts.delete(&id)?;
    Ok(data(json!({ "id": id, "deleted": true })))
}

async fn check_alerts(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(data(state.alerts.check().await?))
}

async fn portfolio(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(data(state.portfolio.report().await?))
}

async fn portfolio_position(
    State(state): State<Arc<AppState>>,
    Path(coin): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.portfolio.position(&coin).await?))
}
