//! BusyEdge market dashboard backend
//!
//! Aggregates crypto market signals from public data providers into a
//! BUY/SELL/HOLD recommendation, degrading to cached data when an upstream
//! fails and refusing to answer when nothing usable is left.

pub mod alerts;
pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod fusion;
pub mod ingester;
pub mod market;
pub mod notify;
pub mod portfolio;
pub mod signals;
pub mod storage;
pub mod types;
