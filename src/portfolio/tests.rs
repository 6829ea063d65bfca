use super::*;
use crate::config::Config;
use crate::market::{MockPriceSource, PriceQuote};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

fn position(symbol: &str, quantity: Decimal, avg_cost: Decimal) -> PositionConfig {
    PositionConfig {
        symbol: symbol.to_string(),
        quantity,
        avg_cost_usd: avg_cost,
    }
}

fn quote(prices: &[(&str, f64)], is_stale: bool) -> PriceQuote {
    PriceQuote {
        prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
        is_stale,
        data_source: if is_stale { "coingecko_cache" } else { "coingecko" }.to_string(),
    }
}

fn portfolio(positions: Vec<PositionConfig>, prices: MockPriceSource) -> Portfolio {
    Portfolio::new(positions, Config::default().coins, Arc::new(prices))
}

fn two_coin_prices(is_stale: bool) -> MockPriceSource {
    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .returning(move |_| Ok(quote(&[("BTC", 64000.0), ("ETH", 3000.0)], is_stale)));
    prices
}

fn two_coins() -> Vec<PositionConfig> {
    vec![
        position("eth", dec!(4), dec!(3500)),
        position("BTC", dec!(0.5), dec!(60000)),
    ]
}

#[tokio::test]
async fn test_report_values_positions() {
    let report = assert_ok!(portfolio(two_coins(), two_coin_prices(false)).report().await);

    assert_eq!(report.positions.len(), 2);
    let btc = &report.positions[0];
    assert_eq!(btc.coin, "BTC");
    assert_eq!(btc.cost_basis_usd, dec!(30000));
    assert_eq!(btc.market_value_usd, dec!(32000));
    assert_eq!(btc.pnl_usd, dec!(2000));
    assert_eq!(btc.pnl_pct, dec!(6.67));
    assert_eq!(btc.allocation_pct, dec!(72.73));

    let eth = &report.positions[1];
    assert_eq!(eth.coin, "ETH");
    assert_eq!(eth.pnl_usd, dec!(-2000));
    assert_eq!(eth.pnl_pct, dec!(-14.29));
    assert_eq!(eth.allocation_pct, dec!(27.27));

    assert_eq!(report.summary.total_positions, 2);
    assert_eq!(report.summary.total_cost_usd, dec!(44000));
    assert_eq!(report.summary.total_value_usd, dec!(44000));
    assert_eq!(report.summary.total_pnl_usd, Decimal::ZERO);
    assert_eq!(report.summary.total_pnl_pct, Decimal::ZERO);
    assert!(!report.is_stale);
    assert_eq!(report.data_source, "coingecko+portfolio_config");
}

#[tokio::test]
async fn test_report_propagates_staleness() {
    let report = portfolio(two_coins(), two_coin_prices(true))
        .report()
        .await
        .unwrap();
    assert!(report.is_stale);
    assert_eq!(report.data_source, "coingecko_cache+portfolio_config");
}

#[tokio::test]
async fn test_report_serializes_numbers() {
    let report = portfolio(two_coins(), two_coin_prices(false))
        .report()
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["positions"][0]["market_value_usd"], 32000.0);
    assert_eq!(json["positions"][0]["pnl_pct"], 6.67);
    assert_eq!(json["summary"]["total_positions"], 2);
}

#[tokio::test]
async fn test_missing_positions_is_config_error() {
    let mut prices = MockPriceSource::new();
    prices.expect_usd_prices().never();

    let err = assert_err!(portfolio(vec![], prices).report().await);
    assert!(matches!(err, EdgeError::Config(_)));
}

#[tokio::test]
async fn test_invalid_positions_are_rejected() {
    let mut prices = MockPriceSource::new();
    prices.expect_usd_prices().never();
    let bad = portfolio(vec![position("BTC", dec!(0), dec!(100))], prices);
    assert!(matches!(bad.report().await, Err(EdgeError::Config(_))));

    let mut prices = MockPriceSource::new();
    prices.expect_usd_prices().never();
    let unknown = portfolio(vec![position("PEPE", dec!(1), dec!(1))], prices);
    match unknown.report().await {
        Err(EdgeError::Config(msg)) => assert!(msg.contains("PEPE")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_price_is_upstream_error() {
    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .returning(|_| Ok(quote(&[("BTC", 64000.0)], false)));

    let err = portfolio(two_coins(), prices).report().await.unwrap_err();
    match err {
        EdgeError::UpstreamUnavailable { detail, .. } => assert!(detail.contains("ETH")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_single_position_lookup() {
    let book = portfolio(two_coins(), two_coin_prices(false));

    let eth = book.position("eth").await.unwrap();
    assert_eq!(eth.position.coin, "ETH");
    assert_eq!(eth.position.market_value_usd, dec!(12000));

    assert!(matches!(
        book.position("SOL").await,
        Err(EdgeError::NotFound(_))
    ));
}

#[test]
fn test_percent_of_zero_whole() {
    assert_eq!(percent(dec!(5), Decimal::ZERO), Decimal::ZERO);
    assert_eq!(cents(dec!(1.005)), dec!(1.01));
    assert_eq!(cents(dec!(-1.005)), dec!(-1.01));
}
