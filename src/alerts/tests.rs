use super::*;
use crate::config::Config;
use crate::market::{MockPriceSource, PriceQuote};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quote(prices: &[(&str, f64)]) -> PriceQuote {
    PriceQuote {
        prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
        is_stale: false,
        data_source: "coingecko".to_string(),
    }
}

fn store_with(prices: MockPriceSource, notifier: Notifier) -> AlertStore {
    AlertStore::new(Config::default().coins, Arc::new(prices), notifier)
}

fn store(prices: MockPriceSource) -> AlertStore {
    store_with(prices, Notifier::disabled())
}

fn request(symbol: &str, target: f64, direction: AlertDirection) -> CreateAlert {
    CreateAlert {
        symbol: symbol.to_string(),
        target_price_usd: target,
        direction,
        note: None,
    }
}

#[test]
fn test_create_normalizes_and_rounds() {
    let alerts = store(MockPriceSource::new());
    let alert = alerts
        .create(request("  btc ", 65000.123456, AlertDirection::Above))
        .unwrap();

    assert_eq!(alert.symbol, "BTC");
    assert_eq!(alert.target_price_usd, 65000.1235);
    assert!(alert.is_active);
    assert_eq!(alert.trigger_count, 0);
    assert!(alert.id.starts_with("alt_"));
    assert_eq!(alert.id.len(), 14);
    assert!(alert.id[4..].chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_create_rejects_bad_input() {
    let alerts = store(MockPriceSource::new());

    assert!(matches!(
        alerts.create(request("   ", 1.0, AlertDirection::Above)),
        Err(EdgeError::InvalidRequest(_))
    ));
    assert!(matches!(
        alerts.create(request("ABCDEFGHIJKLM", 1.0, AlertDirection::Above)),
        Err(EdgeError::InvalidRequest(_))
    ));
    assert!(matches!(
        alerts.create(request("SHIB", 1.0, AlertDirection::Above)),
        Err(EdgeError::UnsupportedSymbol { .. })
    ));
    assert!(matches!(
        alerts.create(request("ETH", 0.0, AlertDirection::Below)),
        Err(EdgeError::InvalidRequest(_))
    ));
    assert!(matches!(
        alerts.create(request("ETH", f64::NAN, AlertDirection::Below)),
        Err(EdgeError::InvalidRequest(_))
    ));

    let mut long_note = request("ETH", 100.0, AlertDirection::Below);
    long_note.note = Some("x".repeat(MAX_NOTE_LEN + 1));
    assert!(matches!(alerts.create(long_note), Err(EdgeError::InvalidRequest(_))));

    assert!(alerts.list().is_empty());
}

#[test]
fn test_create_request_defaults_to_above() {
    let req: CreateAlert = serde_json::from_value(json!({
        "symbol": "sol",
        "target_price_usd": 200.0
    }))
    .unwrap();
    assert_eq!(req.direction, AlertDirection::Above);
    assert!(req.note.is_none());
}

#[test]
fn test_list_newest_first_and_delete() {
    let alerts = store(MockPriceSource::new());
    let first = alerts.create(request("BTC", 1.0, AlertDirection::Above)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = alerts.create(request("ETH", 1.0, AlertDirection::Above)).unwrap();

    let listed = alerts.list();
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);

    alerts.delete(&first.id).unwrap();
    assert_eq!(alerts.list().len(), 1);
    assert!(matches!(alerts.delete(&first.id), Err(EdgeError::NotFound(_))));
}

#[tokio::test]
async fn test_check_without_alerts_is_skipped() {
    let mut prices = MockPriceSource::new();
    prices.expect_usd_prices().never();

    let report = store(prices).check().await.unwrap();
    assert_eq!(report.checked_count, 0);
    assert_eq!(report.delivery, DeliveryStatus::Skipped);
}

#[tokio::test]
async fn test_check_triggers_and_deactivates() {
    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .withf(|symbols| symbols.len() == 2 && symbols[0] == "BTC" && symbols[1] == "ETH")
        .times(1)
        .returning(|_| Ok(quote(&[("BTC", 66000.0), ("ETH", 3000.0)])));

    let alerts = store(prices);
    let above = alerts.create(request("BTC", 65000.0, AlertDirection::Above)).unwrap();
    let below = alerts.create(request("ETH", 2900.0, AlertDirection::Below)).unwrap();
    let exact = alerts.create(request("BTC", 66000.0, AlertDirection::Below)).unwrap();

    let report = alerts.check().await.unwrap();
    assert_eq!(report.checked_count, 3);
    assert_eq!(report.triggered_count, 2);
    assert!(report.triggered_alert_ids.contains(&above.id));
    assert!(report.triggered_alert_ids.contains(&exact.id));
    assert_eq!(report.delivery, DeliveryStatus::TelegramNotConfigured);

    let listed: HashMap<String, Alert> =
        alerts.list().into_iter().map(|a| (a.id.clone(), a)).collect();
    assert!(!listed[&above.id].is_active);
    assert_eq!(listed[&above.id].trigger_count, 1);
    assert_eq!(listed[&above.id].last_triggered_at, Some(report.checked_at));
    assert!(listed[&below.id].is_active);
    assert_eq!(listed[&below.id].last_checked_at, Some(report.checked_at));
}

#[tokio::test]
async fn test_check_not_triggered_and_missing_price() {
    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .returning(|_| Ok(quote(&[("BTC", 60000.0)])));

    let alerts = store(prices);
    alerts.create(request("BTC", 65000.0, AlertDirection::Above)).unwrap();
    alerts.create(request("SOL", 1.0, AlertDirection::Below)).unwrap();

    let report = alerts.check().await.unwrap();
    assert_eq!(report.checked_count, 2);
    assert_eq!(report.triggered_count, 0);
    assert_eq!(report.delivery, DeliveryStatus::NotTriggered);
}

#[tokio::test]
async fn test_fired_alert_is_not_checked_again() {
    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .times(1)
        .returning(|_| Ok(quote(&[("ADA", 0.2)])));

    let alerts = store(prices);
    alerts.create(request("ADA", 0.5, AlertDirection::Below)).unwrap();

    assert_eq!(alerts.check().await.unwrap().triggered_count, 1);
    let second = alerts.check().await.unwrap();
    assert_eq!(second.delivery, DeliveryStatus::Skipped);
}

#[tokio::test]
async fn test_price_failure_propagates() {
    let mut prices = MockPriceSource::new();
    prices.expect_usd_prices().returning(|_| {
        Err(EdgeError::UpstreamUnavailable {
            source_name: "coingecko".to_string(),
            detail: "HTTP 503".to_string(),
        })
    });

    let alerts = store(prices);
    let created = alerts.create(request("BTC", 1.0, AlertDirection::Above)).unwrap();

    assert!(matches!(
        alerts.check().await,
        Err(EdgeError::UpstreamUnavailable { .. })
    ));
    // Nothing was marked as checked
    assert!(alerts.list()[0].last_checked_at.is_none());
    assert!(alerts.list()[0].is_active);
    assert_eq!(alerts.list()[0].id, created.id);
}

#[tokio::test]
async fn test_delivery_sent_wins() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(2)
        .mount(&server)
        .await;

    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .returning(|_| Ok(quote(&[("BTC", 70000.0), ("ETH", 4000.0)])));

    let notifier =
        Notifier::new("token".to_string(), "chat".to_string()).with_api_base(&server.uri());
    let alerts = store_with(prices, notifier);
    alerts.create(request("BTC", 65000.0, AlertDirection::Above)).unwrap();
    alerts.create(request("ETH", 3500.0, AlertDirection::Above)).unwrap();

    let report = alerts.check().await.unwrap();
    assert_eq!(report.triggered_count, 2);
    assert_eq!(report.delivery, DeliveryStatus::Sent);
}

#[test]
fn test_delivery_status_folding() {
    use DeliveryStatus::*;
    assert_eq!(NotTriggered.record(Delivery::Failed), SendFailed);
    assert_eq!(SendFailed.record(Delivery::Sent), Sent);
    assert_eq!(Sent.record(Delivery::Failed), Sent);
    assert_eq!(Sent.record(Delivery::NotConfigured), Sent);
    assert_eq!(NotTriggered.record(Delivery::NotConfigured), TelegramNotConfigured);
}

#[test]
fn test_delivery_status_serialization() {
    assert_eq!(
        serde_json::to_string(&DeliveryStatus::TelegramNotConfigured).unwrap(),
        "\"telegram_not_configured\""
    );
}

#[tokio::test]
async fn test_periodic_checker_runs() {
    let mut prices = MockPriceSource::new();
    prices
        .expect_usd_prices()
        .returning(|_| Ok(quote(&[("XRP", 1.0)])));

    let alerts = Arc::new(store(prices));
    alerts.create(request("XRP", 0.5, AlertDirection::Above)).unwrap();

    let handle = alerts.clone().spawn_checker(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();

    assert!(!alerts.list()[0].is_active);
    assert_eq!(alerts.list()[0].trigger_count, 1);
}
