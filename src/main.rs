//! BusyEdge backend
//!
//! Serves the dashboard API and offers one-shot commands for signals,
//! prices and alert checks.

use anyhow::Context;
use busyedge::{
    alerts::{AlertDirection, AlertStore, CreateAlert},
    api::{create_router, AppState},
    client::MarketClients,
    config::Config,
    market::{MarketService, PriceSource},
    notify::Notifier,
    portfolio::Portfolio,
    signals::{SignalEngine, SignalOutcome},
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "busyedge")]
#[command(about = "Crypto market signals with graceful degradation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to busyedge.toml, config.toml, ~/.config/busyedge/config.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the listen address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print signals for a set of symbols
    Signals {
        /// Comma separated symbols, e.g. BTC,ETH (defaults from config)
        #[arg(short, long)]
        symbols: Option<String>,
    },
    /// Print the full analysis for one symbol
    Analyze {
        symbol: String,
    },
    /// Print spot prices
    Prices {
        /// Comma separated CoinGecko ids
        #[arg(long)]
        coin_ids: Option<String>,
    },
    /// Check price conditions once and notify Telegram
    CheckAlerts {
        /// SYMBOL:above|below:PRICE, may be repeated
        #[arg(short, long = "watch", required = true)]
        watch: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("busyedge=info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await?,
        Commands::Signals { symbols } => show_signals(config, symbols).await?,
        Commands::Analyze { symbol } => analyze(config, &symbol).await?,
        Commands::Prices { coin_ids } => show_prices(config, coin_ids).await?,
        Commands::CheckAlerts { watch } => check_alerts(config, &watch).await?,
    }

    Ok(())
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

async fn serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let clients = MarketClients::new(&config.providers)?;
    let engine = Arc::new(SignalEngine::from_clients(&config, &clients));
    let market = Arc::new(MarketService::new(&config, clients));
    let prices: Arc<dyn PriceSource> = market.clone();

    let notifier = Notifier::from_config(config.telegram.as_ref());
    let telegram_enabled = notifier.is_enabled();
    let alerts = Arc::new(AlertStore::new(config.coins.clone(), prices.clone(), notifier));
    let portfolio = Arc::new(Portfolio::new(
        config.portfolio.positions.clone(),
        config.coins.clone(),
        prices,
    ));

    let checker = config
        .alerts
        .check_interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| {
            tracing::info!("Alert checker running every {}s", secs);
            alerts.clone().spawn_checker(Duration::from_secs(secs))
        });

    let state = Arc::new(AppState {
        engine,
        market,
        alerts,
        portfolio,
        started_at: Utc::now(),
        telegram_enabled,
    });
    let router = create_router(state, &config.server.cors_origins);

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("BusyEdge API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    if let Some(handle) = checker {
        handle.abort();
    }
    Ok(())
}

async fn show_signals(config: Config, symbols: Option<String>) -> anyhow::Result<()> {
    let clients = MarketClients::new(&config.providers)?;
    let engine = SignalEngine::from_clients(&config, &clients);
    let outcomes = engine.signals(&split_csv(symbols)).await?;

    println!("\n📡 Signals ({})\n", config.signal.model_version);
    println!("{:<8} {:<6} {:>6} {:>8}  {}", "Symbol", "Action", "Conf", "Score", "Sources");
    println!("{}", "-".repeat(72));

    for outcome in outcomes {
        match outcome {
            SignalOutcome::Available(signal) => println!(
                "{:<8} {:<6} {:>5}% {:>+8.3}  {}{}",
                signal.symbol,
                signal.action.to_string(),
                signal.confidence,
                signal.score,
                signal.data_source.summary(),
                if signal.is_stale { " (stale)" } else { "" }
            ),
            SignalOutcome::Unavailable { symbol, reason, .. } => {
                println!("{:<8} {:<6} {:>6} {:>8}  {}", symbol, "-", "-", "-", reason)
            }
        }
    }

    Ok(())
}

async fn analyze(config: Config, symbol: &str) -> anyhow::Result<()> {
    let clients = MarketClients::new(&config.providers)?;
    let engine = SignalEngine::from_clients(&config, &clients);
    let analysis = engine.analysis(symbol).await?;
    let signal = &analysis.signal;

    println!("\n📈 {} Analysis\n", analysis.symbol);
    println!("Action:     {}", signal.action);
    println!("Confidence: {}%", signal.confidence);
    println!("Score:      {:+.3}", signal.score);
    println!("Reason:     {}", signal.reason);
    if signal.is_stale {
        println!("Note:       built partly from cached data");
    }

    println!("\nReadings:");
    for report in &analysis.readings {
        let reading = &report.reading;
        let value = reading
            .value
            .map(|v| format!("{:.6}", v))
            .unwrap_or_else(|| "-".to_string());
        let weight = report
            .weight
            .map(|w| format!("w {:.3}", w))
            .unwrap_or_default();
        print!(
            "  {:<16} {:<16} {:>14} {:<10} {}",
            reading.provider,
            reading.metric.as_str(),
            value,
            format!("{:?}", reading.freshness).to_lowercase(),
            weight
        );
        if let Some(failure) = &report.failure {
            print!("  [{}]", failure);
        }
        println!();
    }

    Ok(())
}

async fn show_prices(config: Config, coin_ids: Option<String>) -> anyhow::Result<()> {
    let clients = MarketClients::new(&config.providers)?;
    let market = MarketService::new(&config, clients);
    let served = market.prices(&split_csv(coin_ids)).await?;

    println!("\n💰 Spot Prices ({})\n", served.data_source);
    println!("{:<8} {:>14} {:>10} {:>18}", "Symbol", "Price", "24h", "Market Cap");
    println!("{}", "-".repeat(54));
    for row in &served.data {
        println!(
            "{:<8} {:>14} {:>10} {:>18}",
            row.symbol,
            row.price_usd.map(|p| format!("${:.4}", p)).unwrap_or_default(),
            row.change_24h_pct.map(|c| format!("{:+.2}%", c)).unwrap_or_default(),
            row.market_cap.map(|m| format!("${:.0}", m)).unwrap_or_default(),
        );
    }
    if let Some(reason) = &served.fallback_reason {
        println!("\n⚠️  Served from cache: {}", reason);
    }

    Ok(())
}

/// Parse `SYMBOL:above|below:PRICE`
fn parse_watch(entry: &str) -> anyhow::Result<CreateAlert> {
    let parts: Vec<&str> = entry.split(':').collect();
    let [symbol, direction, price] = parts.as_slice() else {
        anyhow::bail!("expected SYMBOL:above|below:PRICE, got {:?}", entry);
    };
    let direction = match direction.to_lowercase().as_str() {
        "above" => AlertDirection::Above,
        "below" => AlertDirection::Below,
        other => anyhow::bail!("unknown direction {:?}", other),
    };
    let target_price_usd = price
        .parse::<f64>()
        .with_context(|| format!("invalid price in {:?}", entry))?;

    Ok(CreateAlert {
        symbol: symbol.to_string(),
        target_price_usd,
        direction,
        note: None,
    })
}

async fn check_alerts(config: Config, watch: &[String]) -> anyhow::Result<()> {
    let clients = MarketClients::new(&config.providers)?;
    let market: Arc<dyn PriceSource> = Arc::new(MarketService::new(&config, clients));
    let notifier = Notifier::from_config(config.telegram.as_ref());
    let alerts = AlertStore::new(config.coins.clone(), market, notifier);

    for entry in watch {
        alerts.create(parse_watch(entry)?)?;
    }

    let report = alerts.check().await?;
    println!(
        "Checked {} alert(s), {} triggered, delivery: {:?}",
        report.checked_count, report.triggered_count, report.delivery
    );
    for alert in alerts.list().iter().filter(|a| !a.is_active) {
        println!(
            "  🔔 {} {:?} {}",
            alert.symbol, alert.direction, alert.target_price_usd
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let alert = parse_watch("btc:Below:60000.5").unwrap();
        assert_eq!(alert.symbol, "btc");
        assert_eq!(alert.direction, AlertDirection::Below);
        assert_eq!(alert.target_price_usd, 60000.5);

        assert!(parse_watch("btc:sideways:1").is_err());
        assert!(parse_watch("btc:above").is_err());
        assert!(parse_watch("btc:above:abc").is_err());
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv(Some("BTC, eth,".to_string())), vec!["BTC", "eth"]);
        assert!(split_csv(None).is_empty());
    }
}
