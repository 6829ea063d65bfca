//! Configuration management

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProviderConfig,
    pub cache: CacheConfig,
    pub signal: SignalConfig,
    /// Symbol (BTC) -> CoinGecko coin id (bitcoin)
    pub coins: BTreeMap<String, String>,
    pub funding: FundingConfig,
    pub alerts: AlertsConfig,
    pub telegram: Option<TelegramConfig>,
    pub portfolio: PortfolioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub coingecko_url: String,
    pub fear_greed_url: String,
    pub binance_funding_url: String,
    pub bybit_funding_url: String,
    /// Per-request timeout for every upstream call
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age below which a cached reading is reused without an upstream call
    pub ttl_secs: i64,
    /// Oldest cached reading a signal may fall back to
    pub max_staleness_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub momentum_weight: f64,
    pub fear_greed_weight: f64,
    pub funding_weight: f64,
    /// Symmetric BUY/SELL cutoff on the composite score
    pub action_threshold: f64,
    pub confidence_floor: u8,
    pub confidence_ceiling: u8,
    /// Score magnitude treated as maximally confident
    pub saturation: f64,
    /// 24h change (percent) that maps to a full +/-1 momentum
    pub momentum_full_scale_pct: f64,
    /// Funding rate that maps to a full +/-1 contribution
    pub funding_full_scale: f64,
    pub model_version: String,
    /// Symbols served when a request names none
    pub default_symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    /// Quote asset appended to a symbol to form the perpetual pair
    pub quote: String,
    /// Pairs shown on the funding board when none are requested
    pub default_pairs: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Run the alert checker periodically when set
    pub check_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub positions: Vec<PositionConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionConfig {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_cost_usd: Decimal,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("config path is not valid UTF-8: {:?}", path))?;

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(Self::environment())
            .build()?;

        Self::finish(settings.try_deserialize()?)
    }

    /// Load from default locations, falling back to built-in defaults
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = [
            "busyedge.toml",
            "config.toml",
            "~/.config/busyedge/config.toml",
        ];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        let settings = config::Config::builder()
            .add_source(Self::environment())
            .build()?;
        Self::finish(settings.try_deserialize()?)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("BUSYEDGE")
            .separator("__")
            .try_parsing(true)
    }

    /// Apply the plain environment variables the dashboard has always read
    fn finish(mut config: Config) -> anyhow::Result<Self> {
        if config.telegram.is_none() {
            if let (Ok(bot_token), Ok(chat_id)) = (
                std::env::var("TELEGRAM_BOT_TOKEN"),
                std::env::var("TELEGRAM_CHAT_ID"),
            ) {
                if !bot_token.is_empty() && !chat_id.is_empty() {
                    config.telegram = Some(TelegramConfig { bot_token, chat_id });
                }
            }
        }

        if config.portfolio.positions.is_empty() {
            if let Ok(raw) = std::env::var("PORTFOLIO_POSITIONS_JSON") {
                if !raw.trim().is_empty() {
                    config.portfolio.positions = serde_json::from_str(&raw).map_err(|e| {
                        anyhow::anyhow!("PORTFOLIO_POSITIONS_JSON must be a JSON array: {}", e)
                    })?;
                }
            }
        }

        config.coins = config
            .coins
            .into_iter()
            .map(|(symbol, id)| (symbol.trim().to_uppercase(), id))
            .collect();

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the composer cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.signal;
        let weights = [s.momentum_weight, s.fear_greed_weight, s.funding_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            anyhow::bail!("signal weights must be finite and non-negative");
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            anyhow::bail!("at least one signal weight must be positive");
        }
        if !(s.saturation > 0.0) {
            anyhow::bail!("signal.saturation must be positive");
        }
        if !(s.action_threshold >= 0.0 && s.action_threshold < 1.0) {
            anyhow::bail!("signal.action_threshold must be in [0, 1)");
        }
        if s.confidence_floor > s.confidence_ceiling || s.confidence_ceiling > 100 {
            anyhow::bail!("signal confidence bounds must satisfy floor <= ceiling <= 100");
        }
        if !(s.momentum_full_scale_pct > 0.0) || !(s.funding_full_scale > 0.0) {
            anyhow::bail!("normalisation scales must be positive");
        }
        if self.cache.ttl_secs < 0 || self.cache.max_staleness_secs < self.cache.ttl_secs {
            anyhow::bail!("cache.max_staleness_secs must be >= cache.ttl_secs >= 0");
        }
        if self.coins.is_empty() {
            anyhow::bail!("no coins configured");
        }
        let unknown: Vec<&str> = s
            .default_symbols
            .iter()
            .filter(|symbol| self.coin_id(symbol).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            anyhow::bail!(
                "signal.default_symbols not in [coins]: {}",
                unknown.join(", ")
            );
        }
        Ok(())
    }

    /// CoinGecko id for a symbol
    pub fn coin_id(&self, symbol: &str) -> Option<&str> {
        self.coins.get(&symbol.to_uppercase()).map(String::as_str)
    }
}

impl Default for Config {
    fn default() -> Self {
        let coins = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("SOL", "solana"),
            ("XRP", "ripple"),
            ("DOGE", "dogecoin"),
            ("BNB", "binancecoin"),
            ("ADA", "cardano"),
            ("AVAX", "avalanche-2"),
        ]
        .into_iter()
        .map(|(s, id)| (s.to_string(), id.to_string()))
        .collect();

        Self {
            server: ServerConfig::default(),
            providers: ProviderConfig::default(),
            cache: CacheConfig::default(),
            signal: SignalConfig::default(),
            coins,
            funding: FundingConfig::default(),
            alerts: AlertsConfig::default(),
            telegram: None,
            portfolio: PortfolioConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            coingecko_url: "https://api.coingecko.com/api/v3".to_string(),
            fear_greed_url: "https://api.alternative.me/fng/".to_string(),
            binance_funding_url: "https://fapi.binance.com/fapi/v1/premiumIndex".to_string(),
            bybit_funding_url: "https://api.bybit.com/v5/market/tickers".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_staleness_secs: 3600, // 1 hour
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            momentum_weight: 0.55,
            fear_greed_weight: 0.30,
            funding_weight: 0.15,
            action_threshold: 0.15,
            confidence_floor: 52,
            confidence_ceiling: 95,
            saturation: 0.5,
            momentum_full_scale_pct: 10.0,
            funding_full_scale: 0.001, // 0.1% per interval
            model_version: "busyedge-rules-v1".to_string(),
            default_symbols: ["BTC", "ETH", "SOL", "XRP", "DOGE", "BNB", "ADA", "AVAX"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            quote: "USDT".to_string(),
            default_pairs: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coin_id("btc"), Some("bitcoin"));
        assert_eq!(config.coin_id("AVAX"), Some("avalanche-2"));
        assert!((config.signal.momentum_weight + config.signal.fear_greed_weight
            + config.signal.funding_weight
            - 1.0)
            .abs()
            < 1e-9);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [signal]
            saturation = 0.4

            [cache]
            max_staleness_secs = 7200
            "#,
        )
        .unwrap();

        assert_eq!(config.signal.saturation, 0.4);
        assert_eq!(config.signal.momentum_weight, 0.55);
        assert_eq!(config.cache.max_staleness_secs, 7200);
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(config.telegram.is_none());
        assert_eq!(config.coins.len(), 8);
    }

    #[test]
    fn test_portfolio_positions_parse() {
        let config: Config = toml::from_str(
            r#"
            [[portfolio.positions]]
            symbol = "BTC"
            quantity = 0.5
            avg_cost_usd = 42000

            [[portfolio.positions]]
            symbol = "ETH"
            quantity = "3"
            avg_cost_usd = "2500.5"
            "#,
        )
        .unwrap();

        assert_eq!(config.portfolio.positions.len(), 2);
        assert_eq!(config.portfolio.positions[0].quantity, dec!(0.5));
        assert_eq!(config.portfolio.positions[1].avg_cost_usd, dec!(2500.5));
    }

    #[test]
    fn test_validate_rejects_bad_confidence_bounds() {
        let mut config = Config::default();
        config.signal.confidence_floor = 96;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_weights() {
        let mut config = Config::default();
        config.signal.momentum_weight = 0.0;
        config.signal.fear_greed_weight = 0.0;
        config.signal.funding_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_saturation() {
        let mut config = Config::default();
        config.signal.saturation = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_default_symbols_outside_coins() {
        let mut config = Config::default();
        config.coins = [("BTC", "bitcoin"), ("ETH", "ethereum")]
            .into_iter()
            .map(|(s, id)| (s.to_string(), id.to_string()))
            .collect();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("SOL"));
        assert!(!err.contains("BTC"));

        config.signal.default_symbols = vec!["btc".to_string(), "ETH".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_staleness_below_ttl() {
        let mut config = Config::default();
        config.cache.max_staleness_secs = 10;
        assert!(config.validate().is_err());
    }
}
