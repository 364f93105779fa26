use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub polymarket: PolymarketConfig,
    pub oracle: OracleConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketConfig {
    pub clob_host: String,
    pub ws_host: String,
    pub gamma_api_host: String,
    pub chain_id: u64,
    pub private_key: String,
    pub funder_address: Option<String>,
    pub signature_type: u8, // 0 = EOA, 1 = Poly Proxy
}

/// Upstream spot sources and the klines endpoint used for volatility/strike
/// resolution. Six REST sources fetched in parallel every oracle tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub binance_spot_url: String,
    pub binance_klines_url: String,
    pub coinbase_url: String,
    pub kraken_url: String,
    pub bitstamp_url: String,
    pub gemini_url: String,
    pub bitfinex_url: String,
    pub per_source_timeout_secs: u64,
    pub staleness_limit_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub min_edge_percent: f64,     // e.g. 0.10
    pub max_position_usd: f64,     // hard ceiling per trade
    pub annual_volatility: f64,    // fallback sigma, e.g. 0.80
    pub snipe_cooldown_seconds: u64, // cooldown between entries, e.g. 10
    pub mm_spread_width: f64,       // unused placeholder for a future quoting mode
    pub mm_base_size_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub daily_loss_limit_usd: f64,
    pub max_positions: u32,          // single-position engine: 1
    pub max_single_trade_usd: f64,
    /// Separate, distinct ceiling on a trade's fee-inclusive total cost
    /// (`price * size * (1 + fee_rate)`), checked after `max_single_trade_usd`.
    pub max_position_usd: f64,
    pub max_orders_per_second: u32,  // rate limiter: 50
    pub order_lifetime_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub metrics_port: u16,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            binance_spot_url: "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT".into(),
            binance_klines_url: "https://api.binance.com/api/v3/klines".into(),
            coinbase_url: "https://api.coinbase.com/v2/prices/BTC-USD/spot".into(),
            kraken_url: "https://api.kraken.com/0/public/Ticker?pair=XBTUSD".into(),
            bitstamp_url: "https://www.bitstamp.net/api/v2/ticker/btcusd/".into(),
            gemini_url: "https://api.gemini.com/v1/pubticker/btcusd".into(),
            bitfinex_url: "https://api-pub.bitfinex.com/v2/ticker/tBTCUSD".into(),
            per_source_timeout_secs: 10,
            staleness_limit_secs: 30,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_edge_percent: 0.10,
            max_position_usd: 50.0,
            annual_volatility: 0.80,
            snipe_cooldown_seconds: 10,
            mm_spread_width: 0.02,
            mm_base_size_usd: 5.0,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit_usd: 20.0,
            max_positions: 1,
            max_single_trade_usd: 50.0,
            max_position_usd: 100.0,
            max_orders_per_second: 50,
            order_lifetime_ms: 60_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polymarket: PolymarketConfig {
                clob_host: "https://clob.polymarket.com".into(),
                ws_host: "wss://ws-subscriptions-clob.polymarket.com/ws/market".into(),
                gamma_api_host: "https://gamma-api.polymarket.com".into(),
                chain_id: 137,
                private_key: String::new(),
                funder_address: None,
                signature_type: 0,
            },
            oracle: OracleConfig::default(),
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".into(),
                metrics_port: 9090,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Required env vars:
    ///   POLYMARKET_PRIVATE_KEY — hex private key for signing
    ///   STARTING_CAPITAL — initial USDC balance (default: 5)
    ///
    /// Optional env vars:
    ///   POLYMARKET_FUNDER_ADDRESS — proxy wallet address
    ///   POLYMARKET_SIGNATURE_TYPE — 0=EOA, 1=PolyProxy (default: 0)
    ///   MIN_EDGE_PERCENT, MAX_POSITION_USD, ANNUAL_VOLATILITY,
    ///   SNIPE_COOLDOWN_SECONDS, DAILY_LOSS_LIMIT_USD, MAX_SINGLE_TRADE_USD,
    ///   MAX_POSITION_COST_USD, MAX_ORDERS_PER_SECOND, ORDER_LIFETIME_MS, METRICS_PORT
    ///   RUST_LOG — log level (default: info)
    ///   DRY_RUN — set to "true" to use random key (no real orders)
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Ok(key) = std::env::var("POLYMARKET_PRIVATE_KEY") {
            if key != "your_private_key_here" {
                config.polymarket.private_key = key;
            }
        }

        if let Ok(addr) = std::env::var("POLYMARKET_FUNDER_ADDRESS") {
            if !addr.is_empty() && addr != "optional_proxy_address" {
                config.polymarket.funder_address = Some(addr);
            }
        }

        if let Ok(sig_type) = std::env::var("POLYMARKET_SIGNATURE_TYPE") {
            config.polymarket.signature_type = sig_type.parse().unwrap_or(0);
        }

        Self::env_f64("MIN_EDGE_PERCENT", &mut config.strategy.min_edge_percent);
        Self::env_f64("MAX_POSITION_USD", &mut config.strategy.max_position_usd);
        Self::env_f64("ANNUAL_VOLATILITY", &mut config.strategy.annual_volatility);
        if let Ok(v) = std::env::var("SNIPE_COOLDOWN_SECONDS") {
            config.strategy.snipe_cooldown_seconds = v.parse().unwrap_or(config.strategy.snipe_cooldown_seconds);
        }

        Self::env_f64("DAILY_LOSS_LIMIT_USD", &mut config.risk.daily_loss_limit_usd);
        Self::env_f64("MAX_SINGLE_TRADE_USD", &mut config.risk.max_single_trade_usd);
        Self::env_f64("MAX_POSITION_COST_USD", &mut config.risk.max_position_usd);
        if let Ok(v) = std::env::var("MAX_ORDERS_PER_SECOND") {
            config.risk.max_orders_per_second = v.parse().unwrap_or(config.risk.max_orders_per_second);
        }
        if let Ok(v) = std::env::var("ORDER_LIFETIME_MS") {
            config.risk.order_lifetime_ms = v.parse().unwrap_or(config.risk.order_lifetime_ms);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }
        if let Ok(port) = std::env::var("METRICS_PORT") {
            config.telemetry.metrics_port = port.parse().unwrap_or(config.telemetry.metrics_port);
        }

        let dry_run = std::env::var("DRY_RUN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if config.polymarket.private_key.is_empty() && !dry_run {
            tracing::warn!("No POLYMARKET_PRIVATE_KEY set — entering DRY RUN mode");
            tracing::warn!("Orders will be signed with a random key and will fail on CLOB");
        }

        config
    }

    fn env_f64(key: &str, slot: &mut f64) {
        if let Ok(v) = std::env::var(key) {
            if let Ok(parsed) = v.parse() {
                *slot = parsed;
            }
        }
    }

    /// Get starting capital from env, defaulting to 5.0 USDC.
    pub fn starting_capital() -> f64 {
        std::env::var("STARTING_CAPITAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5.0)
    }

    /// Check if running in dry-run mode (no real key).
    pub fn is_dry_run(&self) -> bool {
        self.polymarket.private_key.is_empty()
            || std::env::var("DRY_RUN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.is_dry_run() {
            tracing::info!("Dry-run mode — skipping private key validation");
        } else {
            anyhow::ensure!(
                !self.polymarket.private_key.is_empty(),
                "POLYMARKET_PRIVATE_KEY must be set (or set DRY_RUN=true)"
            );
        }
        anyhow::ensure!(
            self.strategy.min_edge_percent > 0.0 && self.strategy.min_edge_percent < 1.0,
            "min_edge_percent must be between 0 and 1"
        );
        anyhow::ensure!(
            self.strategy.annual_volatility >= 0.20 && self.strategy.annual_volatility <= 2.00,
            "annual_volatility fallback must stay within the [0.20, 2.00] clamp band"
        );
        anyhow::ensure!(
            self.risk.max_positions >= 1,
            "max_positions must be at least 1"
        );
        Ok(())
    }
}
