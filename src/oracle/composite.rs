use crate::config::OracleConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Composite price history is capped at this many samples.
pub const HISTORY_CAP: usize = 200;

/// A single exchange's spot quote. Ephemeral — folded into the composite mean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// The arithmetic mean of whichever sources answered this tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositePrice {
    pub value: f64,
    pub last_update: DateTime<Utc>,
    pub contributing_sources: Vec<String>,
}

impl CompositePrice {
    pub fn age_secs(&self) -> f64 {
        (Utc::now() - self.last_update).num_milliseconds() as f64 / 1000.0
    }

    pub fn is_fresh(&self, limit_secs: i64) -> bool {
        self.age_secs() <= limit_secs as f64
    }
}

/// Multi-exchange BTC/USD composite oracle.
///
/// Fetches all configured sources in parallel every tick, with pooled
/// connections, keepalive, and a per-call timeout on the shared client.
/// If zero sources answer the composite is left untouched and ages in
/// place; settlement independently enforces freshness.
pub struct PriceOracle {
    config: OracleConfig,
    http: reqwest::Client,
    pub composite: Arc<RwLock<Option<CompositePrice>>>,
    pub history: Arc<RwLock<VecDeque<PriceSample>>>,
    price_tx: broadcast::Sender<CompositePrice>,
}

impl PriceOracle {
    pub fn new(config: OracleConfig) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(6)
            .tcp_keepalive(Some(StdDuration::from_secs(30)))
            .timeout(StdDuration::from_secs(config.per_source_timeout_secs))
            .build()
            .expect("failed to build oracle HTTP client");

        let (price_tx, _) = broadcast::channel(256);

        Self {
            config,
            http,
            composite: Arc::new(RwLock::new(None)),
            history: Arc::new(RwLock::new(VecDeque::with_capacity(HISTORY_CAP))),
            price_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompositePrice> {
        self.price_tx.subscribe()
    }

    /// Current composite value, if any source has ever answered.
    pub async fn current(&self) -> Option<CompositePrice> {
        self.composite.read().await.clone()
    }

    pub async fn history_snapshot(&self) -> Vec<f64> {
        self.history.read().await.iter().map(|s| s.price).collect()
    }

    /// Fetch all six sources in parallel, average the survivors, append to history.
    ///
    /// Each source is isolated: one failing does not block the others, and
    /// the composite only moves when at least one source answers.
    pub async fn tick(&self) {
        let (binance, coinbase, kraken, bitstamp, gemini, bitfinex) = tokio::join!(
            Self::fetch_binance(&self.http, &self.config.binance_spot_url),
            Self::fetch_coinbase(&self.http, &self.config.coinbase_url),
            Self::fetch_kraken(&self.http, &self.config.kraken_url),
            Self::fetch_bitstamp(&self.http, &self.config.bitstamp_url),
            Self::fetch_gemini(&self.http, &self.config.gemini_url),
            Self::fetch_bitfinex(&self.http, &self.config.bitfinex_url),
        );

        let results: [(&str, Result<f64, String>); 6] = [
            ("binance", binance),
            ("coinbase", coinbase),
            ("kraken", kraken),
            ("bitstamp", bitstamp),
            ("gemini", gemini),
            ("bitfinex", bitfinex),
        ];

        let mut prices = Vec::with_capacity(6);
        let mut sources = Vec::with_capacity(6);

        for (name, result) in results {
            match result {
                Ok(price) if price > 0.0 => {
                    prices.push(price);
                    sources.push(name.to_string());
                }
                Ok(_) => {
                    debug!(source = name, "oracle source returned non-positive price");
                }
                Err(e) => {
                    debug!(source = name, error = %e, "oracle source fetch failed, isolating");
                }
            }
        }

        if prices.is_empty() {
            warn!("oracle tick: zero sources answered, composite left to age");
            return;
        }

        let value = prices.iter().sum::<f64>() / prices.len() as f64;
        let now = Utc::now();
        let composite = CompositePrice {
            value,
            last_update: now,
            contributing_sources: sources.clone(),
        };

        {
            let mut slot = self.composite.write().await;
            *slot = Some(composite.clone());
        }
        {
            let mut hist = self.history.write().await;
            if hist.len() >= HISTORY_CAP {
                hist.pop_front();
            }
            hist.push_back(PriceSample { price: value, timestamp: now });
        }

        info!(
            value = value,
            contributors = sources.len(),
            "oracle composite updated"
        );

        let _ = self.price_tx.send(composite);
    }

    async fn fetch_binance(http: &reqwest::Client, url: &str) -> Result<f64, String> {
        #[derive(Deserialize)]
        struct Resp {
            price: String,
        }
        let resp: Resp = http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        resp.price.parse().map_err(|e: std::num::ParseFloatError| e.to_string())
    }

    async fn fetch_coinbase(http: &reqwest::Client, url: &str) -> Result<f64, String> {
        #[derive(Deserialize)]
        struct Data {
            amount: String,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Data,
        }
        let resp: Resp = http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        resp.data.amount.parse().map_err(|e: std::num::ParseFloatError| e.to_string())
    }

    async fn fetch_kraken(http: &reqwest::Client, url: &str) -> Result<f64, String> {
        let val: serde_json::Value = http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        let result = val.get("result").ok_or("missing result")?;
        let pair = result
            .as_object()
            .and_then(|m| m.values().next())
            .ok_or("empty kraken result")?;
        let last_trade = pair
            .get("c")
            .and_then(|c| c.get(0))
            .and_then(|c| c.as_str())
            .ok_or("missing kraken close price")?;
        last_trade.parse().map_err(|e: std::num::ParseFloatError| e.to_string())
    }

    async fn fetch_bitstamp(http: &reqwest::Client, url: &str) -> Result<f64, String> {
        #[derive(Deserialize)]
        struct Resp {
            last: String,
        }
        let resp: Resp = http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        resp.last.parse().map_err(|e: std::num::ParseFloatError| e.to_string())
    }

    async fn fetch_gemini(http: &reqwest::Client, url: &str) -> Result<f64, String> {
        #[derive(Deserialize)]
        struct Resp {
            last: String,
        }
        let resp: Resp = http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        resp.last.parse().map_err(|e: std::num::ParseFloatError| e.to_string())
    }

    async fn fetch_bitfinex(http: &reqwest::Client, url: &str) -> Result<f64, String> {
        // Bitfinex ticker returns a positional array: [BID, BID_SIZE, ASK, ASK_SIZE,
        // DAILY_CHANGE, DAILY_CHANGE_RELATIVE, LAST_PRICE, VOLUME, HIGH, LOW]
        let arr: Vec<serde_json::Value> = http
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        arr.get(6)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| "missing bitfinex last price".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_freshness() {
        let fresh = CompositePrice {
            value: 90_000.0,
            last_update: Utc::now(),
            contributing_sources: vec!["binance".into()],
        };
        assert!(fresh.is_fresh(30));

        let stale = CompositePrice {
            value: 90_000.0,
            last_update: Utc::now() - chrono::Duration::seconds(45),
            contributing_sources: vec!["binance".into()],
        };
        assert!(!stale.is_fresh(30));
    }
}
