use crate::config::OracleConfig;
use tracing::{debug, warn};

/// 1-minute closes requested per estimate.
const KLINES_LOOKBACK: u32 = 60;
/// Minutes in a year, used to annualize the per-minute log-return stddev.
const MINUTES_PER_YEAR: f64 = 525_600.0;
const MIN_ANNUAL_VOL: f64 = 0.20;
const MAX_ANNUAL_VOL: f64 = 2.00;

/// On-demand realized-volatility estimator: fetches 60 one-minute BTC closes
/// from the klines endpoint, computes the annualized log-return stddev, and
/// clamps it to a sane band. Failures of any kind fall back to the
/// configured sigma.
pub struct VolatilityEstimator {
    http: reqwest::Client,
    klines_url: String,
    fallback: f64,
}

impl VolatilityEstimator {
    pub fn new(config: &OracleConfig, fallback: f64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.per_source_timeout_secs))
                .build()
                .expect("failed to build volatility HTTP client"),
            klines_url: config.binance_klines_url.clone(),
            fallback,
        }
    }

    /// Fetch fresh klines and compute the current annualized volatility, or
    /// the configured fallback sigma on any fetch/parse/insufficient-data
    /// failure.
    pub async fn current(&self) -> f64 {
        match self.fetch_closes().await {
            Ok(closes) => match realized_annual_volatility(&closes) {
                Some(sigma) => sigma,
                None => {
                    debug!("insufficient klines history, using fallback volatility");
                    self.fallback
                }
            },
            Err(e) => {
                warn!(error = %e, "klines volatility fetch failed, using fallback");
                self.fallback
            }
        }
    }

    async fn fetch_closes(&self) -> Result<Vec<f64>, String> {
        let url = format!(
            "{}?symbol=BTCUSDT&interval=1m&limit={KLINES_LOOKBACK}",
            self.klines_url
        );
        let resp = self.http.get(&url).send().await.map_err(|e| e.to_string())?;
        let klines: Vec<Vec<serde_json::Value>> =
            resp.json().await.map_err(|e| e.to_string())?;

        Ok(klines
            .iter()
            .filter_map(|candle| candle.get(4))
            .filter_map(|close| close.as_str())
            .filter_map(|s| s.parse::<f64>().ok())
            .collect())
    }
}

/// Annualized stddev of 1-minute log returns, or `None` if there isn't
/// enough history to form at least one return.
fn realized_annual_volatility(closes: &[f64]) -> Option<f64> {
    let log_returns: Vec<f64> = closes
        .windows(2)
        .filter_map(|w| {
            if w[0] > 0.0 && w[1] > 0.0 {
                Some((w[1] / w[0]).ln())
            } else {
                None
            }
        })
        .collect();

    if log_returns.len() < 2 {
        return None;
    }

    let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
    let variance = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (log_returns.len() as f64 - 1.0);
    let per_minute_std = variance.sqrt();
    let annualized = per_minute_std * MINUTES_PER_YEAR.sqrt();

    if !annualized.is_finite() {
        return None;
    }

    Some(annualized.clamp(MIN_ANNUAL_VOL, MAX_ANNUAL_VOL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_history_returns_none() {
        assert_eq!(realized_annual_volatility(&[90_000.0]), None);
    }

    #[test]
    fn realistic_walk_lands_in_band() {
        let mut closes = Vec::with_capacity(60);
        let mut price = 90_000.0_f64;
        for i in 0..60 {
            let drift = if i % 2 == 0 { 1.0015 } else { 0.9990 };
            price *= drift;
            closes.push(price);
        }
        let sigma = realized_annual_volatility(&closes).expect("enough samples");
        assert!(sigma >= MIN_ANNUAL_VOL && sigma <= MAX_ANNUAL_VOL);
    }

    #[test]
    fn degenerate_flat_series_clamps_to_floor() {
        let closes = vec![90_000.0; 60];
        let sigma = realized_annual_volatility(&closes).expect("enough samples");
        assert_eq!(sigma, MIN_ANNUAL_VOL);
    }
}
