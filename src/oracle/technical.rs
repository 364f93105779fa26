use serde::{Deserialize, Serialize};

const RSI_PERIOD: usize = 14;
const SMA_PERIOD: usize = 20;

/// Trend classification against a 20-period SMA, with a half-a-point dead
/// band around the average to avoid flapping on noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// A read-only snapshot of momentum/trend state. The evaluator uses it as a
/// hard admission filter: the up side is disallowed on a downtrend or
/// overbought RSI, the down side on an uptrend or oversold RSI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub rsi: Option<f64>,
    pub sma: Option<f64>,
    pub trend: Trend,
}

/// Wilder-smoothed RSI over `closes`. Returns `None` if there's not enough
/// history for a single smoothed average (needs `RSI_PERIOD + 1` closes).
pub fn rsi(closes: &[f64]) -> Option<f64> {
    if closes.len() < RSI_PERIOD + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = deltas[..RSI_PERIOD]
        .iter()
        .map(|d| if *d > 0.0 { *d } else { 0.0 })
        .sum::<f64>()
        / RSI_PERIOD as f64;
    let mut avg_loss = deltas[..RSI_PERIOD]
        .iter()
        .map(|d| if *d < 0.0 { -*d } else { 0.0 })
        .sum::<f64>()
        / RSI_PERIOD as f64;

    for delta in &deltas[RSI_PERIOD..] {
        let gain = if *delta > 0.0 { *delta } else { 0.0 };
        let loss = if *delta < 0.0 { -*delta } else { 0.0 };
        avg_gain = ((avg_gain * (RSI_PERIOD as f64 - 1.0)) + gain) / RSI_PERIOD as f64;
        avg_loss = ((avg_loss * (RSI_PERIOD as f64 - 1.0)) + loss) / RSI_PERIOD as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Classify current price against the 20-period SMA with a 5bps dead band.
pub fn classify_trend(current_price: f64, sma_value: f64) -> Trend {
    if current_price > sma_value * 1.0005 {
        Trend::Up
    } else if current_price < sma_value * 0.9995 {
        Trend::Down
    } else {
        Trend::Flat
    }
}

pub fn snapshot(closes: &[f64]) -> TechnicalSnapshot {
    let rsi_value = rsi(closes);
    let sma_value = sma(closes, SMA_PERIOD);
    let trend = match (closes.last(), sma_value) {
        (Some(price), Some(sma_val)) => classify_trend(*price, sma_val),
        _ => Trend::Flat,
    };
    TechnicalSnapshot { rsi: rsi_value, sma: sma_value, trend }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_none_with_insufficient_history() {
        let closes = vec![1.0, 2.0, 3.0];
        assert_eq!(rsi(&closes), None);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes), Some(100.0));
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        assert_eq!(rsi(&closes), Some(0.0));
    }

    #[test]
    fn sma_requires_full_window() {
        let closes = vec![1.0, 2.0, 3.0];
        assert_eq!(sma(&closes, 20), None);
        assert_eq!(sma(&closes, 3), Some(2.0));
    }

    #[test]
    fn trend_dead_band() {
        assert_eq!(classify_trend(100.0, 100.0), Trend::Flat);
        assert_eq!(classify_trend(100.1, 100.0), Trend::Up);
        assert_eq!(classify_trend(99.9, 100.0), Trend::Down);
    }
}
