use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which side of the binary a position/trade is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Up,
    Down,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Up => write!(f, "up"),
            Side::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub up: String,
    pub down: String,
}

impl TokenPair {
    pub fn token_for(&self, side: Side) -> &str {
        match side {
            Side::Up => &self.up,
            Side::Down => &self.down,
        }
    }
}

/// Quoted outcome prices for the two sides of a binary market.
///
/// Invariant enforced by discovery: `up + down` must fall in `[0.95, 1.05]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutcomePrices {
    pub up: f64,
    pub down: f64,
}

impl OutcomePrices {
    pub fn sum(&self) -> f64 {
        self.up + self.down
    }

    pub fn in_band(&self) -> bool {
        (0.95..=1.05).contains(&self.sum())
    }

    pub fn price_for(&self, side: Side) -> f64 {
        match side {
            Side::Up => self.up,
            Side::Down => self.down,
        }
    }
}

/// A single BTC 15-minute up/down binary market discovered from the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub slug: String,
    pub condition_id: Option<String>,
    pub question: String,
    pub description: String,
    pub strike_price: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tokens: TokenPair,
    pub outcome_prices: OutcomePrices,
    pub best_bid: f64,
    pub best_ask: f64,
    pub liquidity: f64,
    pub accepting_orders: bool,
}

impl Market {
    pub fn seconds_remaining(&self) -> i64 {
        (self.end_time - Utc::now()).num_seconds().max(0)
    }

    pub fn spread(&self) -> f64 {
        (self.best_ask - self.best_bid).abs()
    }

    pub fn is_quote_valid(&self) -> bool {
        self.outcome_prices.in_band()
    }
}

/// `btc-updown-15m-{unix_ts}` — the canonical slug for this engine's market family.
pub const SLUG_PREFIX: &str = "btc-updown-15m-";

/// Parse the unix-timestamp suffix out of a canonical slug, if it matches.
///
/// Hand-rolled rather than via a regex crate — no repo in the reference corpus
/// pulls in `regex`, `once_cell`, or `lazy_static` for this kind of parsing.
pub fn parse_slug_timestamp(slug: &str) -> Option<u64> {
    let suffix = slug.strip_prefix(SLUG_PREFIX)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

pub fn generate_slug(interval_start_unix: u64) -> String {
    format!("{SLUG_PREFIX}{interval_start_unix}")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// CLOB order book for a single token, used by live execution to walk
/// depth for market-order sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    pub bids: BTreeMap<Decimal, Decimal>,
    pub asks: BTreeMap<Decimal, Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Walk asks to find the worst price needed to fill a BUY of `usdc_amount` dollars.
    pub fn calculate_buy_market_price(&self, usdc_amount: f64) -> Option<(f64, f64)> {
        let mut cumulative_cost = 0.0;
        let mut worst_price = 0.0;
        for (&price_dec, &size_dec) in self.asks.iter() {
            let price = price_dec.to_string().parse::<f64>().unwrap_or(0.0);
            let size = size_dec.to_string().parse::<f64>().unwrap_or(0.0);
            if price <= 0.0 || size <= 0.0 {
                continue;
            }
            cumulative_cost += price * size;
            worst_price = price;
            if cumulative_cost >= usdc_amount {
                return Some((worst_price, cumulative_cost));
            }
        }
        if worst_price > 0.0 {
            Some((worst_price, cumulative_cost))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_roundtrip() {
        let slug = generate_slug(1_770_933_900);
        assert_eq!(slug, "btc-updown-15m-1770933900");
        assert_eq!(parse_slug_timestamp(&slug), Some(1_770_933_900));
    }

    #[test]
    fn slug_rejects_garbage() {
        assert_eq!(parse_slug_timestamp("eth-updown-15m-123"), None);
        assert_eq!(parse_slug_timestamp("btc-updown-15m-abc"), None);
        assert_eq!(parse_slug_timestamp("btc-updown-15m-"), None);
    }

    #[test]
    fn outcome_prices_band() {
        let ok = OutcomePrices { up: 0.52, down: 0.50 };
        assert!(ok.in_band());
        let bad = OutcomePrices { up: 0.30, down: 0.30 };
        assert!(!bad.in_band());
    }
}
