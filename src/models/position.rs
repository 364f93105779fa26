use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::Side;

/// An open position. Immutable until settled or voided.
///
/// Every field carries `#[serde(default)]` so a persisted snapshot with one
/// missing or malformed field loses just that field, not the whole position
/// (a zeroed/epoch default pushes the position toward an early, harmless
/// late-void settlement rather than a bogus payout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub market_slug: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub side: Side,
    #[serde(default)]
    pub entry_price: Decimal,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub token_id: String,
    /// Backfilled from `question` on load if missing/zero — see
    /// `Store::load`.
    #[serde(default)]
    pub strike_price: f64,
}

impl Position {
    /// Shares purchased: `amount / entry_price`.
    pub fn shares(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.amount / self.entry_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Won,
    Lost,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    /// Settled against the observed strike/spot outcome.
    Standard,
    /// Refund-only settlement — expiry too far in the past to settle reliably.
    LateVoid,
}

impl Default for TradeStatus {
    fn default() -> Self {
        TradeStatus::Void
    }
}

impl Default for TradeType {
    fn default() -> Self {
        TradeType::LateVoid
    }
}

/// A closed, immutable trade-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub market_slug: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub side: Side,
    #[serde(default)]
    pub entry_price: Decimal,
    /// `Some(1.0)` / `Some(0.0)` on real settlement, `None` on a void.
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub pnl: Decimal,
    #[serde(default)]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub status: TradeStatus,
    #[serde(default)]
    pub trade_type: TradeType,
}

/// Aggregate portfolio state.
///
/// Invariant: `balance + Σ open.amount == initial_balance + Σ closed.pnl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub initial_balance: Decimal,
    #[serde(default)]
    pub pnl_today: Decimal,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub winning_trades: u64,
}

impl Portfolio {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            pnl_today: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    pub fn total_pnl(&self, open_exposure: Decimal) -> Decimal {
        self.balance + open_exposure - self.initial_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn shares_from_amount_and_price() {
        let pos = Position {
            market_slug: "btc-updown-15m-1".into(),
            question: "q".into(),
            side: Side::Up,
            entry_price: dec!(0.40),
            amount: dec!(0.80),
            entry_time: Utc::now(),
            end_time: Utc::now(),
            token_id: "tok".into(),
            strike_price: 90_000.0,
        };
        assert_eq!(pos.shares(), dec!(2));
    }

    #[test]
    fn win_rate_zero_trades() {
        let p = Portfolio::new(dec!(10));
        assert_eq!(p.win_rate(), 0.0);
    }
}
