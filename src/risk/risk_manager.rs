use crate::config::RiskConfig;
use crate::error::EngineError;
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info};

/// An ordered sequence of trade-admission gates. Checks run in this exact
/// order and the first failing check is the rejection reason.
pub struct RiskManager {
    config: RiskConfig,
    halted: AtomicBool,
    halt_reason: Mutex<Option<String>>,
    /// Set only when `halt` was triggered by a daily-loss breach, so day
    /// rollover knows which halts it is allowed to auto-clear.
    halted_for_daily_loss: AtomicBool,
    daily_trades: AtomicU64,
    trading_day: Mutex<NaiveDate>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            halted: AtomicBool::new(false),
            halt_reason: Mutex::new(None),
            halted_for_daily_loss: AtomicBool::new(false),
            daily_trades: AtomicU64::new(0),
            trading_day: Mutex::new(Utc::now().date_naive()),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn halt(&self, reason: impl Into<String>) {
        self.halt_internal(reason, false);
    }

    fn halt_for_daily_loss(&self, reason: impl Into<String>) {
        self.halt_internal(reason, true);
    }

    fn halt_internal(&self, reason: impl Into<String>, is_daily_loss: bool) {
        let reason = reason.into();
        error!(reason = %reason, "risk manager halting trading");
        self.halted.store(true, Ordering::SeqCst);
        self.halted_for_daily_loss.store(is_daily_loss, Ordering::SeqCst);
        *self.halt_reason.lock().expect("halt reason lock poisoned") = Some(reason);
    }

    pub fn reset_halt(&self) {
        self.halted.store(false, Ordering::SeqCst);
        self.halted_for_daily_loss.store(false, Ordering::SeqCst);
        *self.halt_reason.lock().expect("halt reason lock poisoned") = None;
    }

    /// Day rollover: resets `daily_trades` on a UTC date change and
    /// auto-clears a halt, but only one that was caused by the daily-loss
    /// breach (a manual halt survives rollover). Returns `true` when a
    /// rollover happened this call, so the caller knows to zero `pnl_today`
    /// on its own portfolio state.
    pub fn roll_day_if_needed(&self) -> bool {
        let today = Utc::now().date_naive();
        let mut day = self.trading_day.lock().expect("trading day lock poisoned");
        if *day == today {
            return false;
        }
        *day = today;
        self.daily_trades.store(0, Ordering::SeqCst);
        if self.halted_for_daily_loss.swap(false, Ordering::SeqCst) {
            self.halted.store(false, Ordering::SeqCst);
            *self.halt_reason.lock().expect("halt reason lock poisoned") = None;
            info!("day rollover cleared daily-loss halt");
        }
        true
    }

    pub fn record_trade_opened(&self) {
        self.daily_trades.fetch_add(1, Ordering::SeqCst);
    }

    pub fn daily_trades(&self) -> u64 {
        self.daily_trades.load(Ordering::SeqCst)
    }

    /// Ordered validation: halted -> trade-cost ceiling -> position-cost
    /// ceiling -> daily-loss breach (halts) -> open-position cap -> price
    /// sanity -> size sanity. Each failing check short-circuits the rest.
    ///
    /// `trade_cost` is the pre-fee dollar notional (`price * size`);
    /// `total_cost = trade_cost * (1 + fee_rate)` is what both dollar
    /// ceilings are checked against, matching the original risk manager's
    /// `total_cost = price * size * (1 + fee_rate)`.
    pub fn validate_trade(
        &self,
        trade_cost: Decimal,
        price: f64,
        size: Decimal,
        fee_rate: f64,
        daily_pnl: Decimal,
        open_positions: u32,
    ) -> Result<(), EngineError> {
        if self.is_halted() {
            let reason = self
                .halt_reason
                .lock()
                .expect("halt reason lock poisoned")
                .clone()
                .unwrap_or_else(|| "unspecified".into());
            return Err(EngineError::Halted(reason));
        }

        let fee_multiplier = Decimal::from_f64_retain(1.0 + fee_rate).unwrap_or(Decimal::ONE);
        let total_cost = trade_cost * fee_multiplier;

        let max_trade = Decimal::from_f64_retain(self.config.max_single_trade_usd).unwrap_or(Decimal::MAX);
        if total_cost > max_trade {
            return Err(EngineError::RiskRejected(format!(
                "trade cost {total_cost} exceeds max single trade {max_trade}"
            )));
        }

        let max_position = Decimal::from_f64_retain(self.config.max_position_usd).unwrap_or(Decimal::MAX);
        if total_cost > max_position {
            return Err(EngineError::RiskRejected(format!(
                "position cost {total_cost} exceeds max position {max_position}"
            )));
        }

        let daily_loss_limit = Decimal::from_f64_retain(self.config.daily_loss_limit_usd).unwrap_or(Decimal::MAX);
        if daily_pnl < -daily_loss_limit {
            self.halt_for_daily_loss(format!(
                "daily pnl {daily_pnl} breached loss limit -{daily_loss_limit}"
            ));
            return Err(EngineError::Halted(format!(
                "daily loss limit breached: {daily_pnl}"
            )));
        }

        if open_positions >= self.config.max_positions {
            return Err(EngineError::RiskRejected(format!(
                "open positions {open_positions} at cap {}",
                self.config.max_positions
            )));
        }

        if !(0.01..=0.99).contains(&price) {
            return Err(EngineError::RiskRejected(format!(
                "price {price} outside sane band [0.01, 0.99]"
            )));
        }

        let size_f64 = size.to_f64().unwrap_or(0.0);
        if !(size_f64 > 0.0 && size_f64 <= 10_000.0) {
            return Err(EngineError::RiskRejected(format!(
                "size {size_f64} outside sane band (0, 10000]"
            )));
        }

        Ok(())
    }

    pub fn order_lifetime(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.order_lifetime_ms)
    }

    pub fn max_orders_per_second(&self) -> u32 {
        self.config.max_orders_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig {
            daily_loss_limit_usd: 20.0,
            max_positions: 1,
            max_single_trade_usd: 50.0,
            max_position_usd: 30.0,
            max_orders_per_second: 50,
            order_lifetime_ms: 60_000,
        })
    }

    #[test]
    fn accepts_a_sane_trade() {
        let rm = manager();
        assert!(rm
            .validate_trade(dec!(10), 0.45, dec!(22.2), 0.0, dec!(0), 0)
            .is_ok());
    }

    #[test]
    fn rejects_trade_above_ceiling() {
        let rm = manager();
        let err = rm.validate_trade(dec!(60), 0.45, dec!(133), 0.0, dec!(0), 0);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_trade_above_position_ceiling_but_under_trade_ceiling() {
        let rm = manager();
        // 35 clears max_single_trade_usd (50) but not max_position_usd (30).
        let err = rm.validate_trade(dec!(35), 0.45, dec!(35), 0.0, dec!(0), 0);
        assert!(err.is_err());
    }

    #[test]
    fn fee_rate_pushes_total_cost_past_the_position_ceiling() {
        let rm = manager();
        // 25 * 1.2 = 30 clears the 30 ceiling exactly; 25 * 1.3 = 32.5 does not.
        assert!(rm.validate_trade(dec!(25), 0.45, dec!(25), 0.2, dec!(0), 0).is_ok());
        assert!(rm.validate_trade(dec!(25), 0.45, dec!(25), 0.3, dec!(0), 0).is_err());
    }

    #[test]
    fn halts_on_daily_loss_breach() {
        let rm = manager();
        let err = rm.validate_trade(dec!(10), 0.45, dec!(22), 0.0, dec!(-25), 0);
        assert!(matches!(err, Err(EngineError::Halted(_))));
        assert!(rm.is_halted());
    }

    #[test]
    fn rejects_when_position_cap_reached() {
        let rm = manager();
        let err = rm.validate_trade(dec!(10), 0.45, dec!(22), 0.0, dec!(0), 1);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_out_of_band_price() {
        let rm = manager();
        let err = rm.validate_trade(dec!(10), 1.5, dec!(22), 0.0, dec!(0), 0);
        assert!(err.is_err());
    }

    #[test]
    fn daily_trade_counter_increments() {
        let rm = manager();
        assert_eq!(rm.daily_trades(), 0);
        rm.record_trade_opened();
        rm.record_trade_opened();
        assert_eq!(rm.daily_trades(), 2);
    }

    #[test]
    fn same_day_rollover_is_a_no_op() {
        let rm = manager();
        rm.halt("manual stop");
        assert!(!rm.roll_day_if_needed());
        assert!(rm.is_halted(), "manual halt must survive a same-day no-op rollover");
        rm.reset_halt();
    }

    #[test]
    fn manual_halt_blocks_everything() {
        let rm = manager();
        rm.halt("manual stop");
        let err = rm.validate_trade(dec!(1), 0.5, dec!(2), 0.0, dec!(0), 0);
        assert!(matches!(err, Err(EngineError::Halted(_))));
        rm.reset_halt();
        assert!(!rm.is_halted());
    }
}
