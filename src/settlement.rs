use crate::models::market::Side;
use crate::models::position::{Position, Trade, TradeStatus, TradeType};
use crate::oracle::composite::CompositePrice;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Past this many seconds beyond a market's close, settlement data is no
/// longer trusted — the position is refunded rather than guessed at.
pub const LATE_VOID_SECS: i64 = 300;

/// Below this spot price the composite is treated as an absurd/garbage
/// reading rather than a real settlement price.
pub const MIN_VALID_SPOT: f64 = 1_000.0;

pub enum SettlementOutcome {
    /// Not enough has happened yet — keep the position open and re-check later.
    Pending,
    /// Resolved against spot vs strike.
    Settled(Trade),
    /// Too far past expiry to trust a spot comparison — refunded.
    Voided(Trade),
}

static NEXT_TRADE_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

fn next_trade_id() -> u64 {
    NEXT_TRADE_ID.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
}

/// Attempt to settle a single open position.
///
/// Gates, in order:
///   1. Hasn't reached its end_time yet -> Pending.
///   2. Freshness gate: the oracle composite must be fresh (within
///      `staleness_limit_secs`) -> otherwise skip the whole sweep for this
///      position (Pending), even if it is also late-void eligible.
///   3. Validity gate: the composite must be a plausible spot price
///      (>= `MIN_VALID_SPOT`) -> otherwise Pending, an absurd reading is
///      never trusted for either settlement or void accounting.
///   4. Late-void rule: more than `LATE_VOID_SECS` past end_time -> Voided (refund).
///   5. Compare spot to the position's recorded strike and settle.
pub fn try_settle(
    position: &Position,
    composite: Option<&CompositePrice>,
    staleness_limit_secs: i64,
) -> SettlementOutcome {
    let now = Utc::now();
    let seconds_past_end = (now - position.end_time).num_seconds();

    if seconds_past_end < 0 {
        return SettlementOutcome::Pending;
    }

    let composite = match composite {
        Some(c) if c.is_fresh(staleness_limit_secs) => c,
        _ => {
            info!(slug = %position.market_slug, "awaiting fresh oracle price before settling");
            return SettlementOutcome::Pending;
        }
    };

    if composite.value < MIN_VALID_SPOT {
        warn!(
            slug = %position.market_slug,
            spot = composite.value,
            "oracle price below sanity floor, deferring settlement"
        );
        return SettlementOutcome::Pending;
    }

    if seconds_past_end > LATE_VOID_SECS {
        warn!(
            slug = %position.market_slug,
            seconds_past_end,
            "settlement window elapsed, voiding position for refund"
        );
        return SettlementOutcome::Voided(Trade {
            id: next_trade_id(),
            market_slug: position.market_slug.clone(),
            question: position.question.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: None,
            amount: position.amount,
            pnl: Decimal::ZERO,
            time: now,
            status: TradeStatus::Void,
            trade_type: TradeType::LateVoid,
        });
    }

    let spot = composite.value;
    let won = match position.side {
        Side::Up => spot > position.strike_price,
        Side::Down => spot < position.strike_price,
    };

    let pnl = if won {
        let entry_price_f = position.entry_price.to_f64().unwrap_or(1.0);
        let shares = if entry_price_f > 0.0 {
            position.amount / position.entry_price
        } else {
            Decimal::ZERO
        };
        shares - position.amount
    } else {
        -position.amount
    };

    info!(
        slug = %position.market_slug,
        won,
        spot,
        strike = position.strike_price,
        pnl = %pnl,
        "position settled"
    );

    SettlementOutcome::Settled(Trade {
        id: next_trade_id(),
        market_slug: position.market_slug.clone(),
        question: position.question.clone(),
        side: position.side,
        entry_price: position.entry_price,
        exit_price: Some(if won { 1.0 } else { 0.0 }),
        amount: position.amount,
        pnl,
        time: now,
        status: if won { TradeStatus::Won } else { TradeStatus::Lost },
        trade_type: TradeType::Standard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: Side, strike: f64, end_offset_secs: i64) -> Position {
        Position {
            market_slug: "btc-updown-15m-1".into(),
            question: "q".into(),
            side,
            entry_price: dec!(0.40),
            amount: dec!(4.0),
            entry_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::seconds(end_offset_secs),
            token_id: "tok".into(),
            strike_price: strike,
        }
    }

    fn fresh_composite(value: f64) -> CompositePrice {
        CompositePrice {
            value,
            last_update: Utc::now(),
            contributing_sources: vec!["binance".into()],
        }
    }

    #[test]
    fn pending_before_end_time() {
        let pos = position(Side::Up, 90_000.0, 60);
        let outcome = try_settle(&pos, Some(&fresh_composite(91_000.0)), 30);
        assert!(matches!(outcome, SettlementOutcome::Pending));
    }

    #[test]
    fn pending_without_fresh_price() {
        let pos = position(Side::Up, 90_000.0, -1);
        let stale = CompositePrice {
            value: 91_000.0,
            last_update: Utc::now() - chrono::Duration::seconds(60),
            contributing_sources: vec!["binance".into()],
        };
        let outcome = try_settle(&pos, Some(&stale), 30);
        assert!(matches!(outcome, SettlementOutcome::Pending));
    }

    #[test]
    fn settles_win_for_up_above_strike() {
        let pos = position(Side::Up, 90_000.0, -1);
        let outcome = try_settle(&pos, Some(&fresh_composite(91_000.0)), 30);
        match outcome {
            SettlementOutcome::Settled(trade) => {
                assert_eq!(trade.status, TradeStatus::Won);
                assert!(trade.pnl > Decimal::ZERO);
            }
            _ => panic!("expected settlement"),
        }
    }

    #[test]
    fn settles_loss_for_up_below_strike() {
        let pos = position(Side::Up, 90_000.0, -1);
        let outcome = try_settle(&pos, Some(&fresh_composite(89_000.0)), 30);
        match outcome {
            SettlementOutcome::Settled(trade) => {
                assert_eq!(trade.status, TradeStatus::Lost);
                assert_eq!(trade.pnl, -pos.amount);
            }
            _ => panic!("expected settlement"),
        }
    }

    #[test]
    fn pending_on_absurd_spot_price() {
        let pos = position(Side::Up, 90_000.0, -1);
        let outcome = try_settle(&pos, Some(&fresh_composite(5.0)), 30);
        assert!(matches!(outcome, SettlementOutcome::Pending));
    }

    #[test]
    fn voids_past_late_window() {
        let pos = position(Side::Up, 90_000.0, -(LATE_VOID_SECS + 10));
        let outcome = try_settle(&pos, Some(&fresh_composite(91_000.0)), 30);
        match outcome {
            SettlementOutcome::Voided(trade) => {
                assert_eq!(trade.status, TradeStatus::Void);
                assert_eq!(trade.pnl, Decimal::ZERO);
            }
            _ => panic!("expected void"),
        }
    }
}
