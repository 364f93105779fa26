use crate::config::StrategyConfig;
use crate::models::market::{Market, Side};
use crate::oracle::composite::CompositePrice;
use crate::oracle::technical::{TechnicalSnapshot, Trend};
use crate::pricing::{fair_value, fees};
use crate::risk::sizing::Sizing;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// Markets below this liquidity are too thin to trust a quote from.
const MIN_LIQUIDITY_USD: f64 = 1000.0;
/// Reject a quote whose bid/ask spread is wider than this.
const MAX_SPREAD: f64 = 0.05;
/// Only trade inside this window of remaining time: more than 1 minute out
/// (so a fill isn't immediately racing expiry) and no more than 12 minutes
/// out (so the fair-value model isn't extrapolating too far).
const MIN_TIME_TO_EXPIRY_SECS: i64 = 60;
const MAX_TIME_TO_EXPIRY_SECS: i64 = 12 * 60;
/// Skip markets priced too close to a coin flip to be worth the fee/edge math.
const CONFIDENCE_BAND_LOW: f64 = 0.40;
const CONFIDENCE_BAND_HIGH: f64 = 0.60;
/// RSI overbought/oversold thresholds used by the TA admission filter.
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct Opportunity {
    pub market_slug: String,
    pub question: String,
    pub token_id: String,
    pub side: Side,
    pub fair_probability: f64,
    pub market_price: f64,
    pub net_edge: f64,
    pub size_usd: f64,
    pub strike_price: f64,
    pub end_time: DateTime<Utc>,
}

/// Sequential-gate opportunity evaluator.
///
/// Single-position mode: `lock` is held across the evaluate -> execute
/// round trip by the engine so two overlapping ticks never both decide to
/// enter a trade for the same slot.
pub struct Evaluator {
    config: StrategyConfig,
    lock: Mutex<()>,
    last_entry_at: Mutex<Option<DateTime<Utc>>>,
}

impl Evaluator {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
            last_entry_at: Mutex::new(None),
        }
    }

    /// Attempt to acquire the evaluate-execute gate without blocking. Single
    /// position mode: if a cycle is already in flight, skip this tick.
    pub fn try_enter(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.lock.try_lock().ok()
    }

    pub async fn record_entry(&self) {
        *self.last_entry_at.lock().await = Some(Utc::now());
    }

    async fn cooldown_elapsed(&self) -> bool {
        match *self.last_entry_at.lock().await {
            None => true,
            Some(last) => {
                let elapsed = (Utc::now() - last).num_seconds();
                elapsed >= self.config.snipe_cooldown_seconds as i64
            }
        }
    }

    /// Walk the sequential gates and return the best opportunity, if any.
    pub async fn evaluate(
        &self,
        market: &Market,
        composite: &CompositePrice,
        annual_volatility: f64,
        balance: f64,
        ta: &TechnicalSnapshot,
    ) -> Option<Opportunity> {
        if !market.accepting_orders {
            debug!(slug = %market.slug, "gate: market not accepting orders");
            return None;
        }

        if !market.is_quote_valid() {
            debug!(slug = %market.slug, "gate: outcome prices out of band");
            return None;
        }

        if market.liquidity < MIN_LIQUIDITY_USD {
            debug!(slug = %market.slug, liquidity = market.liquidity, "gate: liquidity below floor");
            return None;
        }

        let spread = market.spread();
        if spread > MAX_SPREAD {
            debug!(slug = %market.slug, spread, "gate: spread too wide");
            return None;
        }

        let remaining = market.seconds_remaining();
        if remaining <= MIN_TIME_TO_EXPIRY_SECS || remaining > MAX_TIME_TO_EXPIRY_SECS {
            debug!(slug = %market.slug, remaining, "gate: outside tradeable time-to-expiry window");
            return None;
        }

        let strike = match market.strike_price {
            Some(k) if k > 0.0 => k,
            _ => {
                debug!(slug = %market.slug, "gate: strike price unresolved");
                return None;
            }
        };

        if !self.cooldown_elapsed().await {
            debug!(slug = %market.slug, "gate: snipe cooldown active");
            return None;
        }

        let fair_up = fair_value::fair_probability_up(composite.value, strike, remaining, annual_volatility);
        let fair_down = 1.0 - fair_up;

        if fair_up > CONFIDENCE_BAND_LOW && fair_up < CONFIDENCE_BAND_HIGH {
            debug!(slug = %market.slug, fair_up, "gate: too close to a coin flip");
            return None;
        }

        let edge_up = fair_up - market.outcome_prices.up;
        let edge_down = fair_down - market.outcome_prices.down;

        let (side, fair_probability, market_price, raw_edge) = if edge_up >= edge_down {
            (Side::Up, fair_up, market.outcome_prices.up, edge_up)
        } else {
            (Side::Down, fair_down, market.outcome_prices.down, edge_down)
        };

        let ta_disallows = match side {
            Side::Up => ta.trend == Trend::Down || ta.rsi.is_some_and(|r| r > RSI_OVERBOUGHT),
            Side::Down => ta.trend == Trend::Up || ta.rsi.is_some_and(|r| r < RSI_OVERSOLD),
        };
        if ta_disallows {
            debug!(slug = %market.slug, side = ?side, trend = ?ta.trend, rsi = ?ta.rsi, "gate: TA filter disallows side");
            return None;
        }

        // Gate on the raw probability edge, not the fee-adjusted one.
        // Fees are still computed and reported on the opportunity for
        // downstream sizing/telemetry, but they don't move this gate.
        if raw_edge < self.config.min_edge_percent {
            debug!(
                slug = %market.slug,
                raw_edge,
                min_required = self.config.min_edge_percent,
                "gate: edge below threshold"
            );
            return None;
        }

        let fee_rate = fees::taker_fee_rate(market_price);
        let net_edge = raw_edge - fee_rate;

        let size_usd = Sizing::trade_size_usd(balance, market_price, self.config.max_position_usd);
        if size_usd <= 0.0 {
            debug!(slug = %market.slug, "gate: sized to zero");
            return None;
        }

        let token_id = market.tokens.token_for(side).to_string();

        Some(Opportunity {
            market_slug: market.slug.clone(),
            question: market.question.clone(),
            token_id,
            side,
            fair_probability,
            market_price,
            net_edge,
            size_usd,
            strike_price: strike,
            end_time: market.end_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{OutcomePrices, TokenPair};

    fn config() -> StrategyConfig {
        StrategyConfig {
            min_edge_percent: 0.10,
            max_position_usd: 50.0,
            annual_volatility: 0.80,
            snipe_cooldown_seconds: 10,
            mm_spread_width: 0.02,
            mm_base_size_usd: 5.0,
        }
    }

    fn market(strike: f64, up_price: f64, down_price: f64) -> Market {
        Market {
            slug: "btc-updown-15m-1".into(),
            condition_id: None,
            question: "q".into(),
            description: "d".into(),
            strike_price: Some(strike),
            start_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::seconds(600),
            tokens: TokenPair { up: "up-tok".into(), down: "down-tok".into() },
            outcome_prices: OutcomePrices { up: up_price, down: down_price },
            best_bid: up_price - 0.01,
            best_ask: up_price + 0.01,
            liquidity: 5_000.0,
            accepting_orders: true,
        }
    }

    fn composite(value: f64) -> CompositePrice {
        CompositePrice {
            value,
            last_update: Utc::now(),
            contributing_sources: vec!["binance".into()],
        }
    }

    fn neutral_ta() -> TechnicalSnapshot {
        TechnicalSnapshot { rsi: None, sma: None, trend: Trend::Flat }
    }

    #[tokio::test]
    async fn finds_opportunity_when_mispriced() {
        let evaluator = Evaluator::new(config());
        // Spot well above strike, but market still pricing it near a coin flip.
        let m = market(90_000.0, 0.50, 0.50);
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_some());
        assert_eq!(opp.unwrap().side, Side::Up);
    }

    #[tokio::test]
    async fn rejects_thin_liquidity() {
        let evaluator = Evaluator::new(config());
        let mut m = market(90_000.0, 0.50, 0.50);
        m.liquidity = 100.0;
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn rejects_when_not_accepting_orders() {
        let evaluator = Evaluator::new(config());
        let mut m = market(90_000.0, 0.50, 0.50);
        m.accepting_orders = false;
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn rejects_when_fairly_priced() {
        let evaluator = Evaluator::new(config());
        // Spot right at strike with mid interval remaining -> fair ~0.5, matches market.
        let m = market(90_000.0, 0.50, 0.50);
        let opp = evaluator
            .evaluate(&m, &composite(90_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn cooldown_blocks_rapid_reentry() {
        let evaluator = Evaluator::new(config());
        evaluator.record_entry().await;
        let m = market(90_000.0, 0.50, 0.50);
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn rejects_wide_spread() {
        let evaluator = Evaluator::new(config());
        let mut m = market(90_000.0, 0.50, 0.50);
        m.best_bid = 0.40;
        m.best_ask = 0.60;
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn rejects_outside_time_window() {
        let evaluator = Evaluator::new(config());
        // Less than a minute to expiry.
        let mut m = market(90_000.0, 0.50, 0.50);
        m.end_time = Utc::now() + chrono::Duration::seconds(30);
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());

        // More than 12 minutes to expiry.
        let mut m = market(90_000.0, 0.50, 0.50);
        m.end_time = Utc::now() + chrono::Duration::seconds(13 * 60);
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn confidence_gate_skips_near_coin_flip() {
        let evaluator = Evaluator::new(config());
        // Spot barely above strike -> fair_up lands inside the [0.40, 0.60] band.
        let m = market(90_000.0, 0.30, 0.70);
        let opp = evaluator
            .evaluate(&m, &composite(90_050.0), 0.80, 100.0, &neutral_ta())
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn ta_filter_blocks_up_side_on_downtrend() {
        let evaluator = Evaluator::new(config());
        let m = market(90_000.0, 0.50, 0.50);
        let ta = TechnicalSnapshot { rsi: Some(50.0), sma: Some(92_000.0), trend: Trend::Down };
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &ta)
            .await;
        assert!(opp.is_none());
    }

    #[tokio::test]
    async fn ta_filter_blocks_up_side_on_overbought_rsi() {
        let evaluator = Evaluator::new(config());
        let m = market(90_000.0, 0.50, 0.50);
        let ta = TechnicalSnapshot { rsi: Some(75.0), sma: Some(91_000.0), trend: Trend::Flat };
        let opp = evaluator
            .evaluate(&m, &composite(92_000.0), 0.80, 100.0, &ta)
            .await;
        assert!(opp.is_none());
    }
}
