//! End-to-end pipeline tests for the BTC 15-minute up/down engine.
//!
//! Builds synthetic markets and composite prices, then drives the same
//! components the live engine loop drives: evaluator -> risk gate -> paper
//! fill -> settlement -> portfolio.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use updown_engine::config::{RiskConfig, StrategyConfig};
use updown_engine::evaluator::Evaluator;
use updown_engine::execution::live::risk_check_inputs;
use updown_engine::execution::paper::PaperExecutor;
use updown_engine::models::market::{Market, OutcomePrices, Side, TokenPair};
use updown_engine::models::order::OrderType;
use updown_engine::models::position::Portfolio;
use updown_engine::oracle::composite::CompositePrice;
use updown_engine::oracle::technical::{Trend, TechnicalSnapshot};
use updown_engine::risk::risk_manager::RiskManager;
use updown_engine::settlement::{self, SettlementOutcome};

fn neutral_ta() -> TechnicalSnapshot {
    TechnicalSnapshot { rsi: None, sma: None, trend: Trend::Flat }
}

fn strategy_config() -> StrategyConfig {
    StrategyConfig {
        min_edge_percent: 0.10,
        max_position_usd: 50.0,
        annual_volatility: 0.80,
        snipe_cooldown_seconds: 10,
        mm_spread_width: 0.02,
        mm_base_size_usd: 5.0,
    }
}

fn risk_config() -> RiskConfig {
    RiskConfig {
        daily_loss_limit_usd: 20.0,
        max_positions: 1,
        max_single_trade_usd: 50.0,
        max_position_usd: 100.0,
        max_orders_per_second: 50,
        order_lifetime_ms: 60_000,
    }
}

fn market(strike: f64, up_price: f64, down_price: f64, seconds_remaining: i64) -> Market {
    Market {
        slug: "btc-updown-15m-1770933900".into(),
        condition_id: Some("0xcondition".into()),
        question: "Will BTC be up?".into(),
        description: format!("Will the price of Bitcoin be above ${strike} at close?"),
        strike_price: Some(strike),
        start_time: Utc::now() - ChronoDuration::seconds(900 - seconds_remaining),
        end_time: Utc::now() + ChronoDuration::seconds(seconds_remaining),
        tokens: TokenPair { up: "up-token".into(), down: "down-token".into() },
        outcome_prices: OutcomePrices { up: up_price, down: down_price },
        best_bid: up_price - 0.01,
        best_ask: up_price + 0.01,
        liquidity: 10_000.0,
        accepting_orders: true,
    }
}

fn composite(value: f64) -> CompositePrice {
    CompositePrice {
        value,
        last_update: Utc::now(),
        contributing_sources: vec!["binance".into(), "coinbase".into()],
    }
}

#[tokio::test]
async fn mispriced_market_flows_through_to_a_winning_settlement() {
    let evaluator = Evaluator::new(strategy_config());
    let risk = RiskManager::new(risk_config());
    let paper = PaperExecutor::new(7);
    let mut portfolio = Portfolio::new(dec!(100));

    // Spot has already run well above strike but the book still prices near 0.50.
    let m = market(90_000.0, 0.50, 0.50, 400);
    let spot = composite(93_000.0);

    let balance = 100.0;
    let opportunity = evaluator
        .evaluate(&m, &spot, 0.80, balance, &neutral_ta())
        .await
        .expect("a real edge should surface an opportunity");
    assert_eq!(opportunity.side, Side::Up);

    let (risk_price, risk_fee_rate) = risk_check_inputs(OrderType::FOK, opportunity.market_price);
    let trade_cost = Decimal::from_f64_retain(opportunity.size_usd).unwrap();
    risk.validate_trade(trade_cost, risk_price, trade_cost, risk_fee_rate, dec!(0), 0)
        .expect("a sane sized trade should clear risk checks");

    // The paper executor fills about 80% of the time — retry a few draws
    // rather than pin an exact RNG sequence to the fill outcome.
    let mut position = None;
    for _ in 0..20 {
        if let Some(p) = paper.try_fill(
            &opportunity.market_slug,
            &opportunity.question,
            opportunity.side,
            &opportunity.token_id,
            opportunity.market_price,
            opportunity.size_usd,
            opportunity.end_time,
            opportunity.strike_price,
        ) {
            position = Some(p);
            break;
        }
    }
    let position = position.expect("paper executor should eventually fill at an 80% rate");
    portfolio.balance -= position.amount;

    // Fast-forward past expiry with spot still above strike.
    let mut expired_position = position.clone();
    expired_position.end_time = Utc::now() - ChronoDuration::seconds(5);

    let outcome = settlement::try_settle(&expired_position, Some(&spot), 30);
    match outcome {
        SettlementOutcome::Settled(trade) => {
            assert!(trade.pnl > Decimal::ZERO);
            portfolio.balance += trade.amount + trade.pnl;
            portfolio.pnl_today += trade.pnl;
            portfolio.total_trades += 1;
            portfolio.winning_trades += 1;
        }
        _ => panic!("expected a settled winning trade"),
    }

    assert!(portfolio.balance > dec!(100));
    assert_eq!(portfolio.win_rate(), 1.0);
}

#[tokio::test]
async fn fairly_priced_market_yields_no_opportunity() {
    let evaluator = Evaluator::new(strategy_config());
    let m = market(90_000.0, 0.50, 0.50, 450);
    let spot = composite(90_000.0);

    let opportunity = evaluator.evaluate(&m, &spot, 0.80, 100.0, &neutral_ta()).await;
    assert!(opportunity.is_none());
}

#[tokio::test]
async fn stale_market_past_void_window_refunds_without_pnl() {
    let position = updown_engine::models::position::Position {
        market_slug: "btc-updown-15m-1770933900".into(),
        question: "Will BTC be up?".into(),
        side: Side::Up,
        entry_price: dec!(0.50),
        amount: dec!(5.0),
        entry_time: Utc::now() - ChronoDuration::seconds(1000),
        end_time: Utc::now() - ChronoDuration::seconds(400),
        token_id: "up-token".into(),
        strike_price: 90_000.0,
    };

    let outcome = settlement::try_settle(&position, Some(&composite(95_000.0)), 30);
    match outcome {
        SettlementOutcome::Voided(trade) => {
            assert_eq!(trade.pnl, Decimal::ZERO);
            assert!(trade.exit_price.is_none());
        }
        _ => panic!("expected a void past the late-settlement window"),
    }
}

#[tokio::test]
async fn risk_manager_halts_after_breaching_daily_loss_limit() {
    let risk = RiskManager::new(risk_config());
    let result = risk.validate_trade(dec!(10), 0.5, dec!(20), 0.0, dec!(-25), 0);
    assert!(result.is_err());
    assert!(risk.is_halted());

    // Once halted, even an otherwise-sane trade is rejected.
    let second = risk.validate_trade(dec!(5), 0.5, dec!(10), 0.0, dec!(0), 0);
    assert!(second.is_err());
}
