use crate::config::Config;
use crate::discovery::market_discovery::MarketDiscovery;
use crate::evaluator::Evaluator;
use crate::events::{BotStatus, EngineEvent, EventBus};
use crate::execution::clob_client::ClobClient;
use crate::execution::live::{risk_check_inputs, LiveExecutor};
use crate::execution::order_builder::OrderBuilder;
use crate::execution::paper::PaperExecutor;
use crate::execution::rate_limiter::TokenBucketRateLimiter;
use crate::models::market::Market;
use crate::models::order::OrderType;
use crate::models::position::{Portfolio, Position};
use crate::oracle::composite::PriceOracle;
use crate::oracle::technical;
use crate::oracle::volatility::VolatilityEstimator;
use crate::persistence::{PersistedState, Store};
use crate::risk::risk_manager::RiskManager;
use crate::settlement::{self, SettlementOutcome};
use crate::telemetry::latency::LatencyTracker;
use crate::telemetry::pnl::PnlTracker;
use rust_decimal::prelude::ToPrimitive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// How often the composite oracle is refreshed.
const ORACLE_TICK: Duration = Duration::from_secs(1);
/// How often market discovery re-polls the venue.
const DISCOVERY_TICK: Duration = Duration::from_secs(3);
/// How often the opportunity evaluator re-checks the current market.
const EVALUATE_TICK: Duration = Duration::from_secs(2);
/// How often open positions are swept for settlement.
const SETTLEMENT_TICK: Duration = Duration::from_secs(5);

/// The single-position, single-market trading engine.
///
/// Ties together the composite oracle, market discovery, the sequential
/// opportunity evaluator, risk gating, and either paper or live execution
/// depending on `Config::is_dry_run`.
pub struct Engine {
    config: Config,
    oracle: PriceOracle,
    discovery: MarketDiscovery,
    evaluator: Evaluator,
    volatility: VolatilityEstimator,
    risk: RiskManager,
    rate_limiter: TokenBucketRateLimiter,
    clob_client: Option<ClobClient>,
    order_builder: Option<OrderBuilder>,
    paper: PaperExecutor,
    portfolio: Arc<RwLock<Portfolio>>,
    position: Arc<RwLock<Option<Position>>>,
    /// All currently tradeable candidates, sorted by `end_time` ascending.
    /// `evaluate_tick` walks this in order and stops at the first
    /// qualifying opportunity.
    current_markets: Arc<RwLock<Vec<Market>>>,
    events: EventBus,
    pnl: PnlTracker,
    latency: LatencyTracker,
    store: Store,
    halted_notified: AtomicBool,
}

impl Engine {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let starting_capital = rust_decimal::Decimal::from_f64_retain(Config::starting_capital())
            .unwrap_or(rust_decimal::Decimal::ONE);

        let store = Store::new("state/engine_state.json");
        let persisted = store.load();
        let (portfolio, restored_position, restored_trades) = match persisted {
            Some(state) => (
                Arc::new(RwLock::new(state.portfolio)),
                state.position,
                // Saved newest-first (see `persist()`); un-reverse back to the
                // tracker's oldest-first append order so the next persist
                // reproduces the same file (round-trip identity).
                state.trade_log.into_iter().rev().collect::<Vec<_>>(),
            ),
            None => (Arc::new(RwLock::new(Portfolio::new(starting_capital))), None, Vec::new()),
        };
        if restored_position.is_some() {
            info!("restored an open position from persisted state");
        }

        let (clob_client, order_builder) = if config.is_dry_run() {
            (None, None)
        } else {
            let client = ClobClient::new(config.polymarket.clone());
            let builder = OrderBuilder::new(
                config.polymarket.chain_id,
                config.polymarket.private_key.clone(),
                config.polymarket.funder_address.clone(),
                config.polymarket.signature_type,
            );
            (Some(client), Some(builder))
        };

        let rate_limiter = TokenBucketRateLimiter::new(
            config.risk.max_orders_per_second as f64,
            config.risk.max_orders_per_second as f64,
        );

        Ok(Self {
            discovery: MarketDiscovery::new(&config.polymarket, &config.oracle),
            oracle: PriceOracle::new(config.oracle.clone()),
            evaluator: Evaluator::new(config.strategy.clone()),
            volatility: VolatilityEstimator::new(&config.oracle, config.strategy.annual_volatility),
            risk: RiskManager::new(config.risk.clone()),
            rate_limiter,
            clob_client,
            order_builder,
            paper: PaperExecutor::new(0xC0FFEE),
            pnl: PnlTracker::with_trades(portfolio.clone(), restored_trades),
            portfolio,
            position: Arc::new(RwLock::new(restored_position)),
            current_markets: Arc::new(RwLock::new(Vec::new())),
            events: EventBus::default(),
            latency: LatencyTracker::new(256),
            store,
            halted_notified: AtomicBool::new(false),
            config,
        })
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Run the engine until ctrl-c. Four independent periodic tasks share
    /// state behind `Arc`s — no single loop blocks another.
    pub async fn run(self: Arc<Self>) {
        self.events.publish(EngineEvent::BotStatus(BotStatus::Starting));
        info!("engine starting");

        if let Some(client) = &self.clob_client {
            if let Err(e) = client.init_auth().await {
                warn!(error = %e, "clob auth init failed, continuing with L1 fallback");
            }
        }

        self.events.publish(EngineEvent::BotStatus(BotStatus::Running));

        let oracle_engine = self.clone();
        let oracle_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ORACLE_TICK);
            loop {
                interval.tick().await;
                oracle_engine.oracle_tick().await;
            }
        });

        let discovery_engine = self.clone();
        let discovery_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(DISCOVERY_TICK);
            loop {
                interval.tick().await;
                discovery_engine.discovery_tick().await;
            }
        });

        let evaluate_engine = self.clone();
        let evaluate_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVALUATE_TICK);
            loop {
                interval.tick().await;
                evaluate_engine.evaluate_tick().await;
            }
        });

        let settlement_engine = self.clone();
        let settlement_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SETTLEMENT_TICK);
            loop {
                interval.tick().await;
                settlement_engine.settlement_tick().await;
            }
        });

        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");

        oracle_task.abort();
        discovery_task.abort();
        evaluate_task.abort();
        settlement_task.abort();

        self.events.publish(EngineEvent::BotStatus(BotStatus::Stopped));
        self.persist().await;
    }

    async fn oracle_tick(&self) {
        let _timer = self.latency.start_timer("oracle_tick");
        self.oracle.tick().await;
        if let Some(price) = self.oracle.current().await {
            self.events.publish(EngineEvent::PriceUpdate(price));
        }
    }

    async fn discovery_tick(&self) {
        let _timer = self.latency.start_timer("discovery_tick");
        match self.discovery.discover_current().await {
            Ok(markets) => {
                self.events.publish(EngineEvent::MarketsUpdate(markets.clone()));
                *self.current_markets.write().await = markets;
            }
            Err(e) => {
                warn!(error = %e, "market discovery failed this tick");
            }
        }
    }

    async fn evaluate_tick(&self) {
        if self.risk.roll_day_if_needed() {
            self.portfolio.write().await.pnl_today = rust_decimal::Decimal::ZERO;
            info!("daily risk counters rolled over");
        }

        if self.risk.is_halted() {
            if !self.halted_notified.swap(true, Ordering::SeqCst) {
                self.events.publish(EngineEvent::BotStatus(BotStatus::Halted));
            }
            return;
        }
        if self.halted_notified.swap(false, Ordering::SeqCst) {
            self.events.publish(EngineEvent::BotStatus(BotStatus::Running));
        }

        // Single-position mode: never evaluate while a position is open.
        if self.position.read().await.is_some() {
            return;
        }

        let guard = match self.evaluator.try_enter() {
            Some(g) => g,
            None => return,
        };

        let candidates = self.current_markets.read().await.clone();
        if candidates.is_empty() {
            return;
        }

        let composite = match self.oracle.current().await {
            Some(c) => c,
            None => return,
        };

        if !composite.is_fresh(self.config.oracle.staleness_limit_secs) {
            return;
        }

        let history = self.oracle.history_snapshot().await;
        let annual_vol = self.volatility.current().await;
        let ta_snapshot = technical::snapshot(&history);

        let balance = self.portfolio.read().await.balance.to_f64().unwrap_or(0.0);

        // Candidates are sorted by end_time ascending; take the first one
        // that clears every sequential gate rather than only ever looking
        // at the soonest-expiring market.
        let mut opportunity = None;
        for market in &candidates {
            if let Some(o) = self
                .evaluator
                .evaluate(market, &composite, annual_vol, balance, &ta_snapshot)
                .await
            {
                opportunity = Some(o);
                break;
            }
        }
        let opportunity = match opportunity {
            Some(o) => o,
            None => return,
        };

        // Every fill this engine places is a market (FOK) order, so risk
        // validates against the conservative pre-trade estimate rather than
        // the real quoted price, which isn't known to have held until the
        // venue confirms the fill.
        let (risk_price, risk_fee_rate) = risk_check_inputs(OrderType::FOK, opportunity.market_price);
        let trade_cost = rust_decimal::Decimal::from_f64_retain(opportunity.size_usd).unwrap_or_default();
        let daily_pnl = self.portfolio.read().await.pnl_today;
        if let Err(e) = self
            .risk
            .validate_trade(trade_cost, risk_price, trade_cost, risk_fee_rate, daily_pnl, 0)
        {
            info!(error = %e, "risk manager rejected opportunity");
            return;
        }

        self.rate_limiter.acquire(1.0).await;

        let position = if self.config.is_dry_run() {
            self.paper.try_fill(
                &opportunity.market_slug,
                &opportunity.question,
                opportunity.side,
                &opportunity.token_id,
                opportunity.market_price,
                opportunity.size_usd,
                opportunity.end_time,
                opportunity.strike_price,
            )
        } else {
            match (&self.clob_client, &self.order_builder) {
                (Some(client), Some(builder)) => {
                    let executor = LiveExecutor::new(client, builder);
                    match executor
                        .buy(
                            &opportunity.market_slug,
                            &opportunity.question,
                            &opportunity.token_id,
                            opportunity.side,
                            opportunity.size_usd,
                            opportunity.market_price,
                            opportunity.end_time,
                            opportunity.strike_price,
                        )
                        .await
                    {
                        Ok(pos) => Some(pos),
                        Err(e) => {
                            error!(error = %e, "live execution failed");
                            None
                        }
                    }
                }
                _ => None,
            }
        };

        if let Some(pos) = position {
            info!(slug = %pos.market_slug, side = %pos.side, amount = %pos.amount, "position opened");
            {
                let mut balance_guard = self.portfolio.write().await;
                balance_guard.balance -= pos.amount;
            }
            *self.position.write().await = Some(pos);
            self.evaluator.record_entry().await;
            self.risk.record_trade_opened();
            self.publish_portfolio().await;
            self.persist().await;
        }

        drop(guard);
    }

    async fn settlement_tick(&self) {
        let maybe_position = self.position.read().await.clone();
        let position = match maybe_position {
            Some(p) => p,
            None => return,
        };

        let composite = self.oracle.current().await;
        let outcome = settlement::try_settle(
            &position,
            composite.as_ref(),
            self.config.oracle.staleness_limit_secs,
        );

        match outcome {
            SettlementOutcome::Pending => {}
            SettlementOutcome::Settled(trade) | SettlementOutcome::Voided(trade) => {
                {
                    let mut portfolio = self.portfolio.write().await;
                    portfolio.balance += trade.amount + trade.pnl;
                    portfolio.pnl_today += trade.pnl;
                    portfolio.total_trades += 1;
                    if trade.pnl > rust_decimal::Decimal::ZERO {
                        portfolio.winning_trades += 1;
                    }
                }
                *self.position.write().await = None;
                self.pnl.record_trade(trade.clone()).await;
                self.events.publish(EngineEvent::NewTrade(trade));
                self.publish_portfolio().await;
                self.persist().await;
            }
        }
    }

    async fn publish_portfolio(&self) {
        let portfolio = self.portfolio.read().await.clone();
        self.events.publish(EngineEvent::PortfolioUpdate(portfolio));
    }

    async fn persist(&self) {
        let portfolio = self.portfolio.read().await.clone();
        let position = self.position.read().await.clone();
        let trade_log = self.pnl.recent_trades(usize::MAX).await;
        let state = PersistedState { portfolio, position, trade_log };
        if let Err(e) = self.store.save(&state) {
            error!(error = %e, "failed to persist engine state");
        }
    }
}
