use crate::models::position::{Portfolio, Trade};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Real-time P&L tracking against the single-position portfolio.
pub struct PnlTracker {
    portfolio: Arc<RwLock<Portfolio>>,
    trade_log: Arc<RwLock<Vec<Trade>>>,
}

impl PnlTracker {
    pub fn new(portfolio: Arc<RwLock<Portfolio>>) -> Self {
        Self::with_trades(portfolio, Vec::new())
    }

    /// Seed the tracker with a trade log restored from persistence.
    pub fn with_trades(portfolio: Arc<RwLock<Portfolio>>, trades: Vec<Trade>) -> Self {
        Self {
            portfolio,
            trade_log: Arc::new(RwLock::new(trades)),
        }
    }

    /// Record a completed, settled trade.
    pub async fn record_trade(&self, trade: Trade) {
        self.trade_log.write().await.push(trade);
    }

    pub async fn trade_count(&self) -> usize {
        self.trade_log.read().await.len()
    }

    pub async fn recent_trades(&self, n: usize) -> Vec<Trade> {
        let log = self.trade_log.read().await;
        log.iter().rev().take(n).cloned().collect()
    }

    pub async fn log_summary(&self, open_exposure: Decimal) {
        let portfolio = self.portfolio.read().await;
        info!(
            balance = %portfolio.balance,
            pnl_today = %portfolio.pnl_today,
            total_pnl = %portfolio.total_pnl(open_exposure),
            total_trades = portfolio.total_trades,
            win_rate_pct = portfolio.win_rate() * 100.0,
            "pnl summary"
        );
    }
}
