use crate::discovery::market_discovery::MarketDiscovery;
use crate::error::EngineError;
use crate::models::position::{Portfolio, Position, Trade};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Engine snapshot: balance/pnl counters, the single open position (if
/// any), and the immutable trade log. Tolerant of missing `position` on
/// load (older snapshots, or a clean shutdown with nothing open) via
/// `#[serde(default)]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub portfolio: Portfolio,
    #[serde(default)]
    pub position: Option<Position>,
    pub trade_log: Vec<Trade>,
}

/// Durable engine state on disk, written atomically (temp file + rename) so
/// a crash mid-write never leaves a half-written file behind.
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the persisted snapshot section by section so one corrupt or
    /// missing field costs only that field (or, for `position`/trade-log
    /// entries, only that record) rather than the whole snapshot. Only a
    /// syntactically invalid file or a missing/malformed `portfolio` section
    /// fails the load entirely — balance state can't be safely guessed.
    pub fn load(&self) -> Option<PersistedState> {
        let data = std::fs::read_to_string(&self.path).ok()?;

        let value: serde_json::Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "persisted state is not valid JSON, starting fresh");
                return None;
            }
        };

        let portfolio: Portfolio = match value.get("portfolio").cloned() {
            Some(v) => match serde_json::from_value(v) {
                Ok(p) => p,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "persisted portfolio malformed, starting fresh");
                    return None;
                }
            },
            None => {
                warn!(path = %self.path.display(), "persisted state missing portfolio section, starting fresh");
                return None;
            }
        };

        let position = value
            .get("position")
            .filter(|v| !v.is_null())
            .and_then(|v| match serde_json::from_value::<Position>(v.clone()) {
                Ok(mut p) => {
                    if p.strike_price <= 0.0 {
                        if let Some(k) = MarketDiscovery::parse_strike_from_text(&p.question) {
                            info!(market_slug = %p.market_slug, strike = k, "backfilled strike price from question text");
                            p.strike_price = k;
                        }
                    }
                    Some(p)
                }
                Err(e) => {
                    warn!(error = %e, "persisted open position malformed, dropping it");
                    None
                }
            });

        let trade_log = value
            .get("trade_log")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| match serde_json::from_value::<Trade>(entry.clone()) {
                        Ok(t) => Some(t),
                        Err(e) => {
                            warn!(error = %e, "dropping malformed trade-log entry");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        info!(path = %self.path.display(), "loaded persisted state");
        Some(PersistedState { portfolio, position, trade_log })
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
            }
        }

        let tmp_path = tmp_path_for(&self.path);

        std::fs::write(&tmp_path, json)
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;

        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;

        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("updown-engine-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let store = Store::new(&path);
        let state = PersistedState {
            portfolio: Portfolio::new(dec!(5)),
            position: None,
            trade_log: Vec::new(),
        };
        store.save(&state).unwrap();

        let loaded = store.load().expect("state should load back");
        assert_eq!(loaded.portfolio.balance, dec!(5));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let store = Store::new("/tmp/updown-engine-does-not-exist.json");
        assert!(store.load().is_none());
    }

    #[test]
    fn tolerates_a_position_missing_strike_price_by_backfilling_from_the_question() {
        let dir = std::env::temp_dir().join(format!("updown-engine-test-backfill-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let raw = serde_json::json!({
            "portfolio": { "balance": "5", "initial_balance": "5", "pnl_today": "0", "total_trades": 0, "winning_trades": 0 },
            "position": {
                "market_slug": "btc-updown-15m-1",
                "question": "Will the price of Bitcoin be above $90,250 at close?",
                "side": "up",
                "entry_price": "0.5",
                "amount": "5",
                "entry_time": "2026-01-01T00:00:00Z",
                "end_time": "2026-01-01T00:15:00Z",
                "token_id": "tok"
                // strike_price omitted entirely
            },
            "trade_log": []
        });
        std::fs::write(&path, raw.to_string()).unwrap();

        let store = Store::new(&path);
        let loaded = store.load().expect("a missing strike_price alone must not discard the snapshot");
        let position = loaded.position.expect("position section should still parse");
        assert_eq!(position.strike_price, 90_250.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drops_only_the_malformed_trade_log_entry() {
        let dir = std::env::temp_dir().join(format!("updown-engine-test-trades-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let raw = serde_json::json!({
            "portfolio": { "balance": "5", "initial_balance": "5", "pnl_today": "0", "total_trades": 1, "winning_trades": 1 },
            "position": null,
            "trade_log": [
                { "not": "a trade" },
                {
                    "id": 1,
                    "market_slug": "btc-updown-15m-1",
                    "question": "q",
                    "side": "up",
                    "entry_price": "0.5",
                    "exit_price": 1.0,
                    "amount": "5",
                    "pnl": "5",
                    "time": "2026-01-01T00:15:00Z",
                    "status": "won",
                    "trade_type": "Standard"
                }
            ]
        });
        std::fs::write(&path, raw.to_string()).unwrap();

        let store = Store::new(&path);
        let loaded = store.load().expect("a malformed trade-log entry must not discard the snapshot");
        assert_eq!(loaded.trade_log.len(), 1);
        assert_eq!(loaded.trade_log[0].id, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
