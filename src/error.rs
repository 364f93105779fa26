use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Nothing here is meant to be fatal except a programmer error — every
/// periodic task in `engine.rs` catches its own `EngineError`s and logs
/// rather than propagating a panic.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient fetch failure: {source_name}: {detail}")]
    TransientFetch { source_name: String, detail: String },

    #[error("malformed market data: {0}")]
    MalformedMarket(String),

    #[error("risk manager rejected trade: {0}")]
    RiskRejected(String),

    #[error("trading halted: {0}")]
    Halted(String),

    #[error("oracle price stale by {age_secs:.1}s (limit {limit_secs:.1}s)")]
    StaleOracle { age_secs: f64, limit_secs: f64 },

    #[error("market {slug} expired {overdue_secs:.1}s ago, past the void window")]
    LateExpiry { slug: String, overdue_secs: f64 },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}
