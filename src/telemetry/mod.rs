pub mod latency;
pub mod pnl;
