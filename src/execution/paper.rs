use crate::models::market::Side;
use crate::models::position::Position;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Mutex;
use tracing::info;

/// Probability a paper-mode limit order gets a simulated fill.
const PAPER_FILL_PROBABILITY: f64 = 0.80;

/// A small linear-congruential generator — deterministic given a seed, no
/// external RNG dependency needed for a single probability draw per tick.
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed ^ 0x9E3779B97F4A7C15 }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Simulated execution for dry-run / paper trading: fills are a stochastic
/// draw rather than a real order on the venue.
pub struct PaperExecutor {
    rng: Mutex<Rng>,
}

impl PaperExecutor {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(Rng::new(seed)) }
    }

    /// Attempt a simulated fill. Returns `None` on the ~20% of draws that
    /// would not have filled against the real book.
    #[allow(clippy::too_many_arguments)]
    pub fn try_fill(
        &self,
        market_slug: &str,
        question: &str,
        side: Side,
        token_id: &str,
        price: f64,
        amount_usd: f64,
        end_time: DateTime<Utc>,
        strike_price: f64,
    ) -> Option<Position> {
        let draw = {
            let mut rng = self.rng.lock().expect("paper rng lock poisoned");
            rng.next_f64()
        };

        if draw > PAPER_FILL_PROBABILITY {
            info!(slug = market_slug, draw, "paper fill simulation rejected");
            return None;
        }

        Some(Position {
            market_slug: market_slug.to_string(),
            question: question.to_string(),
            side,
            entry_price: Decimal::from_f64(price).unwrap_or(Decimal::ZERO),
            amount: Decimal::from_f64(amount_usd).unwrap_or(Decimal::ZERO),
            entry_time: Utc::now(),
            end_time,
            token_id: token_id.to_string(),
            strike_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roughly_matches_target_fill_rate_over_many_draws() {
        let executor = PaperExecutor::new(42);
        let trials = 2_000;
        let mut fills = 0;
        for _ in 0..trials {
            if executor
                .try_fill("slug", "q", Side::Up, "tok", 0.5, 5.0, Utc::now(), 90_000.0)
                .is_some()
            {
                fills += 1;
            }
        }
        let rate = fills as f64 / trials as f64;
        assert!((rate - PAPER_FILL_PROBABILITY).abs() < 0.05);
    }
}
