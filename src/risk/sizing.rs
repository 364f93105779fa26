/// Position sizing.
///
/// The trade size is the literal confidence-scaled formula
/// `balance * (0.05 + 0.3 * |0.5 - entry_price|)` — more capital at risk the
/// further the quote sits from a coin flip — further clamped by a
/// capital-tier fraction cap and the configured per-trade ceiling.
pub struct Sizing;

impl Sizing {
    /// Capital-tier-based maximum position size as a fraction of capital.
    pub fn max_position_fraction(capital: f64) -> f64 {
        match capital {
            c if c < 50.0 => 1.00,
            c if c < 500.0 => 0.50,
            c if c < 5_000.0 => 0.25,
            c if c < 50_000.0 => 0.10,
            _ => 0.10,
        }
    }

    /// Confidence-scaled base size before any clamps: `balance * (0.05 + 0.3 * |0.5 - p|)`.
    pub fn confidence_scaled_size(balance: f64, entry_price: f64) -> f64 {
        balance * (0.05 + 0.3 * (0.5 - entry_price).abs())
    }

    /// Final trade size in USD: confidence-scaled, then clamped by the
    /// capital-tier fraction and the configured hard ceiling.
    pub fn trade_size_usd(balance: f64, entry_price: f64, max_position_usd: f64) -> f64 {
        let base = Self::confidence_scaled_size(balance, entry_price);
        let tier_cap = balance * Self::max_position_fraction(balance);
        base.min(tier_cap).min(max_position_usd).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capital_tier_matches_bands() {
        assert_eq!(Sizing::max_position_fraction(10.0), 1.00);
        assert_eq!(Sizing::max_position_fraction(100.0), 0.50);
        assert_eq!(Sizing::max_position_fraction(1000.0), 0.25);
        assert_eq!(Sizing::max_position_fraction(10000.0), 0.10);
    }

    #[test]
    fn confidence_scaling_grows_with_distance_from_half() {
        let at_half = Sizing::confidence_scaled_size(100.0, 0.50);
        let far_from_half = Sizing::confidence_scaled_size(100.0, 0.90);
        assert!(far_from_half > at_half);
    }

    #[test]
    fn trade_size_respects_hard_ceiling() {
        let size = Sizing::trade_size_usd(10_000.0, 0.90, 50.0);
        assert!(size <= 50.0);
    }

    #[test]
    fn trade_size_respects_tier_cap_for_small_balance() {
        // At $5 balance tier cap is 100% of balance, so size should never
        // exceed balance itself even before the hard ceiling applies.
        let size = Sizing::trade_size_usd(5.0, 0.90, 50.0);
        assert!(size <= 5.0);
    }
}
