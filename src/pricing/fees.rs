/// Taker fee cap, expressed as a fraction (315 bps).
pub const MAX_FEE: f64 = 0.0315;

/// Parabolic taker fee: peaks at `MAX_FEE` when the quoted price is 0.50
/// (maximum uncertainty) and tapers to zero at the extremes (0 or 1), where
/// a binary outcome is effectively already decided.
///
/// `fee_rate = MAX_FEE * 4 * p * (1 - p)`
pub fn taker_fee_rate(price: f64) -> f64 {
    let p = price.clamp(0.0, 1.0);
    MAX_FEE * 4.0 * p * (1.0 - p)
}

/// Fee charged in USD on a trade of `trade_usd` executed at `price`.
pub fn taker_fee_amount(trade_usd: f64, price: f64) -> f64 {
    trade_usd * taker_fee_rate(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peaks_at_half() {
        let rate = taker_fee_rate(0.5);
        assert!((rate - MAX_FEE).abs() < 1e-9);
    }

    #[test]
    fn tapers_to_zero_at_extremes() {
        assert!(taker_fee_rate(0.0) < 1e-9);
        assert!(taker_fee_rate(1.0) < 1e-9);
    }

    #[test]
    fn symmetric_around_half() {
        let a = taker_fee_rate(0.3);
        let b = taker_fee_rate(0.7);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn amount_scales_with_notional() {
        let amount = taker_fee_amount(100.0, 0.5);
        assert!((amount - MAX_FEE * 100.0).abs() < 1e-9);
    }
}
