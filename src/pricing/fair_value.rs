use statrs::distribution::{ContinuousCDF, Normal};

const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;
const MIN_SIGMA_T: f64 = 0.0001;
const PROB_FLOOR: f64 = 0.01;
const PROB_CEIL: f64 = 0.99;

/// Black-Scholes-style fair probability that spot finishes above `strike`
/// by expiry, given `remaining_seconds` and an annualized volatility.
///
/// `d = ln(S/K) / sigma_T`, probability = `Φ(d)`, clamped to `[0.01, 0.99]`
/// since a market never fairly prices a true certainty.
pub fn fair_probability_up(
    spot: f64,
    strike: f64,
    remaining_seconds: i64,
    annual_volatility: f64,
) -> f64 {
    if spot <= 0.0 || strike <= 0.0 {
        return 0.5;
    }

    let t = (remaining_seconds.max(0) as f64) / SECONDS_PER_YEAR;
    let sigma_t = annual_volatility * t.sqrt();

    if sigma_t < MIN_SIGMA_T {
        return if spot > strike { 1.0 } else { 0.0 };
    }

    let d = (spot / strike).ln() / sigma_t;
    let normal = Normal::new(0.0, 1.0).expect("standard normal is always valid");
    let probability = normal.cdf(d);

    probability.clamp(PROB_FLOOR, PROB_CEIL)
}

pub fn fair_probability_down(
    spot: f64,
    strike: f64,
    remaining_seconds: i64,
    annual_volatility: f64,
) -> f64 {
    1.0 - fair_probability_up(spot, strike, remaining_seconds, annual_volatility)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_the_money_near_expiry_collapses_to_spot_position() {
        let prob = fair_probability_up(90_000.0, 90_000.0, 0, 0.80);
        // sigma_t == 0, spot == strike -> spot > strike is false -> 0.0
        assert_eq!(prob, 0.0);
    }

    #[test]
    fn deep_in_the_money_clamped_below_certainty() {
        let prob = fair_probability_up(95_000.0, 90_000.0, 1, 0.80);
        assert!(prob <= PROB_CEIL);
    }

    #[test]
    fn deep_out_of_the_money_clamped_above_zero() {
        let prob = fair_probability_up(85_000.0, 90_000.0, 1, 0.80);
        assert!(prob >= PROB_FLOOR);
    }

    #[test]
    fn at_the_money_mid_interval_is_near_half() {
        let prob = fair_probability_up(90_000.0, 90_000.0, 450, 0.80);
        assert!((prob - 0.5).abs() < 0.01);
    }

    #[test]
    fn up_and_down_sum_to_one() {
        let up = fair_probability_up(91_000.0, 90_000.0, 300, 0.80);
        let down = fair_probability_down(91_000.0, 90_000.0, 300, 0.80);
        assert!((up + down - 1.0).abs() < 1e-9);
    }
}
