//! Per-round parameter calculators.
//!
//! Pure functions; the scheduler feeds them the external observations
//! (fee rate, exchange rate, last InputRegistration duration) and stores
//! the results in the next round's [`crate::round::RoundParams`].

use std::time::Duration;

use bitcoin::Amount;

/// Size of a P2WPKH input in witness bytes.
pub const P2WPKH_INPUT_SIZE: u64 = 41;
/// Size of a P2PKH input, used as the non-witness weight bound.
pub const P2PKH_INPUT_SIZE: u64 = 148;
/// Size of one transaction output.
pub const OUTPUT_SIZE: u64 = 33;

/// Virtual size charged per registered input:
/// `ceil((3 × P2WPKH + P2PKH) / 4)` = 68 vB.
pub fn input_vsize() -> u64 {
    (3 * P2WPKH_INPUT_SIZE + P2PKH_INPUT_SIZE).div_ceil(4)
}

/// Fee charged per registered input at the given rate.
pub fn fee_per_input(sat_per_byte: u64) -> Amount {
    Amount::from_sat(sat_per_byte * input_vsize())
}

/// Fee charged per transaction output at the given rate.
pub fn fee_per_output(sat_per_byte: u64) -> Amount {
    Amount::from_sat(sat_per_byte * OUTPUT_SIZE)
}

/// BTC denomination approximating `denomination_usd` at the given price.
///
/// Rounds to `k` decimal places, growing `k` from 1 until the rounded
/// value is non-zero (capped at 8, the satoshi resolution). Returns
/// `None` when the price is unusable or the amount rounds to zero even
/// at full resolution; the caller then keeps its previous denomination.
pub fn usd_denomination(denomination_usd: f64, btc_usd_price: f64) -> Option<Amount> {
    if !(btc_usd_price.is_finite() && btc_usd_price > 0.0) {
        return None;
    }
    let exact = denomination_usd / btc_usd_price;
    for decimals in 1..=8 {
        let scale = 10f64.powi(decimals);
        let rounded = (exact * scale).round() / scale;
        if rounded > 0.0 {
            return Amount::from_btc(rounded).ok();
        }
    }
    None
}

/// One adaptive step of the anonymity-set target.
///
/// A slow InputRegistration (longer than `average_target`) means too few
/// participants for the current target, so shrink it; a fast one means
/// demand supports a larger join, so grow it. Always stays in
/// `[min, max]`.
pub fn adjust_anonymity_target(
    current: usize,
    last_input_registration: Duration,
    average_target: Duration,
    min: usize,
    max: usize,
) -> usize {
    if last_input_registration > average_target {
        current.saturating_sub(1).max(min)
    } else {
        current.saturating_add(1).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_vsize_is_68() {
        assert_eq!(input_vsize(), 68);
    }

    #[test]
    fn fees_scale_with_rate() {
        assert_eq!(fee_per_input(2), Amount::from_sat(136));
        assert_eq!(fee_per_output(2), Amount::from_sat(66));
        assert_eq!(fee_per_input(0), Amount::ZERO);
    }

    #[test]
    fn usd_denomination_rounds_to_one_decimal_when_large() {
        // 10_000 USD at 50_000 USD/BTC is exactly 0.2 BTC.
        let denom = usd_denomination(10_000.0, 50_000.0).unwrap();
        assert_eq!(denom, Amount::from_btc(0.2).unwrap());
    }

    #[test]
    fn usd_denomination_grows_precision_until_nonzero() {
        // 100 USD at 50_000 USD/BTC = 0.002 BTC; one- and two-decimal
        // rounding both collapse to zero, three decimals does not.
        let denom = usd_denomination(100.0, 50_000.0).unwrap();
        assert_eq!(denom, Amount::from_btc(0.002).unwrap());
    }

    #[test]
    fn usd_denomination_rejects_bad_price() {
        assert!(usd_denomination(10_000.0, 0.0).is_none());
        assert!(usd_denomination(10_000.0, f64::NAN).is_none());
        assert!(usd_denomination(10_000.0, -1.0).is_none());
    }

    #[test]
    fn usd_denomination_gives_up_below_satoshi_resolution() {
        assert!(usd_denomination(0.000001, 100_000.0).is_none());
    }

    #[test]
    fn anonymity_target_shrinks_when_slow() {
        let target = adjust_anonymity_target(
            5,
            Duration::from_secs(180),
            Duration::from_secs(120),
            2,
            10,
        );
        assert_eq!(target, 4);
    }

    #[test]
    fn anonymity_target_grows_when_fast() {
        let target = adjust_anonymity_target(
            5,
            Duration::from_secs(60),
            Duration::from_secs(120),
            2,
            10,
        );
        assert_eq!(target, 6);
    }

    #[test]
    fn anonymity_target_respects_bounds() {
        let floor = adjust_anonymity_target(
            2,
            Duration::from_secs(999),
            Duration::from_secs(120),
            2,
            10,
        );
        assert_eq!(floor, 2);

        let ceiling = adjust_anonymity_target(
            10,
            Duration::from_secs(1),
            Duration::from_secs(120),
            2,
            10,
        );
        assert_eq!(ceiling, 10);
    }
}
