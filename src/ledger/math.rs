//! Share accounting arithmetic.
//!
//! All conversions round toward zero, which favors the pool: a deposit never
//! mints more shares than the assets it brings, a withdrawal never pays more
//! than the burned shares are worth.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// `floor(a * b / denominator)` without intermediate overflow.
///
/// Returns `None` for a zero denominator or a result that does not fit in `u128`.
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    match a.checked_mul(b) {
        Some(product) => Some(product / denominator),
        None => (BigUint::from(a) * BigUint::from(b) / BigUint::from(denominator)).to_u128(),
    }
}

/// Shares minted for depositing `amount`.
///
/// The first deposit into an empty pool mints 1:1. Returns `None` when the
/// pool has shares but no assets, or on overflow.
pub fn shares_for_deposit(amount: u128, total_shares: u128, total_assets: u128) -> Option<u128> {
    if total_shares == 0 {
        return Some(amount);
    }
    mul_div_floor(amount, total_shares, total_assets)
}

/// Assets paid out for burning `shares`.
pub fn assets_for_shares(shares: u128, total_shares: u128, total_assets: u128) -> Option<u128> {
    if shares == 0 {
        return Some(0);
    }
    mul_div_floor(shares, total_assets, total_shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        assert_eq!(shares_for_deposit(500, 0, 0), Some(500));
        // Leftover dust from a drained pool goes to the next depositor
        assert_eq!(shares_for_deposit(500, 0, 3), Some(500));
    }

    #[test]
    fn test_deposit_rounds_down() {
        assert_eq!(shares_for_deposit(250, 500, 500), Some(250));
        // 100 * 750 / 900 = 83.33
        assert_eq!(shares_for_deposit(100, 750, 900), Some(83));
        assert_eq!(shares_for_deposit(1, 750, 900), Some(0));
        assert_eq!(shares_for_deposit(100, 750, 0), None);
    }

    #[test]
    fn test_withdraw_rounds_down() {
        assert_eq!(assets_for_shares(500, 750, 900), Some(600));
        // 1 * 2 / 3 = 0.67
        assert_eq!(assets_for_shares(1, 3, 2), Some(0));
        assert_eq!(assets_for_shares(0, 750, 900), Some(0));
    }

    #[test]
    fn test_wide_products_do_not_overflow() {
        let big = 10u128.pow(30);
        assert_eq!(mul_div_floor(big, big, big), Some(big));
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, 1), None);
        assert_eq!(mul_div_floor(1, 1, 0), None);
    }

    #[test]
    fn test_round_trip_never_gains_value() {
        let (total_shares, total_assets) = (1_000_003u128, 1_234_567u128);
        for amount in [1u128, 7, 99, 12_345, 999_999] {
            let shares = shares_for_deposit(amount, total_shares, total_assets).unwrap();
            let back = assets_for_shares(
                shares,
                total_shares + shares,
                total_assets + amount,
            )
            .unwrap();
            assert!(back <= amount, "deposit {amount} returned {back}");
        }
    }
}
