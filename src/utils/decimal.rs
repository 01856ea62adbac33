//! Decimal helpers for reporting.
//!
//! Ledger accounting is done in integer base units; these helpers only turn
//! those integers into human-readable decimals for logs, valuations and the CLI.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Convert an integer amount of base units into token units.
///
/// Returns `None` when the amount does not fit in a `Decimal`.
pub fn to_units(amount: u128, decimals: u32) -> Option<Decimal> {
    let amount = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(amount, decimals).ok()
}

/// Assets per share. A pool without shares prices at 1.
pub fn share_price(total_assets: u128, total_shares: u128) -> Decimal {
    if total_shares == 0 {
        return Decimal::ONE;
    }
    match (Decimal::from_u128(total_assets), Decimal::from_u128(total_shares)) {
        (Some(assets), Some(shares)) => safe_div(assets, shares),
        _ => Decimal::ZERO,
    }
}

/// Convert basis points to a decimal ratio (10000 bps = 1.0).
pub fn bps_to_ratio(bps: u16) -> Decimal {
    Decimal::from(bps) / dec!(10000)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_units() {
        assert_eq!(to_units(1_500_000, 6), Some(dec!(1.5)));
        assert_eq!(to_units(42, 0), Some(dec!(42)));
        assert_eq!(to_units(u128::MAX, 6), None);
    }

    #[test]
    fn test_share_price() {
        assert_eq!(share_price(900, 750), dec!(1.2));
        assert_eq!(share_price(0, 0), Decimal::ONE);
        assert_eq!(share_price(0, 10), Decimal::ZERO);
    }

    #[test]
    fn test_bps_to_ratio() {
        assert_eq!(bps_to_ratio(10_000), Decimal::ONE);
        assert_eq!(bps_to_ratio(50), dec!(0.005));
    }
}
