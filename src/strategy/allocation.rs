//! Allocation arithmetic in basis points.

/// 100% in basis points.
pub const MAX_BPS: u16 = 10_000;

/// Share of `total` represented by `part`, in bps (rounded down, capped at 100%).
pub fn allocation_bps(part: u128, total: u128) -> u16 {
    if total == 0 {
        return 0;
    }
    let part = part.min(total);
    match part.checked_mul(u128::from(MAX_BPS)) {
        Some(scaled) => (scaled / total) as u16,
        None => (part / (total / u128::from(MAX_BPS)).max(1)).min(u128::from(MAX_BPS)) as u16,
    }
}

/// Absolute distance between two allocations.
pub fn drift_bps(current: u16, target: u16) -> u16 {
    current.abs_diff(target)
}

/// Amount to move to close the drift: `|current - target| * total / 10000`.
pub fn excess_or_deficit(current: u16, target: u16, total_value: u128) -> u128 {
    let drift = u128::from(drift_bps(current, target));
    match total_value.checked_mul(drift) {
        Some(scaled) => scaled / u128::from(MAX_BPS),
        None => total_value / u128::from(MAX_BPS) * drift,
    }
}

/// Portion of `amount` that belongs in the yield source at `target` bps.
pub fn target_portion(amount: u128, target: u16) -> u128 {
    match amount.checked_mul(u128::from(target)) {
        Some(scaled) => scaled / u128::from(MAX_BPS),
        None => amount / u128::from(MAX_BPS) * u128::from(target),
    }
}
