//! Liquidation order sizing.
//!
//! Venues quote tier prices only, so sales are cut into tier-sized lots.
//! Lots are chosen greedily from the largest tier that fits the remaining
//! requirement: a 20-BSK requirement becomes two 10-lots, never one
//! overshooting 50-lot, because selling more collateral than the principal
//! requires is not ours to do.

use crate::domain::Decimal;

/// Allowed lot sizes, largest first.
pub const LOT_TIERS: [u32; 4] = [100, 50, 10, 1];

/// BSK units required to cover `gap_gc` at `mid_price`, rounded up to whole
/// units. Zero when the gap is already closed or the price is unusable.
pub fn required_units(gap_gc: Decimal, mid_price: Decimal) -> u32 {
    if !gap_gc.is_positive() || !mid_price.is_positive() {
        return 0;
    }
    (gap_gc / mid_price).ceil_units()
}

/// The next lot to sell, given the remaining GC shortfall, the current mid
/// price, and the collateral still available.
///
/// Returns `None` when nothing more should (or can) be sold. A final lot is
/// clamped to the remaining collateral, which may leave it fractional; the
/// venues accept arbitrary quantities priced at the covering tier.
pub fn next_lot(
    gap_gc: Decimal,
    mid_price: Decimal,
    remaining_collateral: Decimal,
) -> Option<Decimal> {
    if !remaining_collateral.is_positive() {
        return None;
    }

    let needed = required_units(gap_gc, mid_price);
    if needed == 0 {
        return None;
    }

    let tier = LOT_TIERS
        .iter()
        .copied()
        .find(|&t| t <= needed)
        .unwrap_or(1);
    let lot = Decimal::from_units(tier);

    if remaining_collateral < lot {
        Some(remaining_collateral)
    } else {
        Some(lot)
    }
}

/// Full greedy decomposition of a unit requirement into tier lots.
/// The worker re-sizes after every fill instead of following a precomputed
/// plan; this exists for sizing checks and diagnostics.
pub fn decompose_units(mut units: u32) -> Vec<u32> {
    let mut lots = Vec::new();
    while units > 0 {
        let tier = LOT_TIERS
            .iter()
            .copied()
            .find(|&t| t <= units)
            .unwrap_or(1);
        lots.push(tier);
        units -= tier;
    }
    lots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_required_units_rounds_up() {
        // principal=1000, mid=50 -> exactly 20
        assert_eq!(required_units(dec("1000"), dec("50")), 20);
        // 1000 / 31.25 = 32
        assert_eq!(required_units(dec("1000"), dec("31.25")), 32);
        assert_eq!(required_units(dec("1000"), dec("48")), 21);
        assert_eq!(required_units(dec("0"), dec("50")), 0);
        assert_eq!(required_units(dec("-5"), dec("50")), 0);
        assert_eq!(required_units(dec("1000"), dec("0")), 0);
    }

    #[test]
    fn test_decompose_prefers_exact_cover() {
        // The 20-tier does not exist: two 10-lots, not one 50-lot.
        assert_eq!(decompose_units(20), vec![10, 10]);
        assert_eq!(decompose_units(32), vec![10, 10, 10, 1, 1]);
        assert_eq!(decompose_units(173), vec![100, 50, 10, 10, 1, 1, 1]);
        assert_eq!(decompose_units(1), vec![1]);
        assert!(decompose_units(0).is_empty());
    }

    #[test]
    fn test_decompose_covers_requirement() {
        for units in [1u32, 7, 20, 32, 99, 100, 101, 250] {
            let lots = decompose_units(units);
            let total: u32 = lots.iter().sum();
            assert_eq!(total, units, "lots must sum to the requirement");
            assert!(lots.iter().all(|lot| LOT_TIERS.contains(lot)));
        }
    }

    #[test]
    fn test_next_lot_greedy() {
        // 20 BSK needed, plenty of collateral: first lot is a 10.
        assert_eq!(next_lot(dec("1000"), dec("50"), dec("40")), Some(dec("10")));
        // 5 BSK needed: a 1-lot.
        assert_eq!(next_lot(dec("250"), dec("50"), dec("40")), Some(dec("1")));
        // 120 BSK needed: a 100-lot.
        assert_eq!(next_lot(dec("6000"), dec("50"), dec("200")), Some(dec("100")));
    }

    #[test]
    fn test_next_lot_clamps_to_collateral() {
        // Needs 20 but only 7.5 BSK left: sell what is there.
        assert_eq!(next_lot(dec("1000"), dec("50"), dec("7.5")), Some(dec("7.5")));
    }

    #[test]
    fn test_next_lot_none_when_done() {
        assert_eq!(next_lot(dec("0"), dec("50"), dec("40")), None);
        assert_eq!(next_lot(dec("-10"), dec("50"), dec("40")), None);
        assert_eq!(next_lot(dec("1000"), dec("50"), dec("0")), None);
    }
}
