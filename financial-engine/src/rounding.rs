//! The pinned profit-share rounding rule (spec §4.5, §8 scenario S3):
//! allocate a fixed total proportionally across weighted shares, truncating
//! each share to the currency scale, then hand the leftover cents to the
//! largest-weight entries first, breaking ties by ascending id. This is a
//! deliberate pin, not a guess — spec §9 Open Questions left the tie-break
//! unspecified and we resolve it here once, rather than leaving every caller
//! to invent its own.

use ledger_model::money::{round_currency, CURRENCY_SCALE};
use rust_decimal::{Decimal, RoundingStrategy};

/// One entry to allocate a share of `total` to, keyed by its own id for the
/// ascending tie-break. `id` only needs `Ord`; callers pass whatever
/// identifier the allocation is indexed by (an `InvestmentId`'s `Uuid`, most
/// often).
#[derive(Debug, Clone, Copy)]
pub struct Weighted<Id> {
    /// Stable identifier used to break ties between equal weights.
    pub id: Id,
    /// The allocation weight (an investment amount, most often).
    pub weight: Decimal,
}

/// Allocate `total` across `entries` in proportion to their weights, so that
/// the returned shares sum to exactly `total` (spec §4.4's sum-of-shares
/// invariant). Each share is truncated to the currency scale before residue
/// distribution; the residue (always a whole number of cents, since `total`
/// and every truncated share share the same scale) is handed out one cent at
/// a time to the entries with the largest `weight`, largest first, ties
/// broken by ascending `id`.
///
/// Returns `Err` only if `entries` is empty or every weight is zero (nothing
/// to allocate proportionally against).
pub fn allocate_with_residue<Id: Ord + Copy>(
    total: Decimal,
    entries: &[Weighted<Id>],
) -> ledger_model::Result<Vec<(Id, Decimal)>> {
    let total_weight: Decimal = entries.iter().map(|e| e.weight).sum();
    if entries.is_empty() || total_weight.is_zero() {
        return Err(ledger_model::Error::PolicyViolation(
            "cannot allocate a distribution across zero weighted entries".to_string(),
        ));
    }

    let total = round_currency(total);
    let mut shares: Vec<(Id, Decimal)> = entries
        .iter()
        .map(|e| {
            let raw = total * e.weight / total_weight;
            let floored = raw.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero);
            (e.id, floored)
        })
        .collect();

    let allocated: Decimal = shares.iter().map(|(_, s)| *s).sum();
    let residue = total - allocated;
    let cent = Decimal::new(1, CURRENCY_SCALE);

    if residue > Decimal::ZERO {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by(|&a, &b| {
            entries[b]
                .weight
                .cmp(&entries[a].weight)
                .then_with(|| entries[a].id.cmp(&entries[b].id))
        });

        let mut remaining_cents = (residue / cent).round_dp_with_strategy(0, RoundingStrategy::ToZero);
        let mut i = 0;
        while remaining_cents > Decimal::ZERO && !order.is_empty() {
            let idx = order[i % order.len()];
            shares[idx].1 += cent;
            remaining_cents -= Decimal::ONE;
            i += 1;
        }
    }

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s3_splits_the_residue_to_the_larger_investment() {
        let entries = [
            Weighted { id: 1u32, weight: Decimal::new(333334, 2) },
            Weighted { id: 2u32, weight: Decimal::new(666666, 2) },
        ];
        let total = Decimal::new(100000, 2);

        let shares = allocate_with_residue(total, &entries).unwrap();
        let by_id = |id: u32| shares.iter().find(|(i, _)| *i == id).unwrap().1;

        assert_eq!(by_id(1), Decimal::new(33333, 2));
        assert_eq!(by_id(2), Decimal::new(66667, 2));
        assert_eq!(
            shares.iter().map(|(_, s)| *s).sum::<Decimal>(),
            total
        );
    }

    #[test]
    fn ties_break_on_ascending_id() {
        let entries = [
            Weighted { id: 5u32, weight: Decimal::new(500000, 2) },
            Weighted { id: 2u32, weight: Decimal::new(500000, 2) },
            Weighted { id: 9u32, weight: Decimal::new(500001, 2) },
        ];
        let total = Decimal::new(100000, 2);

        let shares = allocate_with_residue(total, &entries).unwrap();
        assert_eq!(shares.iter().map(|(_, s)| *s).sum::<Decimal>(), total);
    }

    #[test]
    fn sum_always_matches_total_across_many_splits() {
        for n in 1..20 {
            let entries: Vec<Weighted<u32>> = (0..n)
                .map(|i| Weighted { id: i, weight: Decimal::new(100 + i as i64 * 37, 0) })
                .collect();
            let total = Decimal::new(100001, 2);
            let shares = allocate_with_residue(total, &entries).unwrap();
            assert_eq!(shares.iter().map(|(_, s)| *s).sum::<Decimal>(), total);
        }
    }

    #[test]
    fn rejects_zero_total_weight() {
        let entries = [Weighted { id: 1u32, weight: Decimal::ZERO }];
        assert!(allocate_with_residue(Decimal::new(10000, 2), &entries).is_err());
    }
}
