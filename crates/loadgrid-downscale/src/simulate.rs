//! Deployment simulator: a single randomized trial.
//!
//! Sites are visited in a weight-biased random order and filled to their
//! remaining capacity until the target is met:
//! 1. Weighted shuffle without replacement (every eligible site appears once)
//! 2. Sites before the boundary are saturated
//! 3. The boundary site takes the shortfall, later sites take nothing

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::error::{DownscaleError, DownscaleResult};
use crate::params::is_close;
use crate::state::{Allocation, Snapshot};

/// Visit order of the snapshot sites for `seed`, as snapshot indices.
///
/// Each site gets the key `ln(u) / weight` with `u` uniform in (0, 1]; sorting
/// keys in descending order yields a permutation where a site's chance of
/// coming first is proportional to its weight. Equal keys keep snapshot order.
pub fn weighted_order(snapshot: &Snapshot, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut keyed: Vec<(f64, usize)> = snapshot
        .sites()
        .iter()
        .enumerate()
        .map(|(i, site)| {
            let u = 1.0 - rng.random::<f64>();
            (u.ln() / site.weight, i)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().map(|(_, i)| i).collect()
}

/// Run one deployment trial.
///
/// The result is fully determined by `(target, snapshot, seed)`. A zero
/// target yields an all-zero allocation without drawing.
pub fn simulate(target: f64, snapshot: &Snapshot, seed: u64) -> DownscaleResult<Allocation> {
    let mut allocation = vec![0.0; snapshot.len()];
    if target == 0.0 {
        return Ok(Allocation::new(allocation));
    }

    let sites = snapshot.sites();
    let order = weighted_order(snapshot, seed);
    let Some(&last) = order.last() else {
        return Err(DownscaleError::ShortfallExceedsCapacity {
            site_id: None,
            shortfall: target,
            remaining: 0.0,
        });
    };

    let mut filled = 0.0;
    for &i in &order {
        let remaining = sites[i].remaining_capacity;
        if filled + remaining >= target || i == last {
            let shortfall = target - filled;
            if shortfall > remaining && !is_close(shortfall, remaining) {
                return Err(DownscaleError::ShortfallExceedsCapacity {
                    site_id: Some(sites[i].site_id.clone()),
                    shortfall,
                    remaining,
                });
            }
            allocation[i] = shortfall;
            break;
        }
        allocation[i] = remaining;
        filled += remaining;
    }

    let allocation = Allocation::new(allocation);
    let deployed = allocation.total();
    if !is_close(deployed, target) {
        return Err(DownscaleError::TrialTotalMismatch {
            expected: target,
            actual: deployed,
        });
    }

    trace!(seed, target, deployed, "trial complete");
    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equal_sites(capacities: &[f64]) -> Snapshot {
        Snapshot::from_sites(
            capacities
                .iter()
                .enumerate()
                .map(|(i, &c)| (format!("s{i}"), c, 1.0)),
        )
    }

    #[test]
    fn fills_sites_up_to_target() {
        // Three sites of 10 with a target of 15: one site saturated, one
        // boundary site with 5, one untouched.
        let snapshot = equal_sites(&[10.0, 10.0, 10.0]);
        let allocation = simulate(15.0, &snapshot, 0).unwrap();

        assert!(is_close(allocation.total(), 15.0));
        let mut values = allocation.values().to_vec();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![0.0, 5.0, 10.0]);
        assert!(allocation.values().iter().all(|&v| v <= 10.0));
    }

    #[test]
    fn same_seed_same_allocation() {
        let snapshot = Snapshot::from_sites([("a", 3.0, 0.2), ("b", 5.0, 1.0), ("c", 2.0, 4.0), ("d", 7.0, 0.5)]);
        let first = simulate(9.0, &snapshot, 42).unwrap();
        let second = simulate(9.0, &snapshot, 42).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_target_allocates_nothing() {
        let snapshot = equal_sites(&[10.0, 10.0]);
        let allocation = simulate(0.0, &snapshot, 7).unwrap();
        assert_eq!(allocation.values(), &[0.0, 0.0]);
    }

    #[test]
    fn exact_fit_saturates_every_site() {
        let snapshot = equal_sites(&[4.0, 6.0]);
        let allocation = simulate(10.0, &snapshot, 3).unwrap();
        assert_eq!(allocation.values(), &[4.0, 6.0]);
    }

    #[test]
    fn insufficient_capacity_is_an_internal_error() {
        let snapshot = equal_sites(&[4.0, 6.0]);
        let err = simulate(11.0, &snapshot, 3).unwrap_err();
        assert!(matches!(err, DownscaleError::ShortfallExceedsCapacity { site_id: Some(_), .. }));
        assert!(err.is_internal());
    }

    #[test]
    fn empty_snapshot_with_positive_target_fails() {
        let err = simulate(1.0, &Snapshot::default(), 0).unwrap_err();
        assert!(matches!(err, DownscaleError::ShortfallExceedsCapacity { site_id: None, .. }));
    }

    #[test]
    fn exhausted_sites_receive_nothing() {
        let snapshot = Snapshot::from_sites([("full", 0.0, 100.0), ("open", 5.0, 1.0)]);
        for seed in 0..20 {
            let allocation = simulate(3.0, &snapshot, seed).unwrap();
            assert_eq!(allocation.values(), &[0.0, 3.0]);
        }
    }

    #[test]
    fn order_is_a_permutation() {
        let snapshot = equal_sites(&[1.0; 25]);
        let mut order = weighted_order(&snapshot, 11);
        order.sort_unstable();
        assert_eq!(order, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn heavier_sites_come_first_more_often() {
        let snapshot = Snapshot::from_sites([("light", 1.0, 1.0), ("heavy", 1.0, 9.0)]);
        let heavy_first = (0..2_000)
            .filter(|&seed| weighted_order(&snapshot, seed)[0] == 1)
            .count();
        // Expected share is 0.9.
        assert!(heavy_first > 1_600, "heavy site first in {heavy_first} of 2000 trials");
    }
}
