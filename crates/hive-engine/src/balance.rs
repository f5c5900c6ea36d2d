//! Splitting controllable entities between worker threads.
//!
//! Both policies produce contiguous, non-overlapping ranges that together
//! cover `0..len`, one range per worker. Contiguous ranges keep each
//! worker walking a compact slice of the entity list.

use std::ops::Range;

/// Load-balancing strategy for the threaded scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BalancePolicy {
    /// Equal entity count per worker.
    #[default]
    Length,
    /// Equal estimated work per worker, using
    /// [`Controllable::cost`](crate::Controllable::cost).
    Quantity,
}

impl BalancePolicy {
    /// Split entities with the given per-entity `costs` into `workers`
    /// ranges.
    pub fn partition(self, costs: &[usize], workers: usize) -> Vec<Range<usize>> {
        match self {
            Self::Length => partition_by_length(costs.len(), workers),
            Self::Quantity => partition_by_cost(costs, workers),
        }
    }
}

/// Split `len` items into `workers` contiguous ranges of equal size.
///
/// When `len` does not divide evenly, the first `len % workers` ranges
/// get one extra item.
pub fn partition_by_length(len: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let base = len / workers;
    let extra = len % workers;
    (0..workers)
        .map(|w| {
            let start = w * base + w.min(extra);
            let size = base + usize::from(w < extra);
            start..start + size
        })
        .collect()
}

/// Split items into `workers` contiguous ranges of roughly equal total
/// cost.
///
/// Range boundaries are placed at the item edge closest to each ideal
/// cumulative cost `total * w / workers`, so every boundary lands within
/// half an item's cost of its ideal position and no range exceeds the
/// ideal share by more than the largest single cost. With all costs equal this
/// matches [`partition_by_length`] whenever the count divides evenly.
/// When every cost is zero the split falls back to equal length.
pub fn partition_by_cost(costs: &[usize], workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let len = costs.len();
    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0u128);
    for &c in costs {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + c as u128);
    }
    let total = prefix[len];
    if total == 0 {
        return partition_by_length(len, workers);
    }

    // Work in units scaled by `workers` so ideal boundaries stay integral.
    let scale = workers as u128;
    let mut bounds = Vec::with_capacity(workers + 1);
    bounds.push(0usize);
    let mut i = 0usize;
    for w in 1..workers {
        let target = total * w as u128;
        while i < len && prefix[i + 1] * scale <= target {
            i += 1;
        }
        let mut boundary = i;
        if i < len {
            let below = target - prefix[i] * scale;
            let above = prefix[i + 1] * scale - target;
            if above < below {
                boundary = i + 1;
            }
        }
        let floor = bounds[bounds.len() - 1];
        bounds.push(boundary.max(floor));
    }
    bounds.push(len);

    bounds.windows(2).map(|w| w[0]..w[1]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sizes(ranges: &[Range<usize>]) -> Vec<usize> {
        ranges.iter().map(|r| r.len()).collect()
    }

    fn load(costs: &[usize], r: &Range<usize>) -> usize {
        costs[r.clone()].iter().sum()
    }

    #[test]
    fn length_even_split() {
        assert_eq!(sizes(&partition_by_length(100, 4)), vec![25, 25, 25, 25]);
    }

    #[test]
    fn length_remainder_goes_first() {
        let r = partition_by_length(10, 4);
        assert_eq!(r, vec![0..3, 3..6, 6..8, 8..10]);
    }

    #[test]
    fn length_more_workers_than_items() {
        assert_eq!(sizes(&partition_by_length(2, 4)), vec![1, 1, 0, 0]);
    }

    #[test]
    fn zero_workers_yield_nothing() {
        assert!(partition_by_length(5, 0).is_empty());
        assert!(partition_by_cost(&[1, 2, 3], 0).is_empty());
    }

    #[test]
    fn unit_costs_match_length() {
        let costs = vec![1; 100];
        assert_eq!(sizes(&partition_by_cost(&costs, 4)), vec![25, 25, 25, 25]);
    }

    #[test]
    fn heavy_entities_get_fewer_neighbours() {
        // One robot with twelve sensors and twelve with one each.
        let mut costs = vec![12];
        costs.extend(std::iter::repeat_n(1, 12));
        let r = partition_by_cost(&costs, 2);
        assert_eq!(r, vec![0..1, 1..13]);
        assert_eq!(load(&costs, &r[0]), 12);
        assert_eq!(load(&costs, &r[1]), 12);
    }

    #[test]
    fn all_zero_costs_fall_back_to_length() {
        assert_eq!(partition_by_cost(&[0; 6], 3), partition_by_length(6, 3));
    }

    #[test]
    fn empty_population() {
        assert_eq!(partition_by_cost(&[], 3), vec![0..0, 0..0, 0..0]);
        assert_eq!(BalancePolicy::Length.partition(&[], 2), vec![0..0, 0..0]);
    }

    proptest! {
        #[test]
        fn ranges_tile_the_population(
            costs in prop::collection::vec(0usize..20, 0..200),
            workers in 1usize..16,
            quantity in any::<bool>(),
        ) {
            let policy = if quantity { BalancePolicy::Quantity } else { BalancePolicy::Length };
            let ranges = policy.partition(&costs, workers);
            prop_assert_eq!(ranges.len(), workers);
            let mut next = 0;
            for r in &ranges {
                prop_assert_eq!(r.start, next);
                prop_assert!(r.end >= r.start);
                next = r.end;
            }
            prop_assert_eq!(next, costs.len());
        }

        #[test]
        fn cost_split_is_near_ideal(
            costs in prop::collection::vec(1usize..20, 1..200),
            workers in 1usize..16,
        ) {
            let ranges = partition_by_cost(&costs, workers);
            let total: usize = costs.iter().sum();
            let max_cost = *costs.iter().max().unwrap();
            let ideal = total.div_ceil(workers);
            for r in &ranges {
                prop_assert!(load(&costs, r) <= ideal + max_cost);
            }
        }
    }
}
