//! Node split strategies.
//!
//! When a node grows past `max_entries` the tree hands the envelopes of its
//! items to a [`SplitStrategy`], which answers with two groups of item
//! positions. The tree then keeps the first group in the original node and
//! moves the second group into a fresh sibling.
//!
//! A good split keeps the two resulting bounding boxes apart. Candidates are
//! ranked by, in order: the overlap area between the two groups, the sum of
//! their perimeters, and the sum of their areas (see [`SplitCost`]).

use std::cmp::Ordering;

use crate::envelope::Envelope;
use crate::rtree::{SpatialError, SpatialResult};

/// Item positions assigned to the node that keeps its identity, and to the
/// new sibling.
pub type Partition = (Vec<usize>, Vec<usize>);

/// Redistributes the items of an overflowing node into two groups.
///
/// Implementations must return two non-empty groups that together hold every
/// position in `0..items.len()` exactly once. Each group holds at least
/// `min_entries` items, unless there are fewer than `2 * min_entries` items,
/// in which case the groups are as balanced as possible.
pub trait SplitStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn split(&self, items: &[Envelope], min_entries: usize) -> SpatialResult<Partition>;
}

/// Quality of a partition, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SplitCost {
    pub overlap: f64,
    pub perimeter: f64,
    pub area: f64,
}

/// Union of the envelopes at `positions`.
pub(crate) fn group_bounds(items: &[Envelope], positions: &[usize]) -> Envelope {
    let mut bounds = Envelope::empty(items.first().map_or(0, Envelope::dimension));
    for &i in positions {
        bounds.expand(&items[i]);
    }
    bounds
}

/// Cost of splitting `items` into `first` and `second`.
pub(crate) fn partition_cost(items: &[Envelope], first: &[usize], second: &[usize]) -> SplitCost {
    cost_of(&group_bounds(items, first), &group_bounds(items, second))
}

fn cost_of(a: &Envelope, b: &Envelope) -> SplitCost {
    SplitCost {
        overlap: a.overlap_area(b),
        perimeter: a.perimeter() + b.perimeter(),
        area: a.area() + b.area(),
    }
}

fn check_splittable(items: &[Envelope]) -> SpatialResult<()> {
    if items.len() < 2 {
        return Err(SpatialError::InvariantViolation(format!(
            "cannot split {} item(s)",
            items.len()
        )));
    }
    Ok(())
}

/// Lower bound on group size for `n` items.
fn effective_min(n: usize, min_entries: usize) -> usize {
    min_entries.min(n / 2).max(1)
}

// ============================================================================
// Quadratic split
// ============================================================================

/// Guttman's quadratic-cost seed-and-grow split.
///
/// The two items that would waste the most area if placed together become
/// seeds. The remaining items are then assigned one at a time, always taking
/// the item with the strongest preference for one group over the other,
/// until one group must take everything left to reach `min_entries`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticSplit;

impl QuadraticSplit {
    fn pick_seeds(items: &[Envelope]) -> (usize, usize) {
        let mut seeds = (0, 1);
        let mut worst = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                let combined = items[i].union(&items[j]);
                let waste = (
                    combined.area() - items[i].area() - items[j].area(),
                    combined.perimeter() - items[i].perimeter() - items[j].perimeter(),
                );
                let larger = match waste.0.total_cmp(&worst.0) {
                    Ordering::Equal => waste.1 > worst.1,
                    ord => ord == Ordering::Greater,
                };
                if larger {
                    worst = waste;
                    seeds = (i, j);
                }
            }
        }
        seeds
    }
}

impl SplitStrategy for QuadraticSplit {
    fn name(&self) -> &str {
        "quadratic"
    }

    fn split(&self, items: &[Envelope], min_entries: usize) -> SpatialResult<Partition> {
        check_splittable(items)?;
        let min = effective_min(items.len(), min_entries);
        let (s1, s2) = Self::pick_seeds(items);

        let mut first = vec![s1];
        let mut second = vec![s2];
        let mut first_bounds = items[s1].clone();
        let mut second_bounds = items[s2].clone();
        let mut remaining: Vec<usize> = (0..items.len()).filter(|&i| i != s1 && i != s2).collect();

        while !remaining.is_empty() {
            if first.len() + remaining.len() <= min {
                first.append(&mut remaining);
                break;
            }
            if second.len() + remaining.len() <= min {
                second.append(&mut remaining);
                break;
            }

            // pick the item with the greatest preference for one group
            let mut pick = 0;
            let mut pick_costs = (0.0, 0.0);
            let mut best_diff = f64::NEG_INFINITY;
            for (pos, &i) in remaining.iter().enumerate() {
                let d1 = first_bounds.enlargement(&items[i]);
                let d2 = second_bounds.enlargement(&items[i]);
                let diff = (d1 - d2).abs();
                if diff > best_diff {
                    best_diff = diff;
                    pick = pos;
                    pick_costs = (d1, d2);
                }
            }
            let item = remaining.remove(pick);

            let to_first = match pick_costs.0.total_cmp(&pick_costs.1) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => match first_bounds.area().total_cmp(&second_bounds.area()) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => first.len() <= second.len(),
                },
            };
            if to_first {
                first_bounds.expand(&items[item]);
                first.push(item);
            } else {
                second_bounds.expand(&items[item]);
                second.push(item);
            }
        }

        Ok((first, second))
    }
}

// ============================================================================
// Axis split
// ============================================================================

/// Topological split in the style of the R*-tree.
///
/// Along every axis the items are sorted by their lower bound and by their
/// upper bound, and every cut that leaves at least `min_entries` on both
/// sides is evaluated. The cheapest distribution by [`SplitCost`] wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisSplit;

impl AxisSplit {
    /// Every sorted order the split evaluates cuts of.
    pub(crate) fn candidate_orders(items: &[Envelope]) -> Vec<Vec<usize>> {
        let mut orders = Vec::new();
        let dimension = items.first().map_or(0, Envelope::dimension);
        for axis in 0..dimension {
            for by_low in [true, false] {
                let mut order: Vec<usize> = (0..items.len()).collect();
                order.sort_by(|&a, &b| {
                    let (ka, kb, ta, tb) = if by_low {
                        (items[a].low()[axis], items[b].low()[axis], items[a].high()[axis], items[b].high()[axis])
                    } else {
                        (items[a].high()[axis], items[b].high()[axis], items[a].low()[axis], items[b].low()[axis])
                    };
                    ka.total_cmp(&kb).then(ta.total_cmp(&tb)).then(a.cmp(&b))
                });
                orders.push(order);
            }
        }
        orders
    }
}

impl SplitStrategy for AxisSplit {
    fn name(&self) -> &str {
        "axis"
    }

    fn split(&self, items: &[Envelope], min_entries: usize) -> SpatialResult<Partition> {
        check_splittable(items)?;
        let n = items.len();
        let min = effective_min(n, min_entries);
        let dimension = items[0].dimension();

        let mut best: Option<(SplitCost, Vec<usize>, usize)> = None;
        for order in Self::candidate_orders(items) {
            // prefix[k] covers order[..k], suffix[k] covers order[k..]
            let mut prefix = vec![Envelope::empty(dimension); n + 1];
            let mut suffix = vec![Envelope::empty(dimension); n + 1];
            for k in 0..n {
                prefix[k + 1] = prefix[k].union(&items[order[k]]);
            }
            for k in (0..n).rev() {
                suffix[k] = suffix[k + 1].union(&items[order[k]]);
            }

            for cut in min..=(n - min) {
                let cost = cost_of(&prefix[cut], &suffix[cut]);
                let better = match &best {
                    None => true,
                    Some((best_cost, _, _)) => cost < *best_cost,
                };
                if better {
                    best = Some((cost, order.clone(), cut));
                }
            }
        }

        let (_, order, cut) = best.ok_or_else(|| {
            SpatialError::InvariantViolation(format!("no valid distribution for {} items", n))
        })?;
        let (first, second) = order.split_at(cut);
        Ok((first.to_vec(), second.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_boxes(rng: &mut StdRng, n: usize) -> Vec<Envelope> {
        (0..n)
            .map(|_| {
                let x = rng.gen_range(0.0..100.0);
                let y = rng.gen_range(0.0..100.0);
                let w = rng.gen_range(0.0..10.0);
                let h = rng.gen_range(0.0..10.0);
                Envelope::new_2d(x, y, x + w, y + h)
            })
            .collect()
    }

    fn assert_valid_partition(n: usize, min: usize, (first, second): &Partition) {
        assert!(!first.is_empty() && !second.is_empty());
        assert!(first.len() >= min, "first group has {} < {}", first.len(), min);
        assert!(second.len() >= min, "second group has {} < {}", second.len(), min);
        let mut all: Vec<usize> = first.iter().chain(second.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_requires_two_items() {
        let one = vec![Envelope::new_2d(0.0, 0.0, 1.0, 1.0)];
        assert!(matches!(
            QuadraticSplit.split(&one, 1),
            Err(SpatialError::InvariantViolation(_))
        ));
        assert!(matches!(
            AxisSplit.split(&[], 1),
            Err(SpatialError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_helpers_accept_no_items() {
        assert!(AxisSplit::candidate_orders(&[]).is_empty());
        assert_eq!(group_bounds(&[], &[]).dimension(), 0);
    }

    #[test]
    fn test_quadratic_separates_clusters() {
        let items = vec![
            Envelope::new_2d(0.0, 0.0, 1.0, 1.0),
            Envelope::new_2d(100.0, 100.0, 101.0, 101.0),
            Envelope::new_2d(1.0, 1.0, 2.0, 2.0),
            Envelope::new_2d(101.0, 101.0, 102.0, 102.0),
            Envelope::new_2d(0.5, 0.5, 1.5, 1.5),
        ];
        let (first, second) = QuadraticSplit.split(&items, 2).unwrap();
        let mut first = first;
        let mut second = second;
        first.sort_unstable();
        second.sort_unstable();
        let groups = [first, second];
        assert!(groups.contains(&vec![0, 2, 4]));
        assert!(groups.contains(&vec![1, 3]));
    }

    #[test]
    fn test_quadratic_respects_min_entries() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let max = rng.gen_range(2..16);
            let min = rng.gen_range(1..=max / 2);
            let items = random_boxes(&mut rng, max + 1);
            let partition = QuadraticSplit.split(&items, min).unwrap();
            assert_valid_partition(items.len(), min, &partition);
            assert!(partition.0.len() <= max && partition.1.len() <= max);
        }
    }

    #[test]
    fn test_quadratic_handles_points() {
        let items: Vec<_> = (0..9).map(|i| Envelope::point(&[i as f64, 0.0])).collect();
        let partition = QuadraticSplit.split(&items, 4).unwrap();
        assert_valid_partition(9, 4, &partition);
    }

    #[test]
    fn test_balanced_when_min_too_large() {
        let items: Vec<_> = (0..3)
            .map(|i| Envelope::new_2d(i as f64, 0.0, i as f64 + 1.0, 1.0))
            .collect();
        let partition = QuadraticSplit.split(&items, 5).unwrap();
        assert_valid_partition(3, 1, &partition);
        let partition = AxisSplit.split(&items, 5).unwrap();
        assert_valid_partition(3, 1, &partition);
    }

    #[test]
    fn test_axis_split_separates_clusters() {
        let items = vec![
            Envelope::new_2d(0.0, 0.0, 1.0, 1.0),
            Envelope::new_2d(50.0, 0.0, 51.0, 1.0),
            Envelope::new_2d(1.0, 0.0, 2.0, 1.0),
            Envelope::new_2d(52.0, 0.0, 53.0, 1.0),
        ];
        let (first, second) = AxisSplit.split(&items, 2).unwrap();
        assert_eq!(partition_cost(&items, &first, &second).overlap, 0.0);
        let mut first = first;
        first.sort_unstable();
        assert!(first == vec![0, 2] || first == vec![1, 3]);
    }

    #[test]
    fn test_axis_split_is_minimal_among_candidates() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let n = rng.gen_range(4..10);
            let min = rng.gen_range(1..=n / 2);
            let items = random_boxes(&mut rng, n);
            let partition = AxisSplit.split(&items, min).unwrap();
            assert_valid_partition(n, min, &partition);
            let chosen = partition_cost(&items, &partition.0, &partition.1);

            // brute force over every distribution the strategy considers
            let mut oracle: Option<SplitCost> = None;
            for order in AxisSplit::candidate_orders(&items) {
                for cut in min..=(n - min) {
                    let cost = partition_cost(&items, &order[..cut], &order[cut..]);
                    if oracle.map_or(true, |best| cost < best) {
                        oracle = Some(cost);
                    }
                }
            }
            let oracle = oracle.unwrap();
            assert!((chosen.overlap - oracle.overlap).abs() < 1e-9);
            assert!((chosen.perimeter - oracle.perimeter).abs() < 1e-9);
        }
    }

    #[test]
    fn test_axis_split_three_dimensions() {
        let items: Vec<_> = (0..7)
            .map(|i| {
                let z = if i % 2 == 0 { 0.0 } else { 100.0 };
                Envelope::new(vec![0.0, 0.0, z], vec![1.0, 1.0, z + 1.0])
            })
            .collect();
        let (first, second) = AxisSplit.split(&items, 3).unwrap();
        assert_eq!(partition_cost(&items, &first, &second).overlap, 0.0);
    }

    #[test]
    fn test_names() {
        assert_eq!(QuadraticSplit.name(), "quadratic");
        assert_eq!(AxisSplit.name(), "axis");
    }
}
