//! K-nearest-neighbor search.
//!
//! Best-first branch-and-bound: a priority queue holds nodes and entries
//! keyed by their minimum distance to the query point. Popping an entry
//! means no unexplored node or entry can be closer, so entries come out in
//! ascending distance. A bounded set of the `k` best distances seen so far
//! keeps anything farther out of the queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::envelope::validate_point;
use crate::store::NodeStore;

use super::rtree_impl::RTree;
use super::rtree_types::{EntryId, Neighbor, NodeId, NodeKind, SpatialError, SpatialResult};

/// A queued node or entry.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Candidate {
    Node { distance: f64, id: NodeId },
    Entry { distance: f64, id: EntryId, seq: u64 },
}

impl Candidate {
    fn distance(&self) -> f64 {
        match self {
            Candidate::Node { distance, .. } | Candidate::Entry { distance, .. } => *distance,
        }
    }

    /// Nodes come before entries at equal distance so that entries hidden in
    /// a node get a chance to win a tie on insertion order.
    fn rank(&self) -> (u8, u64) {
        match self {
            Candidate::Node { id, .. } => (0, *id),
            Candidate::Entry { seq, .. } => (1, *seq),
        }
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // reversed: BinaryHeap pops the greatest, we want the closest
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance()
            .total_cmp(&self.distance())
            .then_with(|| other.rank().cmp(&self.rank()))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Distance with a total order, for the max-heap of best distances.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Distance(f64);

impl Eq for Distance {}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `k` smallest entry distances queued so far.
struct BestDistances {
    k: usize,
    heap: BinaryHeap<Distance>,
}

impl BestDistances {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::new(),
        }
    }

    /// Could something at `distance` still be among the `k` nearest?
    fn admits(&self, distance: f64) -> bool {
        self.heap.len() < self.k || self.heap.peek().is_some_and(|worst| distance <= worst.0)
    }

    fn offer(&mut self, distance: f64) {
        if self.heap.len() < self.k {
            self.heap.push(Distance(distance));
        } else if self.heap.peek().is_some_and(|worst| distance < worst.0) {
            self.heap.pop();
            self.heap.push(Distance(distance));
        }
    }
}

impl<S: NodeStore> RTree<S> {
    /// The `k` entries closest to `point`, nearest first, optionally
    /// limited to those within `max_distance`.
    ///
    /// Distance is measured from the point to the closest point of each
    /// entry's envelope. Entries at equal distance are ordered by insertion.
    pub fn nearest(
        &self,
        point: &[f64],
        k: usize,
        max_distance: Option<f64>,
    ) -> SpatialResult<Vec<Neighbor>> {
        validate_point(point, self.dimension())?;
        if let Some(limit) = max_distance {
            if !limit.is_finite() || limit < 0.0 {
                return Err(SpatialError::InvalidEnvelope(format!(
                    "maximum distance must be finite and non-negative, got {}",
                    limit
                )));
            }
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let limit = max_distance.unwrap_or(f64::INFINITY);
        let mut best = BestDistances::new(k);
        let mut queue = BinaryHeap::new();
        queue.push(Candidate::Node {
            distance: 0.0,
            id: self.root_id(),
        });

        let mut results = Vec::with_capacity(k.min(self.size() as usize));
        while let Some(candidate) = queue.pop() {
            match candidate {
                Candidate::Entry { distance, id, .. } => {
                    results.push(Neighbor { id, distance });
                    if results.len() == k {
                        break;
                    }
                }
                Candidate::Node { distance, id } => {
                    if !best.admits(distance) {
                        continue;
                    }
                    match self.load(id)?.kind {
                        NodeKind::Leaf(entries) => {
                            for entry in entries {
                                let distance = entry.envelope.distance_to(point);
                                if distance <= limit && best.admits(distance) {
                                    best.offer(distance);
                                    queue.push(Candidate::Entry {
                                        distance,
                                        id: entry.id,
                                        seq: entry.seq,
                                    });
                                }
                            }
                        }
                        NodeKind::Internal(children) => {
                            for child in children {
                                let distance = child.bounds.distance_to(point);
                                if distance <= limit && best.admits(distance) {
                                    queue.push(Candidate::Node {
                                        distance,
                                        id: child.node,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(results)
    }

    /// Ids of the `min(k, size())` entries closest to `point`, nearest first.
    pub fn nearest_neighbors(&self, point: &[f64], k: usize) -> SpatialResult<Vec<EntryId>> {
        Ok(self
            .nearest(point, k, None)?
            .into_iter()
            .map(|neighbor| neighbor.id)
            .collect())
    }

    /// All entries within `distance` of `point`, nearest first.
    pub fn find_within_distance(&self, point: &[f64], distance: f64) -> SpatialResult<Vec<Neighbor>> {
        self.nearest(point, usize::MAX, Some(distance))
    }
}
