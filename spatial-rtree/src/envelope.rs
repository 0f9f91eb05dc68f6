use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::rtree::{SpatialError, SpatialResult};

/// An N-dimensional axis-aligned bounding box.
///
/// `Envelope` describes a hyper-rectangle by its lower corner (`low`) and its
/// upper corner (`high`). Every entry stored in the tree is keyed by an
/// envelope, and every node caches the envelope covering its contents.
///
/// All geometric operations are pure. An envelope handed to the tree must be
/// well-formed for the tree's dimension (see [`Envelope::validate`]); the
/// tree rejects malformed envelopes before touching any state.
///
/// # Examples
///
/// ```rust
/// use spatial_rtree::Envelope;
///
/// let a = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
/// let b = Envelope::new_2d(5.0, 5.0, 15.0, 15.0);
///
/// assert!(a.intersects(&b));
/// assert_eq!(a.overlap_area(&b), 25.0);
/// assert_eq!(a.union(&b), Envelope::new_2d(0.0, 0.0, 15.0, 15.0));
/// ```
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Envelope {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl Eq for Envelope {}

impl Hash for Envelope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for v in self.low.iter().chain(self.high.iter()) {
            v.to_bits().hash(state);
        }
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope({:?}, {:?})", self.low, self.high)
    }
}

impl Envelope {
    /// Creates an envelope from its lower and upper corners.
    ///
    /// No validation happens here; use [`Envelope::validate`] to check
    /// the envelope against a dimension.
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Envelope {
        Envelope { low, high }
    }

    /// Creates a 2-dimensional envelope.
    pub fn new_2d(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Envelope {
        Envelope::new(vec![min_x, min_y], vec![max_x, max_y])
    }

    /// Creates a degenerate envelope covering a single point.
    pub fn point(coords: &[f64]) -> Envelope {
        Envelope::new(coords.to_vec(), coords.to_vec())
    }

    /// The empty envelope of the given dimension.
    ///
    /// Its lower corner is `+∞` and its upper corner `-∞`, so the union with
    /// any envelope yields that envelope. It covers the contents of an empty
    /// leaf and is never accepted as input.
    pub fn empty(dimension: usize) -> Envelope {
        Envelope::new(
            vec![f64::INFINITY; dimension],
            vec![f64::NEG_INFINITY; dimension],
        )
    }

    /// Returns `true` for the empty envelope (or any inverted one).
    pub fn is_empty(&self) -> bool {
        self.low.iter().zip(&self.high).any(|(lo, hi)| lo > hi)
    }

    pub fn dimension(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Length of the envelope along `axis`.
    pub fn extent(&self, axis: usize) -> f64 {
        (self.high[axis] - self.low[axis]).max(0.0)
    }

    /// Product of all extents. Zero for the empty envelope.
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (0..self.dimension()).map(|axis| self.extent(axis)).product()
    }

    /// Generalized perimeter: `2 * Σ extent_i`.
    pub fn perimeter(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        2.0 * (0..self.dimension()).map(|axis| self.extent(axis)).sum::<f64>()
    }

    /// Center point of the envelope.
    pub fn center(&self) -> Vec<f64> {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(lo, hi)| (lo + hi) / 2.0)
            .collect()
    }

    pub fn contains_point(&self, point: &[f64]) -> bool {
        self.low
            .iter()
            .zip(&self.high)
            .zip(point)
            .all(|((lo, hi), p)| p >= lo && p <= hi)
    }

    /// Checks if this envelope fully covers `other`.
    pub fn contains(&self, other: &Envelope) -> bool {
        self.low
            .iter()
            .zip(&self.high)
            .zip(other.low.iter().zip(&other.high))
            .all(|((lo, hi), (olo, ohi))| olo >= lo && ohi <= hi)
    }

    /// Checks if the two envelopes share at least one point. Touching
    /// boundaries count as an intersection.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.low
            .iter()
            .zip(&self.high)
            .zip(other.low.iter().zip(&other.high))
            .all(|((lo, hi), (olo, ohi))| lo <= ohi && hi >= olo)
    }

    /// Smallest envelope covering both.
    pub fn union(&self, other: &Envelope) -> Envelope {
        let mut merged = self.clone();
        merged.expand(other);
        merged
    }

    /// Grows this envelope in place to cover `other`.
    pub fn expand(&mut self, other: &Envelope) {
        for (lo, olo) in self.low.iter_mut().zip(&other.low) {
            *lo = lo.min(*olo);
        }
        for (hi, ohi) in self.high.iter_mut().zip(&other.high) {
            *hi = hi.max(*ohi);
        }
    }

    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }
        Some(Envelope::new(
            self.low.iter().zip(&other.low).map(|(a, b)| a.max(*b)).collect(),
            self.high.iter().zip(&other.high).map(|(a, b)| a.min(*b)).collect(),
        ))
    }

    /// Area shared by both envelopes, 0 when they are disjoint or only touch.
    pub fn overlap_area(&self, other: &Envelope) -> f64 {
        self.intersection(other).map_or(0.0, |shared| shared.area())
    }

    /// Area this envelope must grow by to also cover `other`.
    pub fn enlargement(&self, other: &Envelope) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Euclidean distance from `point` to the closest point of the envelope,
    /// 0 when the point lies inside.
    pub fn distance_to(&self, point: &[f64]) -> f64 {
        if self.contains_point(point) {
            return 0.0;
        }
        self.low
            .iter()
            .zip(&self.high)
            .zip(point)
            .map(|((lo, hi), p)| {
                let d = p - p.clamp(*lo, *hi);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Minimum Euclidean distance between any two points of the envelopes.
    pub fn distance_to_envelope(&self, other: &Envelope) -> f64 {
        (0..self.dimension())
            .map(|axis| {
                let gap = (other.low[axis] - self.high[axis])
                    .max(self.low[axis] - other.high[axis])
                    .max(0.0);
                gap * gap
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Maximum Euclidean distance between any two points of the envelopes.
    pub fn max_distance_to_envelope(&self, other: &Envelope) -> f64 {
        (0..self.dimension())
            .map(|axis| {
                let span = (self.high[axis] - other.low[axis])
                    .abs()
                    .max((other.high[axis] - self.low[axis]).abs());
                span * span
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Checks that the envelope is well-formed for `dimension`: both corners
    /// have `dimension` finite coordinates and `low[i] <= high[i]`.
    pub fn validate(&self, dimension: usize) -> SpatialResult<()> {
        if self.low.len() != dimension || self.high.len() != dimension {
            return Err(SpatialError::InvalidEnvelope(format!(
                "expected {} dimensions, got {}/{}",
                dimension,
                self.low.len(),
                self.high.len()
            )));
        }
        for axis in 0..dimension {
            let (lo, hi) = (self.low[axis], self.high[axis]);
            if !lo.is_finite() || !hi.is_finite() {
                return Err(SpatialError::InvalidEnvelope(format!(
                    "non-finite bound on axis {}: [{}, {}]",
                    axis, lo, hi
                )));
            }
            if lo > hi {
                return Err(SpatialError::InvalidEnvelope(format!(
                    "inverted bound on axis {}: [{}, {}]",
                    axis, lo, hi
                )));
            }
        }
        Ok(())
    }

    /// Checks if this envelope is well-formed in its own dimension.
    pub fn is_valid(&self) -> bool {
        self.validate(self.dimension()).is_ok()
    }
}

/// Checks that `point` has `dimension` finite coordinates.
pub fn validate_point(point: &[f64], dimension: usize) -> SpatialResult<()> {
    if point.len() != dimension {
        return Err(SpatialError::InvalidEnvelope(format!(
            "expected a {}-dimensional point, got {} coordinates",
            dimension,
            point.len()
        )));
    }
    if point.iter().any(|v| !v.is_finite()) {
        return Err(SpatialError::InvalidEnvelope(format!(
            "non-finite point coordinate in {:?}",
            point
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_2d() {
        let env = Envelope::new_2d(1.0, 2.0, 3.0, 4.0);
        assert_eq!(env.low(), &[1.0, 2.0]);
        assert_eq!(env.high(), &[3.0, 4.0]);
        assert_eq!(env.dimension(), 2);
    }

    #[test]
    fn test_hash_and_equality() {
        let a = Envelope::new_2d(1.0, 2.0, 3.0, 4.0);
        let b = Envelope::new_2d(1.0, 2.0, 3.0, 4.0);
        let c = Envelope::new_2d(5.0, 6.0, 7.0, 8.0);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
        assert_ne!(a, c);
    }

    #[test]
    fn test_area_and_perimeter() {
        let env = Envelope::new_2d(0.0, 0.0, 10.0, 5.0);
        assert_eq!(env.area(), 50.0);
        assert_eq!(env.perimeter(), 30.0);

        let cube = Envelope::new(vec![0.0, 0.0, 0.0], vec![2.0, 3.0, 4.0]);
        assert_eq!(cube.area(), 24.0);
        assert_eq!(cube.perimeter(), 18.0);
    }

    #[test]
    fn test_empty() {
        let empty = Envelope::empty(2);
        assert!(empty.is_empty());
        assert_eq!(empty.area(), 0.0);
        assert_eq!(empty.perimeter(), 0.0);

        let env = Envelope::new_2d(1.0, 1.0, 2.0, 2.0);
        assert_eq!(empty.union(&env), env);
        assert!(!empty.intersects(&env));
    }

    #[test]
    fn test_center() {
        let env = Envelope::new_2d(-10.0, -5.0, 10.0, 5.0);
        assert_eq!(env.center(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_contains_point() {
        let env = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
        assert!(env.contains_point(&[5.0, 5.0]));
        assert!(env.contains_point(&[0.0, 0.0]));
        assert!(env.contains_point(&[10.0, 10.0]));
        assert!(!env.contains_point(&[-1.0, 5.0]));
        assert!(!env.contains_point(&[11.0, 5.0]));
    }

    #[test]
    fn test_contains() {
        let outer = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
        let inner = Envelope::new_2d(2.0, 2.0, 8.0, 8.0);
        let partial = Envelope::new_2d(5.0, 5.0, 15.0, 15.0);

        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&partial));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_intersects() {
        let a = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
        let b = Envelope::new_2d(5.0, 5.0, 15.0, 15.0);
        let c = Envelope::new_2d(20.0, 20.0, 30.0, 30.0);
        let touching = Envelope::new_2d(10.0, 10.0, 20.0, 20.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(a.intersects(&touching));
    }

    #[test]
    fn test_union_and_intersection() {
        let a = Envelope::new_2d(0.0, 0.0, 5.0, 5.0);
        let b = Envelope::new_2d(3.0, 3.0, 10.0, 10.0);

        assert_eq!(a.union(&b), Envelope::new_2d(0.0, 0.0, 10.0, 10.0));
        assert_eq!(a.intersection(&b), Some(Envelope::new_2d(3.0, 3.0, 5.0, 5.0)));
        assert!(a
            .intersection(&Envelope::new_2d(20.0, 20.0, 30.0, 30.0))
            .is_none());
    }

    #[test]
    fn test_overlap_area() {
        let a = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
        let b = Envelope::new_2d(5.0, 5.0, 15.0, 15.0);
        let touching = Envelope::new_2d(10.0, 0.0, 20.0, 10.0);
        let far = Envelope::new_2d(50.0, 50.0, 60.0, 60.0);

        assert_eq!(a.overlap_area(&b), 25.0);
        assert_eq!(a.overlap_area(&touching), 0.0);
        assert_eq!(a.overlap_area(&far), 0.0);
        assert_eq!(a.overlap_area(&Envelope::empty(2)), 0.0);
        assert_eq!(Envelope::empty(2).overlap_area(&a), 0.0);
    }

    #[test]
    fn test_enlargement() {
        let a = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.enlargement(&Envelope::new_2d(2.0, 2.0, 3.0, 3.0)), 0.0);
        assert_eq!(a.enlargement(&Envelope::new_2d(0.0, 0.0, 20.0, 10.0)), 100.0);
    }

    #[test]
    fn test_distance_to_point() {
        let env = Envelope::new_2d(0.0, 0.0, 10.0, 10.0);
        assert_eq!(env.distance_to(&[5.0, 5.0]), 0.0);
        assert_eq!(env.distance_to(&[13.0, 14.0]), 5.0);
        assert_eq!(env.distance_to(&[-3.0, 5.0]), 3.0);
    }

    #[test]
    fn test_envelope_distances() {
        let a = Envelope::new_2d(0.0, 0.0, 1.0, 1.0);
        let b = Envelope::new_2d(4.0, 5.0, 5.0, 6.0);
        assert_eq!(a.distance_to_envelope(&b), 5.0);
        assert_eq!(a.distance_to_envelope(&a), 0.0);

        let c = Envelope::new_2d(3.0, 4.0, 3.0, 4.0);
        let origin = Envelope::point(&[0.0, 0.0]);
        assert_eq!(origin.max_distance_to_envelope(&c), 5.0);
        assert_eq!(a.max_distance_to_envelope(&a), 2f64.sqrt());
    }

    #[test]
    fn test_validate() {
        assert!(Envelope::new_2d(0.0, 0.0, 10.0, 10.0).validate(2).is_ok());
        assert!(Envelope::point(&[5.0, 5.0]).validate(2).is_ok());

        let inverted = Envelope::new_2d(10.0, 0.0, 0.0, 10.0);
        assert!(matches!(
            inverted.validate(2),
            Err(SpatialError::InvalidEnvelope(_))
        ));

        let nan = Envelope::new_2d(f64::NAN, 0.0, 1.0, 1.0);
        assert!(nan.validate(2).is_err());
        assert!(!nan.is_valid());

        let wrong_dim = Envelope::new(vec![0.0; 3], vec![1.0; 3]);
        assert!(wrong_dim.validate(2).is_err());
        assert!(wrong_dim.is_valid());

        assert!(Envelope::empty(2).validate(2).is_err());
    }

    #[test]
    fn test_validate_point() {
        assert!(validate_point(&[1.0, 2.0], 2).is_ok());
        assert!(validate_point(&[1.0], 2).is_err());
        assert!(validate_point(&[1.0, f64::NAN], 2).is_err());
    }

    #[test]
    fn test_display() {
        let env = Envelope::new_2d(1.0, 2.0, 3.0, 4.0);
        assert_eq!(format!("{}", env), "Envelope([1.0, 2.0], [3.0, 4.0])");
    }

    #[test]
    fn test_serialization() {
        let env = Envelope::new_2d(1.5, 2.5, 3.5, 4.5);
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }
}
