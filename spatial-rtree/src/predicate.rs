//! Search predicates.
//!
//! Every predicate carries a query envelope. The tree evaluates predicates
//! on bounding boxes only, in two roles:
//! 1. **Entry test**: does a stored envelope qualify as a result?
//! 2. **Subtree test**: can a node with the given bounds hold any qualifying
//!    entry? Subtrees failing this test are never visited.
//!
//! `BBox`, `Intersects`, `Contains` and `Disjoint` are decidable from boxes
//! alone and are answered exactly. The remaining predicates describe
//! relations between actual geometries; for them the entry test is a
//! necessary condition, so the cursor yields a superset of the true matches
//! and the caller refines candidates against real geometry.

use std::fmt::{self, Display};

use crate::envelope::Envelope;
use crate::rtree::{SpatialError, SpatialResult};

/// A spatial relation between stored envelopes and a query envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialPredicate {
    /// Stored envelope covers the query
    Contains(Envelope),
    /// Stored envelope shares at least one point with the query
    Intersects(Envelope),
    Equals(Envelope),
    /// Stored envelope shares no point with the query
    Disjoint(Envelope),
    /// Bounding-box overlap, same test as `Intersects`
    BBox(Envelope),
    /// Stored envelope lies inside the query
    Within(Envelope),
    Touches(Envelope),
    Overlaps(Envelope),
    /// Stored geometry is farther than the distance from the query
    Beyond(Envelope, f64),
    /// Stored geometry is within the distance of the query
    DWithin(Envelope, f64),
    Crosses(Envelope),
}

impl SpatialPredicate {
    /// The query envelope carried by the predicate.
    pub fn query(&self) -> &Envelope {
        match self {
            SpatialPredicate::Contains(q)
            | SpatialPredicate::Intersects(q)
            | SpatialPredicate::Equals(q)
            | SpatialPredicate::Disjoint(q)
            | SpatialPredicate::BBox(q)
            | SpatialPredicate::Within(q)
            | SpatialPredicate::Touches(q)
            | SpatialPredicate::Overlaps(q)
            | SpatialPredicate::Beyond(q, _)
            | SpatialPredicate::DWithin(q, _)
            | SpatialPredicate::Crosses(q) => q,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpatialPredicate::Contains(_) => "contains",
            SpatialPredicate::Intersects(_) => "intersects",
            SpatialPredicate::Equals(_) => "equals",
            SpatialPredicate::Disjoint(_) => "disjoint",
            SpatialPredicate::BBox(_) => "bbox",
            SpatialPredicate::Within(_) => "within",
            SpatialPredicate::Touches(_) => "touches",
            SpatialPredicate::Overlaps(_) => "overlaps",
            SpatialPredicate::Beyond(_, _) => "beyond",
            SpatialPredicate::DWithin(_, _) => "dwithin",
            SpatialPredicate::Crosses(_) => "crosses",
        }
    }

    /// Returns `true` if the cursor's results are exactly the matches, and
    /// `false` if they are candidates needing geometric refinement.
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            SpatialPredicate::BBox(_)
                | SpatialPredicate::Intersects(_)
                | SpatialPredicate::Contains(_)
                | SpatialPredicate::Disjoint(_)
        )
    }

    /// Checks the query envelope against the tree's dimension, and the
    /// distance threshold of `Beyond`/`DWithin` for being finite and >= 0.
    pub fn validate(&self, dimension: usize) -> SpatialResult<()> {
        self.query().validate(dimension)?;
        match self {
            SpatialPredicate::Beyond(_, d) | SpatialPredicate::DWithin(_, d)
                if !d.is_finite() || *d < 0.0 =>
            {
                Err(SpatialError::InvalidEnvelope(format!(
                    "distance threshold must be finite and non-negative, got {}",
                    d
                )))
            }
            _ => Ok(()),
        }
    }

    /// Entry test against a stored envelope.
    pub fn matches(&self, envelope: &Envelope) -> bool {
        match self {
            SpatialPredicate::BBox(q)
            | SpatialPredicate::Intersects(q)
            | SpatialPredicate::Touches(q)
            | SpatialPredicate::Overlaps(q)
            | SpatialPredicate::Crosses(q) => envelope.intersects(q),
            SpatialPredicate::Contains(q) => envelope.contains(q),
            SpatialPredicate::Within(q) => q.contains(envelope),
            SpatialPredicate::Equals(q) => envelope == q,
            SpatialPredicate::Disjoint(q) => !envelope.intersects(q),
            SpatialPredicate::DWithin(q, d) => envelope.distance_to_envelope(q) <= *d,
            // geometries inside boxes that are entirely within `d` of each
            // other cannot be farther apart than `d`
            SpatialPredicate::Beyond(q, d) => envelope.max_distance_to_envelope(q) > *d,
        }
    }

    /// Subtree test against the bounds of a node.
    pub fn may_match_within(&self, bounds: &Envelope) -> bool {
        if bounds.is_empty() {
            return false;
        }
        match self {
            SpatialPredicate::BBox(q)
            | SpatialPredicate::Intersects(q)
            | SpatialPredicate::Touches(q)
            | SpatialPredicate::Overlaps(q)
            | SpatialPredicate::Crosses(q)
            | SpatialPredicate::Within(q) => bounds.intersects(q),
            SpatialPredicate::Contains(q) | SpatialPredicate::Equals(q) => bounds.contains(q),
            // every entry below a node the query covers intersects the query
            SpatialPredicate::Disjoint(q) => !q.contains(bounds),
            SpatialPredicate::DWithin(q, d) => bounds.distance_to_envelope(q) <= *d,
            SpatialPredicate::Beyond(q, d) => bounds.max_distance_to_envelope(q) > *d,
        }
    }
}

impl Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialPredicate::Beyond(q, d) | SpatialPredicate::DWithin(q, d) => {
                write!(f, "({} {} within {})", self.name(), q, d)
            }
            _ => write!(f, "({} {})", self.name(), self.query()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q() -> Envelope {
        Envelope::new_2d(0.0, 0.0, 10.0, 10.0)
    }

    #[test]
    fn test_exactness() {
        assert!(SpatialPredicate::BBox(q()).is_exact());
        assert!(SpatialPredicate::Intersects(q()).is_exact());
        assert!(SpatialPredicate::Contains(q()).is_exact());
        assert!(SpatialPredicate::Disjoint(q()).is_exact());
        assert!(!SpatialPredicate::Within(q()).is_exact());
        assert!(!SpatialPredicate::Equals(q()).is_exact());
        assert!(!SpatialPredicate::Touches(q()).is_exact());
        assert!(!SpatialPredicate::DWithin(q(), 1.0).is_exact());
        assert!(!SpatialPredicate::Beyond(q(), 1.0).is_exact());
    }

    #[test]
    fn test_entry_tests() {
        let inside = Envelope::new_2d(2.0, 2.0, 3.0, 3.0);
        let outside = Envelope::new_2d(20.0, 20.0, 30.0, 30.0);
        let covering = Envelope::new_2d(-1.0, -1.0, 11.0, 11.0);
        let touching = Envelope::new_2d(10.0, 0.0, 12.0, 5.0);

        assert!(SpatialPredicate::Intersects(q()).matches(&inside));
        assert!(SpatialPredicate::Intersects(q()).matches(&touching));
        assert!(!SpatialPredicate::Intersects(q()).matches(&outside));

        assert!(SpatialPredicate::Contains(q()).matches(&covering));
        assert!(!SpatialPredicate::Contains(q()).matches(&inside));

        assert!(SpatialPredicate::Within(q()).matches(&inside));
        assert!(!SpatialPredicate::Within(q()).matches(&covering));

        assert!(SpatialPredicate::Disjoint(q()).matches(&outside));
        assert!(!SpatialPredicate::Disjoint(q()).matches(&touching));

        assert!(SpatialPredicate::Equals(q()).matches(&q()));
        assert!(!SpatialPredicate::Equals(q()).matches(&inside));
    }

    #[test]
    fn test_distance_predicates() {
        let near = Envelope::new_2d(13.0, 0.0, 14.0, 1.0);
        let far = Envelope::new_2d(100.0, 100.0, 101.0, 101.0);

        assert!(SpatialPredicate::DWithin(q(), 3.0).matches(&near));
        assert!(!SpatialPredicate::DWithin(q(), 2.9).matches(&near));
        assert!(!SpatialPredicate::DWithin(q(), 3.0).matches(&far));

        assert!(SpatialPredicate::Beyond(q(), 50.0).matches(&far));
        // farthest corners are within 20 of each other
        let small = Envelope::new_2d(1.0, 1.0, 2.0, 2.0);
        assert!(!SpatialPredicate::Beyond(q(), 20.0).matches(&small));
        assert!(SpatialPredicate::Beyond(q(), 5.0).matches(&small));
    }

    #[test]
    fn test_subtree_pruning() {
        let far_node = Envelope::new_2d(50.0, 50.0, 60.0, 60.0);
        let inner_node = Envelope::new_2d(1.0, 1.0, 9.0, 9.0);

        assert!(!SpatialPredicate::BBox(q()).may_match_within(&far_node));
        assert!(SpatialPredicate::BBox(q()).may_match_within(&inner_node));
        assert!(!SpatialPredicate::Contains(q()).may_match_within(&inner_node));
        assert!(!SpatialPredicate::Disjoint(q()).may_match_within(&inner_node));
        assert!(SpatialPredicate::Disjoint(q()).may_match_within(&far_node));
        assert!(!SpatialPredicate::Intersects(q()).may_match_within(&Envelope::empty(2)));
    }

    #[test]
    fn test_validate() {
        assert!(SpatialPredicate::BBox(q()).validate(2).is_ok());
        assert!(SpatialPredicate::BBox(q()).validate(3).is_err());
        assert!(SpatialPredicate::BBox(Envelope::new_2d(5.0, 0.0, 1.0, 1.0))
            .validate(2)
            .is_err());
        assert!(matches!(
            SpatialPredicate::DWithin(q(), -1.0).validate(2),
            Err(SpatialError::InvalidEnvelope(_))
        ));
        assert!(SpatialPredicate::Beyond(q(), f64::NAN).validate(2).is_err());
        assert!(SpatialPredicate::Beyond(q(), 0.0).validate(2).is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SpatialPredicate::Within(Envelope::new_2d(0.0, 0.0, 1.0, 1.0)).to_string(),
            "(within Envelope([0.0, 0.0], [1.0, 1.0]))"
        );
        assert_eq!(
            SpatialPredicate::DWithin(Envelope::new_2d(0.0, 0.0, 1.0, 1.0), 2.5).to_string(),
            "(dwithin Envelope([0.0, 0.0], [1.0, 1.0]) within 2.5)"
        );
    }
}
