//! Lazy search cursor.

use crate::predicate::SpatialPredicate;
use crate::store::NodeStore;

use super::rtree_types::{EntryId, Node, NodeId, NodeKind, SpatialResult};

/// A node being scanned and the position of the next item to look at.
struct Frame {
    node: Node,
    next: usize,
}

enum CursorState {
    /// Nothing read yet
    Pending { root: NodeId, dimension: usize },
    Walking(Vec<Frame>),
    Done,
}

/// Lazy, forward-only stream of the ids matching a [`SpatialPredicate`].
///
/// The cursor walks the tree depth-first with an explicit stack holding one
/// frame per level, so memory stays proportional to the tree height. Nodes
/// are loaded from the store only when the walk reaches them. Dropping the
/// cursor abandons the walk.
///
/// The first error (an invalid predicate or a failed node load) is yielded
/// once and ends the cursor.
pub struct SearchCursor<'a> {
    store: &'a dyn NodeStore,
    predicate: SpatialPredicate,
    state: CursorState,
}

impl<'a> SearchCursor<'a> {
    pub(crate) fn new(
        store: &'a dyn NodeStore,
        root: NodeId,
        dimension: usize,
        predicate: SpatialPredicate,
    ) -> Self {
        Self {
            store,
            predicate,
            state: CursorState::Pending { root, dimension },
        }
    }

    pub fn predicate(&self) -> &SpatialPredicate {
        &self.predicate
    }

    /// Load the root and set up the first frame.
    fn start(&mut self, root: NodeId, dimension: usize) -> SpatialResult<Vec<Frame>> {
        self.predicate.validate(dimension)?;
        let node = self.store.load_node(root)?;
        if self.predicate.may_match_within(&node.bounds) {
            Ok(vec![Frame { node, next: 0 }])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Advance the walk to the next matching entry.
fn walk(
    stack: &mut Vec<Frame>,
    store: &dyn NodeStore,
    predicate: &SpatialPredicate,
) -> Option<SpatialResult<EntryId>> {
    while let Some(frame) = stack.last_mut() {
        let descend = match &frame.node.kind {
            NodeKind::Leaf(entries) => {
                while let Some(entry) = entries.get(frame.next) {
                    frame.next += 1;
                    if predicate.matches(&entry.envelope) {
                        return Some(Ok(entry.id));
                    }
                }
                None
            }
            NodeKind::Internal(children) => {
                let mut descend = None;
                while let Some(child) = children.get(frame.next) {
                    frame.next += 1;
                    if predicate.may_match_within(&child.bounds) {
                        descend = Some(child.node);
                        break;
                    }
                }
                descend
            }
        };

        match descend {
            Some(child) => match store.load_node(child) {
                Ok(node) => stack.push(Frame { node, next: 0 }),
                Err(e) => return Some(Err(e.into())),
            },
            None => {
                stack.pop();
            }
        }
    }
    None
}

impl Iterator for SearchCursor<'_> {
    type Item = SpatialResult<EntryId>;

    fn next(&mut self) -> Option<Self::Item> {
        if let CursorState::Pending { root, dimension } = self.state {
            match self.start(root, dimension) {
                Ok(stack) => self.state = CursorState::Walking(stack),
                Err(e) => {
                    self.state = CursorState::Done;
                    return Some(Err(e));
                }
            }
        }

        let step = match &mut self.state {
            CursorState::Walking(stack) => walk(stack, self.store, &self.predicate),
            _ => return None,
        };
        match step {
            Some(Ok(id)) => Some(Ok(id)),
            other => {
                // exhausted or failed
                self.state = CursorState::Done;
                other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::rtree::{ChildRef, Entry, SpatialError, StorageError};
    use crate::store::MemoryNodeStore;

    fn entry(x: f64, id: EntryId) -> Entry {
        Entry {
            envelope: Envelope::new_2d(x, 0.0, x + 1.0, 1.0),
            id,
            seq: id,
        }
    }

    /// Root with two leaves: [0..2) and [10..12)
    fn two_level_store() -> (MemoryNodeStore, NodeId) {
        let store = MemoryNodeStore::new();
        let root_id = store.allocate_id().unwrap();
        let left_id = store.allocate_id().unwrap();
        let right_id = store.allocate_id().unwrap();

        let mut left = Node {
            id: left_id,
            parent: Some(root_id),
            level: 0,
            bounds: Envelope::empty(2),
            kind: NodeKind::Leaf(vec![entry(0.0, 1), entry(1.0, 2)]),
        };
        left.refresh_bounds();
        let mut right = Node {
            id: right_id,
            parent: Some(root_id),
            level: 0,
            bounds: Envelope::empty(2),
            kind: NodeKind::Leaf(vec![entry(10.0, 3), entry(11.0, 4)]),
        };
        right.refresh_bounds();
        let mut root = Node {
            id: root_id,
            parent: None,
            level: 1,
            bounds: Envelope::empty(2),
            kind: NodeKind::Internal(vec![
                ChildRef {
                    bounds: left.bounds.clone(),
                    node: left_id,
                },
                ChildRef {
                    bounds: right.bounds.clone(),
                    node: right_id,
                },
            ]),
        };
        root.refresh_bounds();

        for node in [&root, &left, &right] {
            store.save_node(node).unwrap();
        }
        (store, root_id)
    }

    #[test]
    fn test_walks_matching_subtrees_only() {
        let (store, root) = two_level_store();
        let cursor = SearchCursor::new(
            &store,
            root,
            2,
            SpatialPredicate::Intersects(Envelope::new_2d(10.5, 0.0, 20.0, 1.0)),
        );
        let ids: Vec<EntryId> = cursor.map(|r| r.unwrap()).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_nothing_read_before_first_next() {
        let store = MemoryNodeStore::new();
        // root id 0 does not exist: only next() notices
        let mut cursor = SearchCursor::new(
            &store,
            0,
            2,
            SpatialPredicate::BBox(Envelope::new_2d(0.0, 0.0, 1.0, 1.0)),
        );
        assert!(matches!(
            cursor.next(),
            Some(Err(SpatialError::Storage(StorageError::MissingNode(0))))
        ));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_missing_child_ends_the_walk() {
        let (store, root) = two_level_store();
        store.delete_node(1).unwrap();

        let mut cursor = SearchCursor::new(
            &store,
            root,
            2,
            SpatialPredicate::Intersects(Envelope::new_2d(0.0, 0.0, 20.0, 1.0)),
        );
        assert!(matches!(cursor.next(), Some(Err(SpatialError::Storage(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let (store, root) = two_level_store();
        let mut cursor = SearchCursor::new(
            &store,
            root,
            2,
            SpatialPredicate::Within(Envelope::new(vec![0.0], vec![1.0])),
        );
        assert!(matches!(
            cursor.next(),
            Some(Err(SpatialError::InvalidEnvelope(_)))
        ));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_empty_result() {
        let (store, root) = two_level_store();
        let mut cursor = SearchCursor::new(
            &store,
            root,
            2,
            SpatialPredicate::Intersects(Envelope::new_2d(50.0, 50.0, 60.0, 60.0)),
        );
        assert!(cursor.next().is_none());
        assert_eq!(
            cursor.predicate(),
            &SpatialPredicate::Intersects(Envelope::new_2d(50.0, 50.0, 60.0, 60.0))
        );
    }
}
