//! Node construction.

use crate::envelope::Envelope;
use crate::store::NodeStore;

use super::rtree_types::{Node, NodeId, NodeKind, SpatialResult};

/// Creates every node the tree needs, on construction and on split.
///
/// The tree never builds a [`Node`] itself; swapping the factory changes how
/// node ids are chosen or how fresh nodes are prepared without touching the
/// tree algorithms. The returned node is not saved yet.
pub trait NodeFactory: Send + Sync {
    fn create_node(
        &self,
        store: &dyn NodeStore,
        parent: Option<NodeId>,
        level: u32,
        bounds: Envelope,
        kind: NodeKind,
    ) -> SpatialResult<Node>;
}

/// Default factory: takes a fresh id from the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreNodeFactory;

impl NodeFactory for StoreNodeFactory {
    fn create_node(
        &self,
        store: &dyn NodeStore,
        parent: Option<NodeId>,
        level: u32,
        bounds: Envelope,
        kind: NodeKind,
    ) -> SpatialResult<Node> {
        let id = store.allocate_id()?;
        Ok(Node {
            id,
            parent,
            level,
            bounds,
            kind,
        })
    }
}
