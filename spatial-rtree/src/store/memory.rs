//! In-memory node store.

use parking_lot::RwLock;

use super::{NodeStore, StorageResult};
use crate::rtree::{Node, NodeId, StorageError, StoreStats, TreeHeader};

/// Arena of node slots addressed by stable indices.
///
/// A node id is the index of its slot. Released slots go onto a free list
/// and are reused by later allocations, so ids stay small and dense.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    arena: RwLock<Arena>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    header: Option<TreeHeader>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently stored.
    pub fn len(&self) -> usize {
        self.arena.read().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeStore for MemoryNodeStore {
    fn allocate_id(&self) -> StorageResult<NodeId> {
        let mut arena = self.arena.write();
        if let Some(id) = arena.free.pop() {
            return Ok(id);
        }
        arena.slots.push(None);
        Ok((arena.slots.len() - 1) as NodeId)
    }

    fn load_node(&self, id: NodeId) -> StorageResult<Node> {
        self.arena
            .read()
            .slots
            .get(id as usize)
            .and_then(|slot| slot.clone())
            .ok_or(StorageError::MissingNode(id))
    }

    fn save_node(&self, node: &Node) -> StorageResult<NodeId> {
        let mut arena = self.arena.write();
        let slot = arena
            .slots
            .get_mut(node.id as usize)
            .ok_or(StorageError::MissingNode(node.id))?;
        *slot = Some(node.clone());
        Ok(node.id)
    }

    fn delete_node(&self, id: NodeId) -> StorageResult<()> {
        let mut arena = self.arena.write();
        match arena.slots.get_mut(id as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                arena.free.push(id);
                Ok(())
            }
            _ => Err(StorageError::MissingNode(id)),
        }
    }

    fn load_header(&self) -> StorageResult<Option<TreeHeader>> {
        Ok(self.arena.read().header.clone())
    }

    fn save_header(&self, header: &TreeHeader) -> StorageResult<()> {
        self.arena.write().header = Some(header.clone());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.arena.write() = Arena::default();
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            live_nodes: self.len() as u64,
            ..StoreStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::rtree::NodeKind;

    fn leaf(id: NodeId) -> Node {
        Node {
            id,
            parent: None,
            level: 0,
            bounds: Envelope::empty(2),
            kind: NodeKind::Leaf(vec![]),
        }
    }

    #[test]
    fn test_allocate_save_load() {
        let store = MemoryNodeStore::new();
        let id = store.allocate_id().unwrap();
        assert!(matches!(
            store.load_node(id),
            Err(StorageError::MissingNode(_))
        ));

        store.save_node(&leaf(id)).unwrap();
        assert_eq!(store.load_node(id).unwrap(), leaf(id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_reuses_slot() {
        let store = MemoryNodeStore::new();
        let a = store.allocate_id().unwrap();
        let b = store.allocate_id().unwrap();
        store.save_node(&leaf(a)).unwrap();
        store.save_node(&leaf(b)).unwrap();

        store.delete_node(a).unwrap();
        assert!(store.load_node(a).is_err());
        assert_eq!(store.allocate_id().unwrap(), a);
        assert_eq!(store.stats().live_nodes, 1);
    }

    #[test]
    fn test_delete_missing_node() {
        let store = MemoryNodeStore::new();
        assert!(store.delete_node(3).is_err());
        let id = store.allocate_id().unwrap();
        assert!(store.delete_node(id).is_err());
    }

    #[test]
    fn test_save_unallocated_id_fails() {
        let store = MemoryNodeStore::new();
        assert!(store.save_node(&leaf(5)).is_err());
    }

    #[test]
    fn test_header_and_clear() {
        let store = MemoryNodeStore::new();
        assert!(store.load_header().unwrap().is_none());

        let header = TreeHeader {
            dimension: 2,
            min_entries: 2,
            max_entries: 4,
            root: 0,
            height: 1,
            size: 0,
            next_seq: 0,
        };
        store.save_header(&header).unwrap();
        assert_eq!(store.load_header().unwrap(), Some(header));

        let id = store.allocate_id().unwrap();
        store.save_node(&leaf(id)).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(store.load_header().unwrap().is_none());
    }
}
