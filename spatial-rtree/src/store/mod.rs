//! Node storage backends.
//!
//! The tree never touches a storage medium directly. Every node it reads or
//! writes goes through a [`NodeStore`], so the same algorithms run over an
//! in-memory arena ([`MemoryNodeStore`]) or fixed-size pages in a file
//! ([`FileNodeStore`]). Other media (a database table keyed by node id, a
//! remote blob store) plug in by implementing the trait.
//!
//! Stores take `&self` everywhere and synchronize internally; the tree
//! serializes mutations itself.

mod file_store;
mod memory;
mod page_cache;
mod page_storage;

pub use file_store::{FileNodeStore, FileStoreConfig};
pub use memory::MemoryNodeStore;
pub use page_cache::PageCache;

use crate::rtree::{Node, NodeId, StorageError, StoreStats, TreeHeader};

/// Result type for node store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence boundary of the tree.
///
/// A store hands out node ids, keeps nodes addressable by id, and records the
/// tree metadata next to them. Calls may block on I/O; the tree does not
/// retry failed calls.
pub trait NodeStore: Send + Sync {
    /// Reserves a fresh id for a node that will be saved later.
    fn allocate_id(&self) -> StorageResult<NodeId>;

    /// Materializes the node stored under `id`.
    fn load_node(&self, id: NodeId) -> StorageResult<Node>;

    /// Stores `node` under `node.id`, replacing any previous version.
    fn save_node(&self, node: &Node) -> StorageResult<NodeId>;

    /// Releases the node stored under `id`; the id may be handed out again.
    fn delete_node(&self, id: NodeId) -> StorageResult<()>;

    /// Checks that `node` could be saved, without saving it.
    ///
    /// Stores with fixed-size slots return [`StorageError::PageOverflow`]
    /// for a node larger than a slot.
    fn check_fits(&self, _node: &Node) -> StorageResult<()> {
        Ok(())
    }

    /// Tree metadata, `None` if no tree was created in this store yet.
    fn load_header(&self) -> StorageResult<Option<TreeHeader>>;

    fn save_header(&self, header: &TreeHeader) -> StorageResult<()>;

    /// Removes every node and the tree metadata.
    fn clear(&self) -> StorageResult<()>;

    /// Makes every saved node and the metadata durable.
    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Flushes and rejects any further access.
    fn close(&self) -> StorageResult<()> {
        self.flush()
    }

    fn stats(&self) -> StoreStats;
}
