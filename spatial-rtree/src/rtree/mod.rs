//! Balanced R-Tree over a pluggable node store.
//!
//! This module holds the tree itself and the types shared with its
//! collaborators:
//! - Insertion with least-enlargement descent and split propagation
//! - Deletion with condensing of underflowing nodes and reinsertion
//! - Lazy predicate search through a [`SearchCursor`]
//! - Best-first nearest-neighbor search
//! - Hilbert-ordered bulk loading
//!
//! The tree reaches nodes only through a [`NodeStore`](crate::store::NodeStore)
//! and creates them only through a [`NodeFactory`].

mod cursor;
mod nearest;
pub mod node_factory;
pub mod rtree_config;
pub mod rtree_constants;
mod rtree_impl;
pub mod rtree_types;

pub use cursor::SearchCursor;
pub use node_factory::{NodeFactory, StoreNodeFactory};
pub use rtree_config::{RTreeBuilder, TreeConfig};
pub use rtree_constants::{DEFAULT_CACHE_PAGES, DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES, PAGE_SIZE};
pub use rtree_impl::RTree;
pub use rtree_types::{
    ChildRef, Entry, EntryId, IntegrityReport, Neighbor, Node, NodeId, NodeKind, RTreeStats,
    SpatialError, SpatialResult, StorageError, StoreStats, TreeHeader,
};
