//! Core types and data structures for the R-Tree.
//!
//! This module defines the fundamental types used throughout the tree:
//! - Error types and result types
//! - Node types (Leaf and Internal) and leaf entries
//! - Tree metadata persisted by node stores
//! - Statistics and integrity reports

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::Envelope;

// ============================================================================
// Error Types
// ============================================================================

/// Failures raised by a node store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupted page {page}: {reason}")]
    Corrupted { page: NodeId, reason: String },

    #[error("Node {0} does not exist")]
    MissingNode(NodeId),

    #[error("Node too large: {size} bytes (max {max})")]
    PageOverflow { size: usize, max: usize },

    #[error("Store is closed")]
    Closed,
}

/// Errors that can occur in spatial index operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Entry {id} not found")]
    EntryNotFound { id: EntryId },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<io::Error> for SpatialError {
    fn from(err: io::Error) -> Self {
        SpatialError::Storage(StorageError::Io(err))
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Opaque identifier attached to each indexed envelope.
pub type EntryId = u64;

/// Identifier of a node inside its store (arena slot or file page).
pub type NodeId = u64;

// ============================================================================
// Node Types
// ============================================================================

/// An entry in a leaf node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub envelope: Envelope,
    pub id: EntryId,
    /// Insertion sequence, breaks distance ties in nearest-neighbor search.
    pub seq: u64,
}

/// A child reference in an internal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    pub bounds: Envelope,
    pub node: NodeId,
}

/// Contents of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Leaf node containing actual entries
    Leaf(Vec<Entry>),
    /// Internal node containing child references
    Internal(Vec<ChildRef>),
}

/// A node of the tree.
///
/// `parent` is a non-owning link into the same store, used only to walk
/// bounding-box changes towards the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Height above the leaf level (leaves are 0)
    pub level: u32,
    pub bounds: Envelope,
    pub kind: NodeKind,
}

impl Node {
    /// Get the bounding box enclosing all children/entries
    pub fn compute_bounds(&self) -> Envelope {
        let mut bounds = Envelope::empty(self.bounds.dimension());
        match &self.kind {
            NodeKind::Leaf(entries) => {
                for e in entries {
                    bounds.expand(&e.envelope);
                }
            }
            NodeKind::Internal(children) => {
                for c in children {
                    bounds.expand(&c.bounds);
                }
            }
        }
        bounds
    }

    /// Recomputes the cached bounds, returning `true` if they changed.
    pub fn refresh_bounds(&mut self) -> bool {
        let bounds = self.compute_bounds();
        if bounds != self.bounds {
            self.bounds = bounds;
            true
        } else {
            false
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn len(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.len(),
            NodeKind::Internal(children) => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Envelopes of the node's items, in order.
    pub fn item_bounds(&self) -> Vec<Envelope> {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.iter().map(|e| e.envelope.clone()).collect(),
            NodeKind::Internal(children) => children.iter().map(|c| c.bounds.clone()).collect(),
        }
    }

    /// Position of `child` among this node's children.
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        match &self.kind {
            NodeKind::Internal(children) => children.iter().position(|c| c.node == child),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Reference to this node as stored in its parent.
    pub fn as_child_ref(&self) -> ChildRef {
        ChildRef {
            bounds: self.bounds.clone(),
            node: self.id,
        }
    }
}

// ============================================================================
// Tree Metadata
// ============================================================================

/// Tree metadata kept by the node store next to the nodes themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub dimension: usize,
    pub min_entries: usize,
    pub max_entries: usize,
    pub root: NodeId,
    /// Number of levels, a lone leaf root has height 1
    pub height: usize,
    pub size: u64,
    pub next_seq: u64,
}

// ============================================================================
// Query Results and Statistics
// ============================================================================

/// A nearest-neighbor match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: EntryId,
    pub distance: f64,
}

/// Statistics about store activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub live_nodes: u64,
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

/// Statistics about the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub tree_height: usize,
    pub store: StoreStats,
}

/// Findings of a full structural walk of the tree.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub nodes_checked: u64,
    pub entries_found: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            nodes_checked: 0,
            entries_found: 0,
            errors: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}
