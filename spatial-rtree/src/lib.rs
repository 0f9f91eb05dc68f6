//! # Spatial R-Tree
//!
//! A balanced R-Tree indexing `N`-dimensional axis-aligned envelopes, each
//! tagged with an opaque [`EntryId`]. The tree answers predicate searches
//! and nearest-neighbor queries while its nodes live in a pluggable
//! [`NodeStore`].
//!
//! ## Features
//!
//! - **Any Dimension**: envelopes of a dimension fixed per tree
//! - **Pluggable Storage**: in-memory arena or fixed-size file pages
//! - **Lazy Search**: cursors load nodes only as the walk reaches them
//! - **Nearest Neighbors**: best-first branch-and-bound search
//! - **Bulk Loading**: Hilbert-ordered packing for static datasets
//! - **Pluggable Splits**: quadratic seed-and-grow or R*-style axis split
//!
//! ## Quick Start
//!
//! ```rust
//! use spatial_rtree::{Envelope, MemoryNodeStore, RTree, SpatialPredicate, TreeConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TreeConfig::new(2).with_max_entries(2).with_min_entries(1);
//! let mut tree = RTree::create(MemoryNodeStore::new(), config)?;
//!
//! tree.insert(Envelope::new_2d(0.0, 0.0, 10.0, 10.0), 1)?;
//! tree.insert(Envelope::new_2d(20.0, 20.0, 30.0, 30.0), 2)?;
//! tree.insert(Envelope::new_2d(5.0, 5.0, 15.0, 15.0), 3)?;
//!
//! let query = Envelope::new_2d(0.0, 0.0, 12.0, 12.0);
//! let mut found = tree
//!     .search(SpatialPredicate::BBox(query))
//!     .collect::<Result<Vec<_>, _>>()?;
//! found.sort_unstable();
//! assert_eq!(found, vec![1, 3]);
//!
//! assert_eq!(tree.nearest_neighbors(&[29.0, 29.0], 1)?, vec![2]);
//! # Ok(())
//! # }
//! ```
//!
//! ## File-Backed Trees
//!
//! ```rust,no_run
//! use spatial_rtree::{Envelope, FileNodeStore, RTree, TreeConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FileNodeStore::create("places.rtree")?;
//! let mut tree = RTree::create(store, TreeConfig::default())?;
//! tree.insert(Envelope::new_2d(0.0, 0.0, 1.0, 1.0), 7)?;
//! tree.close()?;
//!
//! // only the header page is read on open
//! let tree = RTree::open(FileNodeStore::open("places.rtree")?)?;
//! assert_eq!(tree.size(), 1);
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod hilbert;
pub mod predicate;
pub mod rtree;
pub mod split;
pub mod store;

pub use envelope::Envelope;
pub use predicate::SpatialPredicate;
pub use rtree::{
    EntryId, IntegrityReport, Neighbor, NodeFactory, NodeId, RTree, RTreeBuilder, RTreeStats,
    SearchCursor, SpatialError, SpatialResult, StorageError, StoreNodeFactory, TreeConfig,
};
pub use split::{AxisSplit, QuadraticSplit, SplitStrategy};
pub use store::{FileNodeStore, FileStoreConfig, MemoryNodeStore, NodeStore};
