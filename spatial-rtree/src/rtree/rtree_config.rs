//! Tree configuration and builder.

use crate::split::{QuadraticSplit, SplitStrategy};
use crate::store::NodeStore;

use super::node_factory::{NodeFactory, StoreNodeFactory};
use super::rtree_constants::{DEFAULT_DIMENSION, DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES};
use super::rtree_impl::RTree;
use super::rtree_types::{EntryId, SpatialError, SpatialResult, TreeHeader};
use crate::envelope::Envelope;

/// Immutable shape of a tree: dimension and fan-out bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    pub dimension: usize,
    pub min_entries: usize,
    pub max_entries: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            min_entries: DEFAULT_MIN_ENTRIES,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl TreeConfig {
    /// Creates a configuration for `dimension` with the default fan-out.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_min_entries(mut self, min_entries: usize) -> Self {
        self.min_entries = min_entries;
        self
    }

    /// Sets both fan-out bounds, deriving `min_entries` as 40% of `max_entries`.
    pub fn with_fan_out(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self.min_entries = (max_entries * 2 / 5).max(1);
        self
    }

    /// Checks `dimension >= 1`, `max_entries >= 2` and
    /// `1 <= min_entries <= max_entries / 2`.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.dimension == 0 {
            return Err(SpatialError::InvalidConfig(
                "dimension must be at least 1".into(),
            ));
        }
        if self.max_entries < 2 {
            return Err(SpatialError::InvalidConfig(format!(
                "max_entries must be at least 2, got {}",
                self.max_entries
            )));
        }
        if self.min_entries == 0 || self.min_entries > self.max_entries / 2 {
            return Err(SpatialError::InvalidConfig(format!(
                "min_entries must be in 1..={}, got {}",
                self.max_entries / 2,
                self.min_entries
            )));
        }
        Ok(())
    }

    pub(crate) fn from_header(header: &TreeHeader) -> Self {
        Self {
            dimension: header.dimension,
            min_entries: header.min_entries,
            max_entries: header.max_entries,
        }
    }
}

/// Assembles an [`RTree`] from a store, a configuration and the pluggable
/// split and node-construction capabilities.
///
/// # Example
///
/// ```rust
/// use spatial_rtree::{AxisSplit, Envelope, MemoryNodeStore, RTreeBuilder, TreeConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut tree = RTreeBuilder::new(MemoryNodeStore::new())
///     .config(TreeConfig::new(2).with_max_entries(8).with_min_entries(3))
///     .split_strategy(AxisSplit)
///     .create()?;
///
/// tree.insert(Envelope::new_2d(0.0, 0.0, 1.0, 1.0), 7)?;
/// assert_eq!(tree.size(), 1);
/// # Ok(())
/// # }
/// ```
pub struct RTreeBuilder<S: NodeStore> {
    store: S,
    config: TreeConfig,
    split: Box<dyn SplitStrategy>,
    factory: Box<dyn NodeFactory>,
}

impl<S: NodeStore> RTreeBuilder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: TreeConfig::default(),
            split: Box::new(QuadraticSplit),
            factory: Box::new(StoreNodeFactory),
        }
    }

    pub fn config(mut self, config: TreeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn split_strategy(mut self, split: impl SplitStrategy + 'static) -> Self {
        self.split = Box::new(split);
        self
    }

    pub fn node_factory(mut self, factory: impl NodeFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Creates a new, empty tree in the store.
    pub fn create(self) -> SpatialResult<RTree<S>> {
        RTree::create_with(self.store, self.config, self.split, self.factory)
    }

    /// Reattaches to the tree persisted in the store. The configuration
    /// recorded in the store wins over the builder's.
    pub fn open(self) -> SpatialResult<RTree<S>> {
        RTree::open_with(self.store, self.split, self.factory)
    }

    /// Builds a packed tree from `entries`, sorting them along a Hilbert curve.
    pub fn bulk_load<I>(self, entries: I) -> SpatialResult<RTree<S>>
    where
        I: IntoIterator<Item = (Envelope, EntryId)>,
    {
        RTree::bulk_load_with(self.store, self.config, self.split, self.factory, entries, true)
    }

    /// Builds a packed tree from entries already in spatial order.
    pub fn bulk_load_sorted<I>(self, entries: I) -> SpatialResult<RTree<S>>
    where
        I: IntoIterator<Item = (Envelope, EntryId)>,
    {
        RTree::bulk_load_with(self.store, self.config, self.split, self.factory, entries, false)
    }
}
