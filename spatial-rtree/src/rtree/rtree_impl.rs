//! RTree implementation.

use log::{debug, trace};

use crate::envelope::Envelope;
use crate::hilbert::hilbert_index_in;
use crate::predicate::SpatialPredicate;
use crate::split::{Partition, QuadraticSplit, SplitStrategy};
use crate::store::NodeStore;

use super::cursor::SearchCursor;
use super::node_factory::{NodeFactory, StoreNodeFactory};
use super::rtree_config::TreeConfig;
use super::rtree_constants::BULK_LOAD_HILBERT_ORDER;
use super::rtree_types::{
    ChildRef, Entry, EntryId, IntegrityReport, Node, NodeId, NodeKind, RTreeStats, SpatialError,
    SpatialResult, StorageError, TreeHeader,
};

/// A balanced R-Tree over `N`-dimensional envelopes.
///
/// Nodes live in the injected [`NodeStore`]; the tree keeps only its
/// metadata and the bounds of the root in memory. Every node is reached by
/// loading it from the store, so a file-backed store keeps memory bounded by
/// its page cache.
///
/// Mutations take `&mut self` and reads take `&self`, so a
/// [`SearchCursor`] can never observe a tree in the middle of a split.
///
/// A storage failure in the middle of a mutation is returned as is. Nodes
/// already written by that mutation are not rolled back.
pub struct RTree<S: NodeStore> {
    store: S,
    config: TreeConfig,
    split: Box<dyn SplitStrategy>,
    factory: Box<dyn NodeFactory>,
    header: TreeHeader,
    root_bounds: Envelope,
}

impl<S: NodeStore> RTree<S> {
    /// Create a new, empty tree with the default split strategy and node
    /// factory.
    pub fn create(store: S, config: TreeConfig) -> SpatialResult<Self> {
        Self::create_with(store, config, Box::new(QuadraticSplit), Box::new(StoreNodeFactory))
    }

    /// Reattach to the tree persisted in `store`.
    pub fn open(store: S) -> SpatialResult<Self> {
        Self::open_with(store, Box::new(QuadraticSplit), Box::new(StoreNodeFactory))
    }

    /// Build a packed tree from `entries` (see [`RTreeBuilder::bulk_load`]).
    ///
    /// [`RTreeBuilder::bulk_load`]: super::RTreeBuilder::bulk_load
    pub fn bulk_load<I>(store: S, config: TreeConfig, entries: I) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = (Envelope, EntryId)>,
    {
        Self::bulk_load_with(
            store,
            config,
            Box::new(QuadraticSplit),
            Box::new(StoreNodeFactory),
            entries,
            true,
        )
    }

    /// Create a new, empty tree, discarding anything already in the store.
    pub fn create_with(
        store: S,
        config: TreeConfig,
        split: Box<dyn SplitStrategy>,
        factory: Box<dyn NodeFactory>,
    ) -> SpatialResult<Self> {
        config.validate()?;
        check_node_capacity(&store, &config)?;
        store.clear()?;

        let mut tree = Self {
            store,
            config,
            split,
            factory,
            header: Self::empty_header(&config),
            root_bounds: Envelope::empty(config.dimension),
        };
        tree.init_root()?;

        debug!(
            "Created {}-dimensional R-Tree (fan-out {}..={}, split {})",
            config.dimension,
            config.min_entries,
            config.max_entries,
            tree.split.name()
        );
        Ok(tree)
    }

    /// Reattach to a persisted tree. Only the metadata and the root node are
    /// read.
    pub fn open_with(
        store: S,
        split: Box<dyn SplitStrategy>,
        factory: Box<dyn NodeFactory>,
    ) -> SpatialResult<Self> {
        let header = store
            .load_header()?
            .ok_or_else(|| SpatialError::InvalidConfig("store holds no tree".into()))?;
        let config = TreeConfig::from_header(&header);
        config.validate()?;
        check_node_capacity(&store, &config)?;

        let root = store.load_node(header.root)?;
        debug!(
            "Opened R-Tree with {} entries (height {}, root {})",
            header.size, header.height, header.root
        );

        Ok(Self {
            store,
            config,
            split,
            factory,
            header,
            root_bounds: root.bounds,
        })
    }

    /// Bulk-load `entries` into a new tree, packing nodes bottom-up.
    ///
    /// With `sort` set, entries are first ordered along a Hilbert curve
    /// through their centers; otherwise they are packed in the given order.
    /// Leaves and internal nodes are filled evenly, so every non-root node
    /// holds at least `max_entries / 2` items.
    pub fn bulk_load_with<I>(
        store: S,
        config: TreeConfig,
        split: Box<dyn SplitStrategy>,
        factory: Box<dyn NodeFactory>,
        entries: I,
        sort: bool,
    ) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = (Envelope, EntryId)>,
    {
        config.validate()?;
        check_node_capacity(&store, &config)?;

        let mut items = Vec::new();
        for (seq, (envelope, id)) in entries.into_iter().enumerate() {
            envelope.validate(config.dimension)?;
            items.push(Entry {
                envelope,
                id,
                seq: seq as u64,
            });
        }

        let mut tree = Self::create_with(store, config, split, factory)?;
        if items.is_empty() {
            return Ok(tree);
        }

        if sort {
            let mut extent = Envelope::empty(config.dimension);
            for item in &items {
                extent.expand(&item.envelope);
            }
            items.sort_by_cached_key(|item| {
                hilbert_index_in(&item.envelope.center(), &extent, BULK_LOAD_HILBERT_ORDER)
            });
        }

        let count = items.len();
        tree.pack(items)?;
        debug!(
            "Bulk loaded {} entries (height {}, sorted: {})",
            count, tree.header.height, sort
        );
        Ok(tree)
    }

    fn empty_header(config: &TreeConfig) -> TreeHeader {
        TreeHeader {
            dimension: config.dimension,
            min_entries: config.min_entries,
            max_entries: config.max_entries,
            root: 0,
            height: 1,
            size: 0,
            next_seq: 0,
        }
    }

    /// Install an empty leaf as the root and reset the metadata.
    fn init_root(&mut self) -> SpatialResult<()> {
        let root = self.new_node(None, 0, NodeKind::Leaf(Vec::new()))?;
        self.header = Self::empty_header(&self.config);
        self.header.root = root.id;
        self.write_node(&root)?;
        self.save_header()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Number of indexed entries
    pub fn size(&self) -> u64 {
        self.header.size
    }

    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }

    /// Number of levels; a tree whose root is a leaf has height 1.
    pub fn height(&self) -> usize {
        self.header.height
    }

    /// Union of all indexed envelopes, `None` for an empty tree.
    pub fn bounds(&self) -> Option<Envelope> {
        if self.root_bounds.is_empty() {
            None
        } else {
            Some(self.root_bounds.clone())
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give back the store, e.g. to reopen the tree later.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn stats(&self) -> RTreeStats {
        RTreeStats {
            total_entries: self.header.size,
            tree_height: self.header.height,
            store: self.store.stats(),
        }
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.header.root
    }

    pub(crate) fn load(&self, id: NodeId) -> SpatialResult<Node> {
        Ok(self.store.load_node(id)?)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Index `envelope` under `id`. Duplicate ids and envelopes are allowed.
    pub fn insert(&mut self, envelope: Envelope, id: EntryId) -> SpatialResult<()> {
        envelope.validate(self.config.dimension)?;

        let seq = self.header.next_seq;
        self.header.next_seq += 1;
        self.insert_entry(Entry { envelope, id, seq })?;
        self.header.size += 1;
        self.save_header()
    }

    /// Remove the entry indexed as `(envelope, id)`.
    ///
    /// Only one entry is removed when the same pair was inserted several
    /// times. Returns [`SpatialError::EntryNotFound`] and leaves the tree
    /// unchanged if there is no such entry.
    pub fn delete(&mut self, envelope: &Envelope, id: EntryId) -> SpatialResult<()> {
        envelope.validate(self.config.dimension)?;

        let (mut leaf, position) = self
            .find_leaf(envelope, id)?
            .ok_or(SpatialError::EntryNotFound { id })?;
        if let NodeKind::Leaf(entries) = &mut leaf.kind {
            entries.remove(position);
        }

        self.condense_tree(leaf)?;
        self.header.size -= 1;
        self.save_header()
    }

    /// Move the entry `(old, id)` to `new`, keeping its insertion order.
    pub fn update(&mut self, id: EntryId, old: &Envelope, new: Envelope) -> SpatialResult<()> {
        old.validate(self.config.dimension)?;
        new.validate(self.config.dimension)?;

        let (mut leaf, position) = self
            .find_leaf(old, id)?
            .ok_or(SpatialError::EntryNotFound { id })?;
        let fits = leaf.bounds.contains(&new);

        let NodeKind::Leaf(entries) = &mut leaf.kind else {
            return Err(SpatialError::InvariantViolation(format!(
                "node {} holding entry {} is not a leaf",
                leaf.id, id
            )));
        };

        if fits {
            // bounds can only shrink, adjust_tree tightens them upward
            entries[position].envelope = new;
            self.adjust_tree(leaf)?;
        } else {
            let entry = entries.remove(position);
            self.condense_tree(leaf)?;
            self.insert_entry(Entry {
                envelope: new,
                ..entry
            })?;
        }
        self.save_header()
    }

    /// Remove every entry, leaving an empty tree with the same configuration.
    pub fn clear(&mut self) -> SpatialResult<()> {
        self.store.clear()?;
        self.init_root()
    }

    /// Make all changes durable in the store.
    pub fn flush(&self) -> SpatialResult<()> {
        self.store.flush()?;
        Ok(())
    }

    /// Flush and close the store. Later operations fail if the store
    /// rejects access after closing.
    pub fn close(&self) -> SpatialResult<()> {
        self.store.close()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Lazily stream the ids of all entries satisfying `predicate`.
    ///
    /// Nothing is read until the first call to `next()`. An invalid
    /// predicate or a storage failure is yielded once as an error, after
    /// which the cursor is exhausted.
    pub fn search(&self, predicate: SpatialPredicate) -> SearchCursor<'_> {
        SearchCursor::new(&self.store, self.header.root, self.config.dimension, predicate)
    }

    /// Ids of entries whose envelope intersects `envelope`.
    pub fn find_intersecting_keys(&self, envelope: &Envelope) -> SpatialResult<Vec<EntryId>> {
        self.search(SpatialPredicate::Intersects(envelope.clone()))
            .collect()
    }

    /// Ids of entries whose envelope lies inside `envelope`.
    pub fn find_contained_keys(&self, envelope: &Envelope) -> SpatialResult<Vec<EntryId>> {
        self.search(SpatialPredicate::Within(envelope.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Insertion internals
    // ------------------------------------------------------------------

    fn insert_entry(&mut self, entry: Entry) -> SpatialResult<()> {
        let mut leaf = self.choose_leaf(&entry.envelope)?;
        match &mut leaf.kind {
            NodeKind::Leaf(entries) => entries.push(entry),
            NodeKind::Internal(_) => {
                return Err(SpatialError::InvariantViolation(format!(
                    "descent ended at internal node {}",
                    leaf.id
                )))
            }
        }
        self.adjust_tree(leaf)
    }

    /// Descend from the root to the leaf needing the least enlargement.
    fn choose_leaf(&self, envelope: &Envelope) -> SpatialResult<Node> {
        let mut node = self.load(self.header.root)?;
        loop {
            let next = match &node.kind {
                NodeKind::Leaf(_) => None,
                NodeKind::Internal(children) => {
                    let index = self.choose_subtree(children, envelope)?;
                    Some(children[index].node)
                }
            };
            match next {
                Some(child) => node = self.load(child)?,
                None => return Ok(node),
            }
        }
    }

    /// Child needing the least area enlargement; ties go to the smaller
    /// resulting area, then to the child with fewer items.
    fn choose_subtree(
        &self,
        children: &[ChildRef],
        envelope: &Envelope,
    ) -> SpatialResult<usize> {
        let keys: Vec<(f64, f64)> = children
            .iter()
            .map(|child| {
                let enlargement = child.bounds.enlargement(envelope);
                (enlargement, child.bounds.area() + enlargement)
            })
            .collect();

        let best = keys
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)))
            .copied()
            .ok_or_else(|| {
                SpatialError::InvariantViolation("internal node without children".into())
            })?;

        let tied: Vec<usize> = (0..children.len())
            .filter(|&i| keys[i] == best)
            .collect();
        if tied.len() == 1 {
            return Ok(tied[0]);
        }

        // fewer children only matters on exact ties, load just those
        let mut chosen = tied[0];
        let mut fewest = usize::MAX;
        for index in tied {
            let len = self.load(children[index].node)?.len();
            if len < fewest {
                fewest = len;
                chosen = index;
            }
        }
        Ok(chosen)
    }

    /// Save `node` after a change to its contents and carry the change
    /// towards the root, splitting overflowing nodes on the way.
    fn adjust_tree(&mut self, mut node: Node) -> SpatialResult<()> {
        loop {
            node.refresh_bounds();
            let sibling = if node.len() > self.config.max_entries {
                Some(self.split_node(&mut node)?)
            } else {
                None
            };
            self.write_node(&node)?;

            let Some(parent_id) = node.parent else {
                if let Some(sibling) = sibling {
                    self.grow_root(node, sibling)?;
                }
                return Ok(());
            };

            let mut parent = self.load(parent_id)?;
            let index = self.position_in_parent(&parent, node.id)?;
            let NodeKind::Internal(children) = &mut parent.kind else {
                return Err(SpatialError::InvariantViolation(format!(
                    "parent {} of node {} is a leaf",
                    parent_id, node.id
                )));
            };

            let changed = children[index].bounds != node.bounds;
            children[index].bounds = node.bounds.clone();
            match sibling {
                Some(sibling) => children.push(sibling.as_child_ref()),
                // ancestors already cover this node
                None if !changed => return Ok(()),
                None => {}
            }
            node = parent;
        }
    }

    /// Split an overflowing node in place, returning the saved new sibling.
    fn split_node(&mut self, node: &mut Node) -> SpatialResult<Node> {
        let partition = self
            .split
            .split(&node.item_bounds(), self.config.min_entries)?;

        let placeholder = match &node.kind {
            NodeKind::Leaf(_) => NodeKind::Leaf(Vec::new()),
            NodeKind::Internal(_) => NodeKind::Internal(Vec::new()),
        };
        let (kept, moved) = match std::mem::replace(&mut node.kind, placeholder) {
            NodeKind::Leaf(entries) => {
                let (a, b) = distribute(entries, &partition)?;
                (NodeKind::Leaf(a), NodeKind::Leaf(b))
            }
            NodeKind::Internal(children) => {
                let (a, b) = distribute(children, &partition)?;
                (NodeKind::Internal(a), NodeKind::Internal(b))
            }
        };
        node.kind = kept;
        node.refresh_bounds();

        let mut sibling = self.new_node(node.parent, node.level, moved)?;
        sibling.refresh_bounds();

        if let NodeKind::Internal(children) = &sibling.kind {
            for child in children {
                let mut moved_child = self.load(child.node)?;
                moved_child.parent = Some(sibling.id);
                self.write_node(&moved_child)?;
            }
        }
        self.write_node(&sibling)?;

        trace!(
            "Split node {} at level {} into {} + {} items (new sibling {})",
            node.id,
            node.level,
            node.len(),
            sibling.len(),
            sibling.id
        );
        Ok(sibling)
    }

    /// Replace the root by a new internal node over the two split halves.
    fn grow_root(&mut self, mut old_root: Node, mut sibling: Node) -> SpatialResult<()> {
        let kind = NodeKind::Internal(vec![old_root.as_child_ref(), sibling.as_child_ref()]);
        let mut root = self.new_node(None, old_root.level + 1, kind)?;
        root.refresh_bounds();

        self.header.root = root.id;
        self.header.height += 1;

        old_root.parent = Some(root.id);
        sibling.parent = Some(root.id);
        self.write_node(&old_root)?;
        self.write_node(&sibling)?;
        self.write_node(&root)?;

        trace!(
            "Root split, new root {} (height {})",
            root.id,
            self.header.height
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletion internals
    // ------------------------------------------------------------------

    /// Find the leaf holding `(envelope, id)`, visiting only subtrees whose
    /// bounds contain `envelope`.
    fn find_leaf(&self, envelope: &Envelope, id: EntryId) -> SpatialResult<Option<(Node, usize)>> {
        let root = self.load(self.header.root)?;
        if !root.bounds.contains(envelope) {
            return Ok(None);
        }

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match &node.kind {
                NodeKind::Leaf(entries) => {
                    if let Some(position) = entries
                        .iter()
                        .position(|e| e.id == id && e.envelope == *envelope)
                    {
                        return Ok(Some((node, position)));
                    }
                }
                NodeKind::Internal(children) => {
                    for child in children.iter().rev() {
                        if child.bounds.contains(envelope) {
                            stack.push(self.load(child.node)?);
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// Walk from a leaf that lost an entry up to the root, detaching
    /// underflowing nodes and tightening bounds, then reinsert the entries
    /// of detached nodes.
    fn condense_tree(&mut self, mut node: Node) -> SpatialResult<()> {
        let mut orphans = Vec::new();

        while let Some(parent_id) = node.parent {
            let mut parent = self.load(parent_id)?;
            let index = self.position_in_parent(&parent, node.id)?;
            let NodeKind::Internal(children) = &mut parent.kind else {
                return Err(SpatialError::InvariantViolation(format!(
                    "parent {} of node {} is a leaf",
                    parent_id, node.id
                )));
            };

            if node.len() < self.config.min_entries {
                children.remove(index);
                self.dissolve(node, &mut orphans)?;
            } else {
                node.refresh_bounds();
                self.write_node(&node)?;
                children[index].bounds = node.bounds.clone();
            }
            node = parent;
        }

        // node is the root now
        if !node.is_leaf() && node.is_empty() {
            node.kind = NodeKind::Leaf(Vec::new());
            node.level = 0;
            self.header.height = 1;
        }
        node.refresh_bounds();
        self.write_node(&node)?;
        self.shrink_root()?;

        if !orphans.is_empty() {
            trace!("Reinserting {} entries from underflowing nodes", orphans.len());
        }
        for entry in orphans {
            self.insert_entry(entry)?;
        }
        Ok(())
    }

    /// Delete `node` and everything below it, collecting the leaf entries.
    fn dissolve(&self, node: Node, out: &mut Vec<Entry>) -> SpatialResult<()> {
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            self.store.delete_node(node.id)?;
            match node.kind {
                NodeKind::Leaf(entries) => out.extend(entries),
                NodeKind::Internal(children) => {
                    for child in children {
                        stack.push(self.load(child.node)?);
                    }
                }
            }
        }
        Ok(())
    }

    /// While the root is internal with a single child, promote that child.
    fn shrink_root(&mut self) -> SpatialResult<()> {
        loop {
            let root = self.load(self.header.root)?;
            let child_id = match &root.kind {
                NodeKind::Internal(children) if children.len() == 1 => children[0].node,
                _ => return Ok(()),
            };

            let mut child = self.load(child_id)?;
            child.parent = None;
            self.header.root = child.id;
            self.header.height -= 1;
            self.write_node(&child)?;
            self.store.delete_node(root.id)?;

            trace!(
                "Root collapsed into node {} (height {})",
                child.id,
                self.header.height
            );
        }
    }

    // ------------------------------------------------------------------
    // Bulk loading internals
    // ------------------------------------------------------------------

    /// Pack entries into full leaves, then pack each level into parents
    /// until a single root remains.
    fn pack(&mut self, entries: Vec<Entry>) -> SpatialResult<()> {
        let max = self.config.max_entries;
        let size = entries.len() as u64;
        self.store.delete_node(self.header.root)?;

        let mut level = 0;
        let mut nodes = Vec::new();
        let mut remaining = entries.into_iter();
        for group in pack_sizes(size as usize, max) {
            let chunk: Vec<Entry> = remaining.by_ref().take(group).collect();
            let mut leaf = self.new_node(None, level, NodeKind::Leaf(chunk))?;
            leaf.refresh_bounds();
            nodes.push(leaf);
        }

        while nodes.len() > 1 {
            level += 1;
            let mut parents = Vec::new();
            let mut remaining = nodes.into_iter();
            for group in pack_sizes(remaining.len(), max) {
                let mut children: Vec<Node> = remaining.by_ref().take(group).collect();
                let refs = children.iter().map(Node::as_child_ref).collect();
                let mut parent = self.new_node(None, level, NodeKind::Internal(refs))?;
                parent.refresh_bounds();
                for child in &mut children {
                    child.parent = Some(parent.id);
                    self.write_node(child)?;
                }
                parents.push(parent);
            }
            nodes = parents;
        }

        let root = nodes.pop().ok_or_else(|| {
            SpatialError::InvariantViolation("bulk load produced no root".into())
        })?;
        self.header.root = root.id;
        self.header.height = level as usize + 1;
        self.header.size = size;
        self.header.next_seq = size;
        self.write_node(&root)?;
        self.save_header()
    }

    // ------------------------------------------------------------------
    // Integrity
    // ------------------------------------------------------------------

    /// Walk the whole tree and report every structural problem found:
    /// stale bounds, fan-out violations, leaves at different depths, broken
    /// parent links and a size that does not match the entry count.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport::new();
        let root_level = self.header.height.saturating_sub(1) as u32;
        let mut stack: Vec<(NodeId, Option<NodeId>, u32, Option<Envelope>)> =
            vec![(self.header.root, None, root_level, None)];

        while let Some((id, parent, level, recorded)) = stack.pop() {
            let node = match self.store.load_node(id) {
                Ok(node) => node,
                Err(e) => {
                    report.fail(format!("Node {}: {}", id, e));
                    continue;
                }
            };
            report.nodes_checked += 1;

            if node.id != id {
                report.fail(format!("Node {} is stored as node {}", id, node.id));
            }
            if node.parent != parent {
                report.fail(format!(
                    "Node {} links to parent {:?}, expected {:?}",
                    id, node.parent, parent
                ));
            }
            if node.level != level || node.is_leaf() != (level == 0) {
                report.fail(format!(
                    "Node {} sits at level {} (leaf: {}), expected level {}",
                    id,
                    node.level,
                    node.is_leaf(),
                    level
                ));
            }
            if node.compute_bounds() != node.bounds {
                report.fail(format!(
                    "Node {} bounds {} differ from the union of its contents {}",
                    id,
                    node.bounds,
                    node.compute_bounds()
                ));
            }
            if let Some(recorded) = recorded {
                if recorded != node.bounds {
                    report.fail(format!(
                        "Parent records bounds {} for node {} with bounds {}",
                        recorded, id, node.bounds
                    ));
                }
            }

            let len = node.len();
            if len > self.config.max_entries {
                report.fail(format!("Node {} overflows with {} items", id, len));
            }
            match parent {
                Some(_) if len < self.config.min_entries => {
                    report.fail(format!("Node {} underflows with {} items", id, len));
                }
                None if !node.is_leaf() && len < 2 => {
                    report.fail(format!("Internal root {} has {} children", id, len));
                }
                _ => {}
            }

            match &node.kind {
                NodeKind::Leaf(entries) => {
                    report.entries_found += entries.len() as u64;
                    for entry in entries {
                        if let Err(e) = entry.envelope.validate(self.config.dimension) {
                            report.fail(format!("Entry {} in node {}: {}", entry.id, id, e));
                        }
                    }
                }
                NodeKind::Internal(children) => {
                    for child in children {
                        stack.push((
                            child.node,
                            Some(node.id),
                            level.saturating_sub(1),
                            Some(child.bounds.clone()),
                        ));
                    }
                }
            }
        }

        if report.entries_found != self.header.size {
            report.fail(format!(
                "Tree records {} entries but holds {}",
                self.header.size, report.entries_found
            ));
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn new_node(&self, parent: Option<NodeId>, level: u32, kind: NodeKind) -> SpatialResult<Node> {
        self.factory.create_node(
            &self.store,
            parent,
            level,
            Envelope::empty(self.config.dimension),
            kind,
        )
    }

    fn write_node(&mut self, node: &Node) -> SpatialResult<()> {
        self.store.save_node(node)?;
        if node.id == self.header.root {
            self.root_bounds = node.bounds.clone();
        }
        Ok(())
    }

    fn save_header(&self) -> SpatialResult<()> {
        self.store.save_header(&self.header)?;
        Ok(())
    }

    fn position_in_parent(&self, parent: &Node, child: NodeId) -> SpatialResult<usize> {
        parent.child_index(child).ok_or_else(|| {
            SpatialError::InvariantViolation(format!(
                "node {} is not a child of its parent {}",
                child, parent.id
            ))
        })
    }
}

/// Checks that a node holding `max_entries` items of either kind fits in
/// the store.
fn check_node_capacity<S: NodeStore>(store: &S, config: &TreeConfig) -> SpatialResult<()> {
    let corner = vec![0.0; config.dimension];
    let envelope = Envelope::new(corner.clone(), corner);
    let full_leaf = NodeKind::Leaf(vec![
        Entry {
            envelope: envelope.clone(),
            id: EntryId::MAX,
            seq: u64::MAX,
        };
        config.max_entries
    ]);
    let full_internal = NodeKind::Internal(vec![
        ChildRef {
            bounds: envelope.clone(),
            node: NodeId::MAX,
        };
        config.max_entries
    ]);

    for kind in [full_leaf, full_internal] {
        let node = Node {
            id: NodeId::MAX,
            parent: Some(NodeId::MAX),
            level: u32::MAX,
            bounds: envelope.clone(),
            kind,
        };
        match store.check_fits(&node) {
            Ok(()) => {}
            Err(StorageError::PageOverflow { size, max }) => {
                return Err(SpatialError::InvalidConfig(format!(
                    "a node of {} items needs {} bytes but the store holds at most {}",
                    config.max_entries, size, max
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Move items into the two groups of a split, checking that the partition
/// uses every position exactly once.
fn distribute<T>(items: Vec<T>, partition: &Partition) -> SpatialResult<(Vec<T>, Vec<T>)> {
    let (first, second) = partition;
    if first.is_empty() || second.is_empty() || first.len() + second.len() != items.len() {
        return Err(SpatialError::InvariantViolation(format!(
            "split of {} items produced groups of {} and {}",
            items.len(),
            first.len(),
            second.len()
        )));
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut take = |positions: &[usize]| -> SpatialResult<Vec<T>> {
        positions
            .iter()
            .map(|&p| {
                slots.get_mut(p).and_then(Option::take).ok_or_else(|| {
                    SpatialError::InvariantViolation(format!(
                        "split position {} is out of range or repeated",
                        p
                    ))
                })
            })
            .collect()
    };
    let kept = take(first)?;
    let moved = take(second)?;
    Ok((kept, moved))
}

/// Sizes of `ceil(n / max)` groups holding `n` items as evenly as possible.
fn pack_sizes(n: usize, max: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let groups = n.div_ceil(max);
    let base = n / groups;
    let extra = n % groups;
    (0..groups)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}
