//! LRU cache for node pages.
//!
//! Pages enter the cache only when first read or written; nothing is
//! preloaded. Writes mark a page dirty, and a dirty page leaving the cache is
//! handed back to the caller so it can be written to disk.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::rtree::{Node, NodeId};

/// A cached page with its data and dirty flag
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub node: Node,
    pub dirty: bool,
}

/// LRU cache for node pages
pub struct PageCache {
    pages: LruCache<NodeId, CachedPage>,
}

impl PageCache {
    /// Create a new page cache holding at most `max_pages` pages (at least one)
    pub fn new(max_pages: usize) -> Self {
        let cap = NonZeroUsize::new(max_pages.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            pages: LruCache::new(cap),
        }
    }

    /// Get a page from cache, updating LRU order.
    pub fn get(&mut self, page_id: NodeId) -> Option<&Node> {
        self.pages.get(&page_id).map(|cached| &cached.node)
    }

    /// Insert a page. Returns the least recently used page if it had to
    /// make room for this one and that page is dirty.
    pub fn insert(&mut self, page_id: NodeId, node: Node, dirty: bool) -> Option<(NodeId, Node)> {
        let dirty = dirty || self.pages.peek(&page_id).is_some_and(|c| c.dirty);
        match self.pages.push(page_id, CachedPage { node, dirty }) {
            Some((evicted_id, evicted)) if evicted_id != page_id && evicted.dirty => {
                Some((evicted_id, evicted.node))
            }
            _ => None,
        }
    }

    /// Ids of all dirty pages
    pub fn dirty_pages(&self) -> Vec<NodeId> {
        self.pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Peek at a page without touching LRU order
    pub fn peek(&self, page_id: NodeId) -> Option<&CachedPage> {
        self.pages.peek(&page_id)
    }

    pub fn mark_clean(&mut self, page_id: NodeId) {
        if let Some(cached) = self.pages.peek_mut(&page_id) {
            cached.dirty = false;
        }
    }

    /// Remove a page from cache, discarding it
    pub fn remove(&mut self, page_id: NodeId) -> Option<CachedPage> {
        self.pages.pop(&page_id)
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: NodeId) -> bool {
        self.pages.contains(&page_id)
    }
}
