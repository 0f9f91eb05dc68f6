//! File-backed node store.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use super::page_cache::PageCache;
use super::page_storage::{FileHeader, FreePage, PageStorage};
use super::{NodeStore, StorageResult};
use crate::rtree::rtree_constants::{DEFAULT_CACHE_PAGES, PAGE_SIZE};
use crate::rtree::{Node, NodeId, SpatialError, SpatialResult, StorageError, StoreStats, TreeHeader};

/// Smallest page size a file store accepts.
const MIN_PAGE_SIZE: usize = 256;

/// Tuning knobs for a [`FileNodeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreConfig {
    /// Size of every page in bytes, fixed when the file is created
    pub page_size: usize,
    /// Number of pages kept in the LRU cache
    pub cache_pages: usize,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

impl FileStoreConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_pages(mut self, cache_pages: usize) -> Self {
        self.cache_pages = cache_pages;
        self
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(SpatialError::InvalidConfig(format!(
                "page size must be at least {} bytes, got {}",
                MIN_PAGE_SIZE, self.page_size
            )));
        }
        if self.cache_pages == 0 {
            return Err(SpatialError::InvalidConfig(
                "cache must hold at least one page".into(),
            ));
        }
        Ok(())
    }
}

/// Internal statistics tracking
#[derive(Default)]
struct StoreStatistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

/// Node store keeping one node per fixed-size page of a single file.
///
/// Nodes are read lazily: opening a store reads only the header page, and
/// every other page is loaded on first access and kept in an LRU cache.
/// Saved nodes stay dirty in the cache until they are evicted or the store
/// is flushed. Released pages are chained into a free list stored in the
/// pages themselves and reused by later allocations.
pub struct FileNodeStore {
    storage: PageStorage,
    cache: Mutex<PageCache>,
    header: RwLock<FileHeader>,
    stats: StoreStatistics,
    closed: AtomicBool,
}

impl FileNodeStore {
    /// Create a new store file at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::create_with_config(path, FileStoreConfig::default())
    }

    pub fn create_with_config(path: impl AsRef<Path>, config: FileStoreConfig) -> SpatialResult<Self> {
        config.validate()?;
        let storage = PageStorage::create(path.as_ref(), config.page_size)?;
        let header = FileHeader::new(config.page_size);
        storage.write_header(&header)?;
        storage.sync()?;

        debug!(
            "Created node store at {:?} (page size {}, cache {} pages)",
            path.as_ref(),
            config.page_size,
            config.cache_pages
        );
        Ok(Self::with_parts(storage, header, config.cache_pages))
    }

    /// Open an existing store file. Only the header page is read.
    pub fn open(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::open_with_cache_size(path, DEFAULT_CACHE_PAGES)
    }

    pub fn open_with_cache_size(path: impl AsRef<Path>, cache_pages: usize) -> SpatialResult<Self> {
        let (storage, header) = PageStorage::open(path.as_ref())?;
        FileStoreConfig {
            page_size: header.page_size as usize,
            cache_pages,
        }
        .validate()?;

        debug!(
            "Opened node store at {:?} ({} pages, {} free)",
            path.as_ref(),
            header.next_page_id,
            header.free_page_count
        );
        Ok(Self::with_parts(storage, header, cache_pages))
    }

    fn with_parts(storage: PageStorage, header: FileHeader, cache_pages: usize) -> Self {
        Self {
            storage,
            cache: Mutex::new(PageCache::new(cache_pages)),
            header: RwLock::new(header),
            stats: StoreStatistics::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn page_size(&self) -> usize {
        self.storage.page_size()
    }

    /// Number of released pages waiting to be reused.
    pub fn free_page_count(&self) -> u64 {
        self.header.read().free_page_count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_closed(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_page(&self, id: NodeId) -> StorageResult<()> {
        if id == 0 || id >= self.header.read().next_page_id {
            return Err(StorageError::MissingNode(id));
        }
        Ok(())
    }

    /// Add a node to the cache, writing out a dirty page it pushes out.
    fn cache_node(&self, cache: &mut PageCache, id: NodeId, node: Node, dirty: bool) -> StorageResult<()> {
        if let Some((evicted_id, evicted)) = cache.insert(id, node, dirty) {
            self.storage.write_page(evicted_id, &evicted)?;
            self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn write_dirty_pages(&self) -> StorageResult<()> {
        let mut cache = self.cache.lock();
        for page_id in cache.dirty_pages() {
            if let Some(cached) = cache.peek(page_id) {
                self.storage.write_page(page_id, &cached.node)?;
                self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
            }
            cache.mark_clean(page_id);
        }
        Ok(())
    }
}

impl NodeStore for FileNodeStore {
    fn allocate_id(&self) -> StorageResult<NodeId> {
        self.check_closed()?;
        let mut header = self.header.write();

        if header.free_list_head != 0 {
            let page_id = header.free_list_head;
            let free_page = self.storage.read_free_page(page_id)?;
            self.stats.disk_reads.fetch_add(1, Ordering::Relaxed);
            header.free_list_head = free_page.next_free;
            header.free_page_count = header.free_page_count.saturating_sub(1);
            return Ok(page_id);
        }

        let page_id = header.next_page_id;
        header.next_page_id += 1;
        Ok(page_id)
    }

    fn load_node(&self, id: NodeId) -> StorageResult<Node> {
        self.check_closed()?;
        self.check_page(id)?;

        if let Some(node) = self.cache.lock().get(id) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node.clone());
        }

        // the cache stays unlocked during the disk read
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.stats.disk_reads.fetch_add(1, Ordering::Relaxed);
        let node = self.storage.read_page(id).map_err(|e| match e {
            // allocated but never written
            StorageError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                StorageError::MissingNode(id)
            }
            other => other,
        })?;
        if node.id != id {
            return Err(StorageError::Corrupted {
                page: id,
                reason: format!("page holds node {}", node.id),
            });
        }

        let mut cache = self.cache.lock();
        // a save that raced the read wins over the disk copy
        if let Some(cached) = cache.get(id) {
            return Ok(cached.clone());
        }
        self.cache_node(&mut cache, id, node.clone(), false)?;
        Ok(node)
    }

    fn save_node(&self, node: &Node) -> StorageResult<NodeId> {
        self.check_closed()?;
        self.check_page(node.id)?;
        self.check_fits(node)?;

        let mut cache = self.cache.lock();
        self.cache_node(&mut cache, node.id, node.clone(), true)?;
        Ok(node.id)
    }

    fn delete_node(&self, id: NodeId) -> StorageResult<()> {
        self.check_closed()?;
        self.check_page(id)?;

        self.cache.lock().remove(id);

        let mut header = self.header.write();
        self.storage.write_free_page(
            id,
            &FreePage {
                next_free: header.free_list_head,
            },
        )?;
        self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
        header.free_list_head = id;
        header.free_page_count += 1;
        Ok(())
    }

    fn check_fits(&self, node: &Node) -> StorageResult<()> {
        let size = PageStorage::encoded_len(node)?;
        if size > self.storage.page_size() {
            return Err(StorageError::PageOverflow {
                size,
                max: self.storage.page_size(),
            });
        }
        Ok(())
    }

    fn load_header(&self) -> StorageResult<Option<TreeHeader>> {
        self.check_closed()?;
        Ok(self.header.read().tree.clone())
    }

    fn save_header(&self, tree: &TreeHeader) -> StorageResult<()> {
        self.check_closed()?;
        self.header.write().tree = Some(tree.clone());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.check_closed()?;

        self.cache.lock().clear();
        let mut header = self.header.write();
        *header = FileHeader::new(self.storage.page_size());
        self.storage.truncate()?;
        self.storage.write_header(&header)?;
        self.storage.sync()?;
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.check_closed()?;
        self.write_dirty_pages()?;
        self.storage.write_header(&self.header.read())?;
        self.storage.sync()
    }

    fn close(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.closed.store(true, Ordering::Release);
        debug!("Closed node store");
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        let header = self.header.read();
        StoreStats {
            live_nodes: header
                .next_page_id
                .saturating_sub(1)
                .saturating_sub(header.free_page_count),
            cached_pages: self.cache.lock().len() as u64,
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            disk_reads: self.stats.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.stats.disk_writes.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FileNodeStore {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.flush() {
                warn!("Failed to flush node store on drop: {}", e);
            }
        }
    }
}
