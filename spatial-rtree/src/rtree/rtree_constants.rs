//! Constants for the R-Tree and its file-backed node store.

/// Default page size (16KB) - balances I/O efficiency and memory usage
pub const PAGE_SIZE: usize = 16384;

/// Default maximum number of items per node
pub const DEFAULT_MAX_ENTRIES: usize = 64;

/// Default minimum number of items before underflow (about 40% of max)
pub const DEFAULT_MIN_ENTRIES: usize = 25;

/// Default number of dimensions
pub const DEFAULT_DIMENSION: usize = 2;

/// Default cache size in number of pages (16MB with 16KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Hilbert curve order used to sort entries for bulk loading
pub const BULK_LOAD_HILBERT_ORDER: u32 = 16;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x53525452; // "SRTR"

/// File format version
pub const VERSION: u32 = 1;
