//! Paged file I/O for the file-backed node store.
//!
//! The file is a sequence of fixed-size pages. Page 0 holds the
//! [`FileHeader`]; every other page holds either a node wrapped with a CRC32
//! checksum or a link in the chain of free pages. Each read or write touches
//! exactly one page.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::StorageResult;
use crate::rtree::rtree_constants::{MAGIC, PAGE_SIZE, VERSION};
use crate::rtree::{Node, NodeId, StorageError, TreeHeader};

/// File header stored in page 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub next_page_id: NodeId,
    pub free_list_head: NodeId,
    pub free_page_count: u64,
    pub tree: Option<TreeHeader>,
}

impl FileHeader {
    pub fn new(page_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size as u32,
            next_page_id: 1,
            free_list_head: 0,
            free_page_count: 0,
            tree: None,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.magic != MAGIC {
            return Err(StorageError::Corrupted {
                page: 0,
                reason: "invalid file format (bad magic)".into(),
            });
        }
        if self.version != VERSION {
            return Err(StorageError::Corrupted {
                page: 0,
                reason: format!("unsupported file format version {}", self.version),
            });
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new(PAGE_SIZE)
    }
}

/// A free page in the free list chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreePage {
    /// Next free page in the chain (0 = end of chain)
    pub next_free: NodeId,
}

/// A node wrapped with a CRC32 checksum for corruption detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithChecksum {
    pub checksum: u32,
    pub node: Node,
}

impl PageWithChecksum {
    pub fn new(node: Node) -> StorageResult<Self> {
        let checksum = crc32(&encode(&node)?);
        Ok(Self { checksum, node })
    }

    /// Verify checksum and consume self to return node
    pub fn into_node(self, page_id: NodeId) -> StorageResult<Node> {
        let expected = crc32(&encode(&self.node)?);
        if self.checksum != expected {
            return Err(StorageError::Corrupted {
                page: page_id,
                reason: format!(
                    "checksum mismatch (expected: {:x}, got: {:x})",
                    expected, self.checksum
                ),
            });
        }
        Ok(self.node)
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// CRC32-MPEG2 over `data`
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}

/// Reads and writes individual pages of the backing file.
pub struct PageStorage {
    file: Mutex<File>,
    page_size: usize,
}

impl PageStorage {
    /// Create (or truncate) the backing file
    pub fn create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            page_size,
        })
    }

    /// Open an existing file and read its header
    pub fn open(path: &Path) -> StorageResult<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        // the header fits in the smallest page we ever write
        let mut buffer = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        Read::by_ref(&mut file)
            .take(PAGE_SIZE as u64)
            .read_to_end(&mut buffer)?;
        let header: FileHeader = decode(&buffer)?;
        header.validate()?;

        let storage = Self {
            file: Mutex::new(file),
            page_size: header.page_size as usize,
        };
        Ok((storage, header))
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn write_header(&self, header: &FileHeader) -> StorageResult<()> {
        let bytes = encode(header)?;
        self.write_raw(0, bytes)
    }

    /// Read a single node page, verifying its checksum
    pub fn read_page(&self, page_id: NodeId) -> StorageResult<Node> {
        let buffer = self.read_raw(page_id)?;
        let page: PageWithChecksum = decode(&buffer)?;
        page.into_node(page_id)
    }

    /// Write a single node page with checksum
    pub fn write_page(&self, page_id: NodeId, node: &Node) -> StorageResult<()> {
        let bytes = encode(&PageWithChecksum::new(node.clone())?)?;
        self.write_raw(page_id, bytes)
    }

    pub fn read_free_page(&self, page_id: NodeId) -> StorageResult<FreePage> {
        decode(&self.read_raw(page_id)?)
    }

    pub fn write_free_page(&self, page_id: NodeId, free_page: &FreePage) -> StorageResult<()> {
        self.write_raw(page_id, encode(free_page)?)
    }

    /// Encoded size of `node` as it would be written to a page
    pub fn encoded_len(node: &Node) -> StorageResult<usize> {
        // checksum prefix plus the node itself
        Ok(4 + encode(node)?.len())
    }

    pub fn sync(&self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Drops every page after the header
    pub fn truncate(&self) -> StorageResult<()> {
        self.file.lock().set_len(self.page_size as u64)?;
        Ok(())
    }

    fn read_raw(&self, page_id: NodeId) -> StorageResult<Vec<u8>> {
        if page_id == 0 {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot read page 0 (reserved for header)",
            )));
        }

        let offset = page_id * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; self.page_size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_raw(&self, page_id: NodeId, mut bytes: Vec<u8>) -> StorageResult<()> {
        if bytes.len() > self.page_size {
            return Err(StorageError::PageOverflow {
                size: bytes.len(),
                max: self.page_size,
            });
        }
        bytes.resize(self.page_size, 0);

        let offset = page_id * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::rtree::{ChildRef, Entry, NodeKind};
    use tempfile::tempdir;

    fn leaf_with(id: NodeId, n: usize) -> Node {
        let entries = (0..n)
            .map(|i| Entry {
                envelope: Envelope::new_2d(i as f64, 0.0, i as f64 + 1.0, 1.0),
                id: i as u64,
                seq: i as u64,
            })
            .collect();
        let mut node = Node {
            id,
            parent: Some(7),
            level: 0,
            bounds: Envelope::empty(2),
            kind: NodeKind::Leaf(entries),
        };
        node.refresh_bounds();
        node
    }

    #[test]
    fn test_storage_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let storage = PageStorage::create(&path, PAGE_SIZE).unwrap();
        storage.write_header(&FileHeader::default()).unwrap();
        drop(storage);

        let (storage, header) = PageStorage::open(&path).unwrap();
        assert_eq!(header, FileHeader::default());
        assert_eq!(storage.page_size(), PAGE_SIZE);
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.rtree");
        let storage = PageStorage::create(&path, PAGE_SIZE).unwrap();
        let mut header = FileHeader::default();
        header.magic = 0xDEADBEEF;
        storage.write_header(&header).unwrap();

        assert!(matches!(
            PageStorage::open(&path),
            Err(StorageError::Corrupted { page: 0, .. })
        ));
    }

    #[test]
    fn test_page_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let storage = PageStorage::create(&path, PAGE_SIZE).unwrap();

        let leaf = leaf_with(1, 5);
        let internal = Node {
            id: 2,
            parent: None,
            level: 1,
            bounds: leaf.bounds.clone(),
            kind: NodeKind::Internal(vec![ChildRef {
                bounds: leaf.bounds.clone(),
                node: 1,
            }]),
        };

        storage.write_page(1, &leaf).unwrap();
        storage.write_page(2, &internal).unwrap();
        assert_eq!(storage.read_page(1).unwrap(), leaf);
        assert_eq!(storage.read_page(2).unwrap(), internal);
    }

    #[test]
    fn test_page_zero_rejected_for_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let storage = PageStorage::create(&path, PAGE_SIZE).unwrap();
        assert!(storage.read_page(0).is_err());
    }

    #[test]
    fn test_page_overflow() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.rtree");
        let storage = PageStorage::create(&path, 256).unwrap();
        let result = storage.write_page(1, &leaf_with(1, 50));
        assert!(matches!(result, Err(StorageError::PageOverflow { .. })));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let leaf = leaf_with(1, 3);
        let mut page = PageWithChecksum::new(leaf.clone()).unwrap();
        assert_eq!(page.clone().into_node(1).unwrap(), leaf);

        page.checksum ^= 0xFF;
        assert!(matches!(
            page.into_node(1),
            Err(StorageError::Corrupted { page: 1, .. })
        ));
    }

    #[test]
    fn test_free_page_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("free.rtree");
        let storage = PageStorage::create(&path, PAGE_SIZE).unwrap();
        storage
            .write_free_page(3, &FreePage { next_free: 9 })
            .unwrap();
        assert_eq!(storage.read_free_page(3).unwrap().next_free, 9);
    }

    #[test]
    fn test_encoded_len_matches_written_bytes() {
        let leaf = leaf_with(1, 4);
        let page = encode(&PageWithChecksum::new(leaf.clone()).unwrap()).unwrap();
        assert_eq!(PageStorage::encoded_len(&leaf).unwrap(), page.len());
    }

    #[test]
    fn test_sync_and_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.rtree");
        let storage = PageStorage::create(&path, 1024).unwrap();
        storage.write_page(3, &leaf_with(3, 1)).unwrap();
        storage.sync().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * 1024);

        storage.truncate().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
    }
}
