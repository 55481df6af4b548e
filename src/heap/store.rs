use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::{HeapError, HeapResult};
use super::page::HeapPage;
use super::wine::WineRecord;
use super::PageId;
use crate::config::{HEAP_FILE_NAME, HEAP_METADATA_FILE_NAME};

/// Metadata document persisted next to the heap file
///
/// Pages are numbered 1..=last_page_id contiguously, so
/// `last_page_id == page_count` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapFileMetadata {
    pub last_page_id: PageId,
    pub page_count: u64,
    pub heap_size_bytes: u64,
    pub created_at: u64,
    pub last_modified_at: u64,
}

/// Owns the heap file: persists and retrieves fixed-size data pages,
/// allocates new pages contiguously, and reports per-page free space.
pub struct HeapFileStore {
    heap_path: PathBuf,
    metadata_path: PathBuf,
    file: File,
    metadata: HeapFileMetadata,
    page_size: usize,
    write_count: u64,
}

impl HeapFileStore {
    /// Open the store, initializing the directory, metadata document,
    /// heap file, and first empty page when absent.
    pub fn open(storage_dir: &Path, page_size: usize, heap_size_bytes: u64) -> HeapResult<Self> {
        fs::create_dir_all(storage_dir).map_err(|e| {
            HeapError::StoreInit(format!(
                "cannot create storage directory {}: {}",
                storage_dir.display(),
                e
            ))
        })?;

        let heap_path = storage_dir.join(HEAP_FILE_NAME);
        let metadata_path = storage_dir.join(HEAP_METADATA_FILE_NAME);

        if metadata_path.exists() {
            let content = fs::read_to_string(&metadata_path).map_err(|e| {
                HeapError::StoreInit(format!("cannot read heap metadata: {}", e))
            })?;
            let metadata: HeapFileMetadata = serde_json::from_str(&content)
                .map_err(|e| HeapError::StoreInit(format!("heap metadata is invalid: {}", e)))?;
            if metadata.last_page_id != metadata.page_count {
                return Err(HeapError::StoreInit(format!(
                    "heap metadata inconsistent: last_page_id={} page_count={}",
                    metadata.last_page_id, metadata.page_count
                )));
            }

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&heap_path)
                .map_err(|e| {
                    HeapError::StoreInit(format!(
                        "cannot open heap file {}: {}",
                        heap_path.display(),
                        e
                    ))
                })?;

            debug!(
                "opened heap store at {} ({} pages)",
                heap_path.display(),
                metadata.page_count
            );
            return Ok(Self {
                heap_path,
                metadata_path,
                file,
                metadata,
                page_size,
                write_count: 0,
            });
        }

        // Fresh store: metadata, a heap file of exactly heap_size_bytes,
        // and page 1 allocated empty.
        let now = unix_now();
        let metadata = HeapFileMetadata {
            last_page_id: 1,
            page_count: 1,
            heap_size_bytes,
            created_at: now,
            last_modified_at: now,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&heap_path)
            .map_err(|e| {
                HeapError::StoreInit(format!(
                    "cannot create heap file {}: {}",
                    heap_path.display(),
                    e
                ))
            })?;
        file.set_len(heap_size_bytes)
            .map_err(|e| HeapError::StoreInit(format!("cannot size heap file: {}", e)))?;

        let mut store = Self {
            heap_path,
            metadata_path,
            file,
            metadata,
            page_size,
            write_count: 0,
        };
        store.persist_metadata()?;
        store.write_page(&HeapPage::empty(1))?;
        store.write_count = 0;

        info!(
            "initialized heap store at {} (page size {} bytes, heap {} bytes)",
            store.heap_path.display(),
            page_size,
            heap_size_bytes
        );
        Ok(store)
    }

    /// Configured page size in bytes
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Highest allocated page id
    pub fn last_page_id(&self) -> PageId {
        self.metadata.last_page_id
    }

    /// Snapshot of the metadata document
    pub fn metadata(&self) -> &HeapFileMetadata {
        &self.metadata
    }

    /// Number of physical page writes since the store was opened
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Whether `id` names an allocated page; id 0 is always absent
    pub fn page_exists(&self, id: PageId) -> bool {
        id != 0 && id <= self.metadata.last_page_id
    }

    /// Whether `page` can take `record` without exceeding the page size
    pub fn page_has_space_for(&self, page: &HeapPage, record: &WineRecord) -> bool {
        page.has_space_for(record, self.page_size)
    }

    /// Read an allocated page from disk
    pub fn read_page(&mut self, id: PageId) -> HeapResult<HeapPage> {
        if !self.page_exists(id) {
            return Err(HeapError::PageOutOfRange(id));
        }

        let offset = id * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; self.page_size];
        self.file.read_exact(&mut buf)?;

        HeapPage::decode(id, &buf)
    }

    /// Write an allocated page to disk, padding to exactly one page
    /// and touching the metadata document's modification time
    pub fn write_page(&mut self, page: &HeapPage) -> HeapResult<()> {
        if !self.page_exists(page.id) {
            return Err(HeapError::PageOutOfRange(page.id));
        }

        let buf = page.encode(self.page_size)?;

        let offset = page.id * self.page_size as u64;
        let required = offset + self.page_size as u64;
        let current_len = self.file.metadata()?.len();
        if current_len < required {
            self.file.set_len(required)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buf)?;
        self.write_count += 1;

        self.metadata.last_modified_at = unix_now();
        self.persist_metadata()?;
        Ok(())
    }

    /// Allocate the next contiguous page and persist it empty
    pub fn allocate_page(&mut self) -> HeapResult<HeapPage> {
        let new_id = self.metadata.last_page_id + 1;
        if new_id * self.page_size as u64 > self.metadata.heap_size_bytes {
            return Err(HeapError::HeapFull(new_id));
        }

        self.metadata.last_page_id = new_id;
        self.metadata.page_count += 1;

        let page = HeapPage::empty(new_id);
        self.write_page(&page)?;
        debug!("allocated heap page {}", new_id);
        Ok(page)
    }

    /// Force all written bytes to stable storage
    pub fn flush(&mut self) -> HeapResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn persist_metadata(&mut self) -> HeapResult<()> {
        let content = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(&self.metadata_path, content)?;
        Ok(())
    }
}

impl crate::buffer::BackingStore for HeapFileStore {
    type Entity = HeapPage;
    type Error = HeapError;

    fn entity_id(page: &HeapPage) -> u64 {
        page.id
    }

    fn contains(&self, id: u64) -> bool {
        self.page_exists(id)
    }

    fn fetch(&mut self, id: u64) -> HeapResult<HeapPage> {
        self.read_page(id)
    }

    fn persist(&mut self, page: &HeapPage) -> HeapResult<()> {
        self.write_page(page)
    }

    fn first_id(&self) -> Option<u64> {
        if self.metadata.page_count > 0 {
            Some(1)
        } else {
            None
        }
    }

    fn sync(&mut self) -> HeapResult<()> {
        self.flush()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::WineKind;
    use tempfile::TempDir;

    const PAGE_SIZE: usize = 256;

    fn wine(id: i32, year: i32) -> WineRecord {
        WineRecord::new(id, format!("Vinho {}", id), year, WineKind::White).unwrap()
    }

    fn setup() -> (TempDir, HeapFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HeapFileStore::open(dir.path(), PAGE_SIZE, PAGE_SIZE as u64 * 8).unwrap();
        (dir, store)
    }

    #[test]
    fn test_initialize_creates_page_one() {
        let (_dir, mut store) = setup();
        assert_eq!(store.last_page_id(), 1);
        assert!(store.page_exists(1));
        assert!(!store.page_exists(0));
        assert!(!store.page_exists(2));

        let page = store.read_page(1).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_initialize_sizes_heap_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HeapFileStore::open(dir.path(), PAGE_SIZE, 4096).unwrap();
        let len = fs::metadata(dir.path().join(HEAP_FILE_NAME)).unwrap().len();
        assert_eq!(len, 4096);
        drop(store);
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_dir, mut store) = setup();

        let mut page = store.read_page(1).unwrap();
        page.append(wine(1, 2010));
        page.append(wine(2, 2011));
        store.write_page(&page).unwrap();

        let read_back = store.read_page(1).unwrap();
        assert_eq!(read_back, page);
    }

    #[test]
    fn test_read_out_of_range() {
        let (_dir, mut store) = setup();
        assert!(matches!(
            store.read_page(0),
            Err(HeapError::PageOutOfRange(0))
        ));
        assert!(matches!(
            store.read_page(9),
            Err(HeapError::PageOutOfRange(9))
        ));
    }

    #[test]
    fn test_write_out_of_range() {
        let (_dir, mut store) = setup();
        let page = HeapPage::empty(5);
        assert!(matches!(
            store.write_page(&page),
            Err(HeapError::PageOutOfRange(5))
        ));
    }

    #[test]
    fn test_allocate_pages_contiguously() {
        let (_dir, mut store) = setup();
        assert_eq!(store.allocate_page().unwrap().id, 2);
        assert_eq!(store.allocate_page().unwrap().id, 3);
        assert_eq!(store.last_page_id(), 3);
        assert_eq!(store.metadata().page_count, 3);
    }

    #[test]
    fn test_heap_full() {
        let dir = tempfile::tempdir().unwrap();
        // room for pages 1 and 2 only: page 3 would start past the end
        let mut store = HeapFileStore::open(dir.path(), PAGE_SIZE, PAGE_SIZE as u64 * 2).unwrap();
        store.allocate_page().unwrap();
        assert!(matches!(
            store.allocate_page(),
            Err(HeapError::HeapFull(3))
        ));
    }

    #[test]
    fn test_page_too_large_record() {
        let (_dir, mut store) = setup();
        let mut page = store.read_page(1).unwrap();
        let big = WineRecord::new(1, "x".repeat(PAGE_SIZE), 2000, WineKind::Red).unwrap();
        assert!(!store.page_has_space_for(&page, &big));
        page.append(big);
        assert!(matches!(
            store.write_page(&page),
            Err(HeapError::PageTooLarge { .. })
        ));
    }

    #[test]
    fn test_write_count() {
        let (_dir, mut store) = setup();
        assert_eq!(store.write_count(), 0);
        let page = store.read_page(1).unwrap();
        store.write_page(&page).unwrap();
        store.write_page(&page).unwrap();
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_reopen_recovers_metadata() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store =
                HeapFileStore::open(dir.path(), PAGE_SIZE, PAGE_SIZE as u64 * 8).unwrap();
            let mut page = store.read_page(1).unwrap();
            page.append(wine(9, 1999));
            store.write_page(&page).unwrap();
            store.allocate_page().unwrap();
            store.flush().unwrap();
        }

        let mut store = HeapFileStore::open(dir.path(), PAGE_SIZE, PAGE_SIZE as u64 * 8).unwrap();
        assert_eq!(store.last_page_id(), 2);
        let page = store.read_page(1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.record(0).unwrap().wine_id, 9);
    }
}
