//! Engine configuration knobs and their stable defaults.

use std::path::PathBuf;

/// Default data page size in bytes (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default maximum keys per B+ tree node before a split
pub const DEFAULT_MAX_KEYS_PER_NODE: usize = 4;

/// Default heap file size (40MB)
pub const DEFAULT_HEAP_SIZE: u64 = 40 * 1024 * 1024;

/// Default number of resident data page frames
pub const DEFAULT_PAGE_FRAMES: usize = 1;

/// Default number of resident index node frames
pub const DEFAULT_INDEX_FRAMES: usize = 1;

/// File name of the heap file inside the storage directory
pub const HEAP_FILE_NAME: &str = "heap.ygg";

/// File name of the heap metadata document inside the storage directory
pub const HEAP_METADATA_FILE_NAME: &str = "heap_metadata.ygg";

/// File name of the B+ tree index inside the storage directory
pub const INDEX_FILE_NAME: &str = "index.harvest_year";

/// File name of the sorted binary wine catalog inside the storage directory
pub const SOURCE_CATALOG_FILE_NAME: &str = "cellar.bin";

/// Runtime configuration for the storage engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the heap, metadata, and index files
    pub storage_dir: PathBuf,
    /// Size of one data page in bytes
    pub page_size_in_bytes: usize,
    /// Total size of the heap file in bytes
    pub heap_size_in_bytes: u64,
    /// Capacity of the data page frame pool
    pub amount_of_page_frames: usize,
    /// Capacity of the index node frame pool
    pub amount_of_index_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./data"),
            page_size_in_bytes: DEFAULT_PAGE_SIZE,
            heap_size_in_bytes: DEFAULT_HEAP_SIZE,
            amount_of_page_frames: DEFAULT_PAGE_FRAMES,
            amount_of_index_frames: DEFAULT_INDEX_FRAMES,
        }
    }
}

impl EngineConfig {
    /// Path of the heap file under the storage directory
    pub fn heap_path(&self) -> PathBuf {
        self.storage_dir.join(HEAP_FILE_NAME)
    }

    /// Path of the index file under the storage directory
    pub fn index_path(&self) -> PathBuf {
        self.storage_dir.join(INDEX_FILE_NAME)
    }

    /// Path of the sorted binary wine catalog under the storage directory
    pub fn source_catalog_path(&self) -> PathBuf {
        self.storage_dir.join(SOURCE_CATALOG_FILE_NAME)
    }
}
