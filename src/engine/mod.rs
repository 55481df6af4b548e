//! Engine façade wiring the catalog, heap, buffer pools, and index


use log::{debug, info};
use thiserror::Error;

use crate::buffer::{FramePool, PoolError};
use crate::catalog::{CatalogError, PagePool, RecordCatalog};
use crate::config::EngineConfig;
use crate::heap::{HeapError, HeapFileStore, Locator, WineRecord};
use crate::index::{BPlusTree, BPlusTreeError, IndexError, IndexFileStore, NodePool};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Heap(#[from] HeapError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Tree(#[from] BPlusTreeError),

    #[error(transparent)]
    PagePool(#[from] PoolError<HeapError>),

    #[error(transparent)]
    NodePool(#[from] PoolError<IndexError>),

    #[error("locator {0:?} points at an empty slot")]
    DanglingLocator(Locator),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Single-user storage engine: inserts route record → page → index,
/// searches route key → locators → pages → records
pub struct Engine {
    pages: PagePool,
    nodes: NodePool,
    catalog: RecordCatalog,
    tree: BPlusTree,
}

impl Engine {
    /// Open (or initialize) the engine under the configured storage
    /// directory, with `max_keys` keys per index node before a split
    pub fn open(config: &EngineConfig, max_keys: usize) -> EngineResult<Self> {
        let heap_store = HeapFileStore::open(
            &config.storage_dir,
            config.page_size_in_bytes,
            config.heap_size_in_bytes,
        )?;
        let index_store = IndexFileStore::open(&config.index_path())?;
        let tree = BPlusTree::new(max_keys)?;

        info!(
            "engine open: {} page frame(s), {} index frame(s), max {} keys per node",
            config.amount_of_page_frames, config.amount_of_index_frames, max_keys
        );
        Ok(Self {
            pages: FramePool::new(heap_store, config.amount_of_page_frames),
            nodes: FramePool::new(index_store, config.amount_of_index_frames),
            catalog: RecordCatalog::new(),
            tree,
        })
    }

    /// Insert one wine: heap first, then the index. A record whose index
    /// insert fails stays in the heap; there is no compensation.
    pub fn insert(&mut self, record: &WineRecord) -> EngineResult<Locator> {
        let locator = self.catalog.insert_record(&mut self.pages, record)?;
        self.tree
            .insert(&mut self.nodes, record.harvest_year, locator)?;
        debug!(
            "inserted wine {} (year {}) at {}:{}",
            record.wine_id, record.harvest_year, locator.page_id, locator.slot
        );
        Ok(locator)
    }

    /// All wines whose harvest year equals `harvest_year`, in index
    /// leaf-chain order
    pub fn search(&mut self, harvest_year: i32) -> EngineResult<Vec<WineRecord>> {
        let locators = self.tree.search(&mut self.nodes, harvest_year)?;

        let mut out = Vec::with_capacity(locators.len());
        for locator in locators {
            let page = self.pages.load(locator.page_id)?;
            let record = page
                .record(locator.slot)
                .cloned()
                .ok_or(EngineError::DanglingLocator(locator))?;
            out.push(record);
        }
        Ok(out)
    }

    /// Current index height; no I/O
    pub fn height(&self) -> u64 {
        self.tree.height(&self.nodes)
    }

    /// Flush both pools and fsync both files: data pages first, then
    /// index nodes
    pub fn flush(&mut self) -> EngineResult<()> {
        self.pages.flush_all()?;
        self.nodes.flush_all()?;
        Ok(())
    }

    /// The data page pool (tests observe residency through this)
    pub fn page_pool(&self) -> &PagePool {
        &self.pages
    }

    /// The index node pool
    pub fn node_pool(&self) -> &NodePool {
        &self.nodes
    }
}
