//! Record-level append protocol over the heap page pool

use log::debug;
use thiserror::Error;

use crate::buffer::{FramePool, PoolError};
use crate::heap::{HeapError, HeapFileStore, Locator, WineRecord};

/// Frame pool specialized to heap data pages
pub type PagePool = FramePool<HeapFileStore>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Heap(#[from] HeapError),

    #[error(transparent)]
    Pool(#[from] PoolError<HeapError>),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Maps logical wine records onto concrete page slots
///
/// Appends go to the pool's current page when it has room, otherwise to
/// a freshly allocated page; intermediate pages are never revisited for
/// free space.
#[derive(Debug, Default)]
pub struct RecordCatalog {
    records_inserted: u64,
}

impl RecordCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records inserted through this catalog since it was created
    pub fn records_inserted(&self) -> u64 {
        self.records_inserted
    }

    /// Append `record` to the current page or a fresh one, returning the
    /// slot it landed in
    pub fn insert_record(
        &mut self,
        pool: &mut PagePool,
        record: &WineRecord,
    ) -> CatalogResult<Locator> {
        let page_size = pool.store().page_size();

        let (current_id, fits) = {
            let page = pool.get_current()?;
            (page.id, page.has_space_for(record, page_size))
        };

        if fits {
            let page = pool.load(current_id)?;
            let slot = page.append(record.clone());
            pool.mark_dirty(current_id);
            self.records_inserted += 1;
            return Ok(Locator::new(current_id, slot));
        }

        // Current page is full: retry on a freshly allocated one.
        let fresh = pool.store_mut().allocate_page()?;
        let fresh_id = fresh.id;
        pool.put(fresh)?;
        debug!("current page {} full, appending to page {}", current_id, fresh_id);

        let (fits, encoded) = {
            let page = pool.load(fresh_id)?;
            (
                page.has_space_for(record, page_size),
                page.encoded_len() + record.frame_len(),
            )
        };
        if !fits {
            return Err(CatalogError::Heap(HeapError::PageTooLarge {
                id: fresh_id,
                encoded,
                page_size,
            }));
        }

        let page = pool.load(fresh_id)?;
        let slot = page.append(record.clone());
        pool.mark_dirty(fresh_id);
        self.records_inserted += 1;
        Ok(Locator::new(fresh_id, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::WineKind;
    use tempfile::TempDir;

    const PAGE_SIZE: usize = 128;

    fn wine(id: i32, year: i32) -> WineRecord {
        WineRecord::new(id, format!("Vinho {:02}", id), year, WineKind::Red).unwrap()
    }

    fn setup(heap_pages: u64) -> (TempDir, PagePool) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            HeapFileStore::open(dir.path(), PAGE_SIZE, PAGE_SIZE as u64 * (heap_pages + 1))
                .unwrap();
        (dir, FramePool::new(store, 1))
    }

    #[test]
    fn test_first_insert_lands_on_page_one() {
        let (_dir, mut pool) = setup(8);
        let mut catalog = RecordCatalog::new();

        let locator = catalog.insert_record(&mut pool, &wine(1, 2010)).unwrap();
        assert_eq!(locator, Locator::new(1, 0));
        assert_eq!(catalog.records_inserted(), 1);
    }

    #[test]
    fn test_slots_increase_on_same_page() {
        let (_dir, mut pool) = setup(8);
        let mut catalog = RecordCatalog::new();

        let first = catalog.insert_record(&mut pool, &wine(1, 2010)).unwrap();
        let second = catalog.insert_record(&mut pool, &wine(2, 2011)).unwrap();
        assert_eq!(first, Locator::new(1, 0));
        assert_eq!(second, Locator::new(1, 1));
    }

    #[test]
    fn test_full_page_rolls_over_to_fresh_page() {
        let (_dir, mut pool) = setup(8);
        let mut catalog = RecordCatalog::new();

        // page 1 takes a handful of ~25-byte records before 128 bytes run out
        let mut locators = Vec::new();
        for i in 0..12 {
            locators.push(catalog.insert_record(&mut pool, &wine(i, 2000 + i)).unwrap());
        }

        let max_page = locators.iter().map(|l| l.page_id).max().unwrap();
        assert!(max_page > 1, "expected at least one page rollover");

        // slots restart at 0 on each new page
        for window in locators.windows(2) {
            if window[1].page_id != window[0].page_id {
                assert_eq!(window[1].slot, 0);
            } else {
                assert_eq!(window[1].slot, window[0].slot + 1);
            }
        }
    }

    #[test]
    fn test_rollover_preserves_evicted_page() {
        let (_dir, mut pool) = setup(8);
        let mut catalog = RecordCatalog::new();

        let mut locators = Vec::new();
        for i in 0..12 {
            locators.push((catalog.insert_record(&mut pool, &wine(i, 2000)).unwrap(), i));
        }

        // every record is readable from disk after the single frame churned
        pool.flush_all().unwrap();
        for (locator, i) in locators {
            let page = pool.store_mut().read_page(locator.page_id).unwrap();
            assert_eq!(page.record(locator.slot).unwrap().wine_id, i);
        }
    }

    #[test]
    fn test_heap_full_propagates() {
        let (_dir, mut pool) = setup(1);
        let mut catalog = RecordCatalog::new();

        let result = (0..32).try_for_each(|i| {
            catalog
                .insert_record(&mut pool, &wine(i, 2000))
                .map(|_| ())
        });
        assert!(matches!(
            result,
            Err(CatalogError::Heap(HeapError::HeapFull(_)))
        ));
    }

    #[test]
    fn test_record_larger_than_page() {
        let (_dir, mut pool) = setup(8);
        let mut catalog = RecordCatalog::new();

        // leaves no room even on a fresh page
        let oversized =
            WineRecord::new(1, "x".repeat(PAGE_SIZE), 2000, WineKind::White).unwrap();
        let result = catalog.insert_record(&mut pool, &oversized);
        assert!(matches!(
            result,
            Err(CatalogError::Heap(HeapError::PageTooLarge { .. }))
        ));
    }
}
