//! LRU frame pools bounding resident pages and index nodes
//!
//! One generic pool serves both halves of the memory budget: a
//! `FramePool<HeapFileStore>` caps resident data pages and a
//! `FramePool<IndexFileStore>` caps resident index nodes. Frames hold
//! decoded entities plus a dirty flag; evicted dirty frames are written
//! back to the store before the replacement is installed.

mod error;

pub use error::{PoolError, PoolResult};

use std::num::NonZeroUsize;

use lru::LruCache;

/// A store a frame pool can page entities in and out of
pub trait BackingStore {
    type Entity;
    type Error: std::error::Error + 'static;

    /// Stable identifier of an entity
    fn entity_id(entity: &Self::Entity) -> u64;

    /// Whether `id` exists in the store
    fn contains(&self, id: u64) -> bool;

    /// Read the entity with the given id
    fn fetch(&mut self, id: u64) -> Result<Self::Entity, Self::Error>;

    /// Write the entity back to the store
    fn persist(&mut self, entity: &Self::Entity) -> Result<(), Self::Error>;

    /// Canonical first entity to load into an empty pool
    /// (page 1 for the heap, the root node for the index)
    fn first_id(&self) -> Option<u64>;

    /// Force store contents to stable storage
    fn sync(&mut self) -> Result<(), Self::Error>;
}

struct Frame<T> {
    entity: T,
    dirty: bool,
}

/// Bounded pool of decoded entities with LRU eviction and dirty
/// write-back
pub struct FramePool<S: BackingStore> {
    store: S,
    frames: LruCache<u64, Frame<S::Entity>>,
}

impl<S: BackingStore> FramePool<S> {
    /// Create a pool over `store` holding at most `capacity` frames
    /// (a zero capacity is clamped to one frame)
    pub fn new(store: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            frames: LruCache::new(capacity),
        }
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The backing store, mutably
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Maximum number of resident frames
    pub fn capacity(&self) -> usize {
        self.frames.cap().get()
    }

    /// Number of resident frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether `id` is resident
    pub fn is_resident(&self, id: u64) -> bool {
        self.frames.contains(&id)
    }

    /// Whether the resident frame for `id` is dirty
    pub fn is_dirty(&self, id: u64) -> bool {
        self.frames.peek(&id).map(|f| f.dirty).unwrap_or(false)
    }

    /// Id of the most recently used frame, if any
    pub fn current_id(&self) -> Option<u64> {
        self.frames.iter().next().map(|(&id, _)| id)
    }

    /// Return the MRU frame, loading the store's canonical first entity
    /// into an empty pool
    pub fn get_current(&mut self) -> PoolResult<&mut S::Entity, S::Error> {
        let id = match self.current_id() {
            Some(id) => id,
            None => self.store.first_id().ok_or(PoolError::EmptyUnloadable)?,
        };
        self.load(id)
    }

    /// Return the entity with the given id, reading it from the store on
    /// a miss; the returned borrow is valid only until the next pool
    /// operation
    pub fn load(&mut self, id: u64) -> PoolResult<&mut S::Entity, S::Error> {
        if self.frames.contains(&id) {
            // get_mut moves the frame to MRU
            let frame = self.frames.get_mut(&id).unwrap();
            return Ok(&mut frame.entity);
        }

        if !self.store.contains(id) {
            return Err(PoolError::NotFound(id));
        }
        let entity = self.store.fetch(id)?;
        self.install(entity)
    }

    /// Install a caller-supplied entity at MRU, evicting as needed;
    /// replacing an already-resident entity keeps its dirty flag
    pub fn put(&mut self, entity: S::Entity) -> PoolResult<(), S::Error> {
        let id = S::entity_id(&entity);
        if let Some(frame) = self.frames.get_mut(&id) {
            frame.entity = entity;
            return Ok(());
        }
        self.install(entity)?;
        Ok(())
    }

    /// Flag the resident frame as modified; no-op when not resident
    pub fn mark_dirty(&mut self, id: u64) {
        if let Some(frame) = self.frames.peek_mut(&id) {
            frame.dirty = true;
        }
    }

    /// Write the resident frame back (even if clean) and clear its dirty
    /// flag; no-op when not resident; never evicts
    pub fn flush(&mut self, id: u64) -> PoolResult<(), S::Error> {
        if let Some(frame) = self.frames.peek_mut(&id) {
            self.store.persist(&frame.entity)?;
            frame.dirty = false;
        }
        Ok(())
    }

    /// Flush every resident frame, then sync the store
    pub fn flush_all(&mut self) -> PoolResult<(), S::Error> {
        let ids: Vec<u64> = self.frames.iter().map(|(&id, _)| id).collect();
        for id in ids {
            self.flush(id)?;
        }
        self.store.sync()?;
        Ok(())
    }

    fn install(&mut self, entity: S::Entity) -> PoolResult<&mut S::Entity, S::Error> {
        let id = S::entity_id(&entity);
        while self.frames.len() >= self.capacity() {
            self.evict_lru()?;
        }
        self.frames.put(
            id,
            Frame {
                entity,
                dirty: false,
            },
        );
        Ok(&mut self.frames.get_mut(&id).unwrap().entity)
    }

    /// Drop the LRU frame, writing it back first when dirty
    fn evict_lru(&mut self) -> PoolResult<(), S::Error> {
        if let Some((_, frame)) = self.frames.pop_lru() {
            if frame.dirty {
                self.store.persist(&frame.entity)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{HeapFileStore, HeapPage, WineKind, WineRecord};
    use tempfile::TempDir;

    const PAGE_SIZE: usize = 256;

    fn wine(id: i32) -> WineRecord {
        WineRecord::new(id, format!("Vinho {}", id), 2000, WineKind::Red).unwrap()
    }

    fn setup(capacity: usize) -> (TempDir, FramePool<HeapFileStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = HeapFileStore::open(dir.path(), PAGE_SIZE, PAGE_SIZE as u64 * 32).unwrap();
        (dir, FramePool::new(store, capacity))
    }

    #[test]
    fn test_get_current_loads_first_page() {
        let (_dir, mut pool) = setup(1);
        assert!(pool.is_empty());
        let page = pool.get_current().unwrap();
        assert_eq!(page.id, 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_load_missing() {
        let (_dir, mut pool) = setup(1);
        assert!(matches!(pool.load(99), Err(PoolError::NotFound(99))));
        assert!(matches!(pool.load(0), Err(PoolError::NotFound(0))));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let (_dir, mut pool) = setup(2);
        for _ in 0..4 {
            pool.store_mut().allocate_page().unwrap();
        }
        for id in 1..=5 {
            pool.load(id).unwrap();
            assert!(pool.len() <= 2);
        }
    }

    #[test]
    fn test_lru_eviction_order() {
        let (_dir, mut pool) = setup(2);
        pool.store_mut().allocate_page().unwrap();
        pool.store_mut().allocate_page().unwrap();

        pool.load(1).unwrap();
        pool.load(2).unwrap();
        // touch 1 so 2 becomes the LRU victim
        pool.load(1).unwrap();
        pool.load(3).unwrap();

        assert!(pool.is_resident(1));
        assert!(!pool.is_resident(2));
        assert!(pool.is_resident(3));
    }

    #[test]
    fn test_dirty_eviction_writes_back_once() {
        let (_dir, mut pool) = setup(1);
        pool.store_mut().allocate_page().unwrap();

        let page = pool.load(1).unwrap();
        page.append(wine(7));
        pool.mark_dirty(1);

        let writes_before = pool.store().write_count();
        pool.load(2).unwrap();
        assert_eq!(pool.store().write_count(), writes_before + 1);

        // reloading the evicted page sees the written-back record
        let page = pool.load(1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.record(0).unwrap().wine_id, 7);
    }

    #[test]
    fn test_clean_eviction_writes_nothing() {
        let (_dir, mut pool) = setup(1);
        pool.store_mut().allocate_page().unwrap();

        pool.load(1).unwrap();
        let writes_before = pool.store().write_count();
        pool.load(2).unwrap();
        assert_eq!(pool.store().write_count(), writes_before);
    }

    #[test]
    fn test_put_installs_at_mru() {
        let (_dir, mut pool) = setup(1);
        let fresh = pool.store_mut().allocate_page().unwrap();
        pool.put(fresh).unwrap();
        assert_eq!(pool.current_id(), Some(2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_put_resident_keeps_dirty_flag() {
        let (_dir, mut pool) = setup(1);
        let page = pool.load(1).unwrap();
        page.append(wine(1));
        pool.mark_dirty(1);

        pool.put(HeapPage::empty(1)).unwrap();
        assert!(pool.is_dirty(1));
        assert_eq!(pool.load(1).unwrap().len(), 0);
    }

    #[test]
    fn test_mark_dirty_not_resident_is_noop() {
        let (_dir, mut pool) = setup(1);
        pool.mark_dirty(42);
        assert!(!pool.is_dirty(42));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_flush_clears_dirty_without_evicting() {
        let (_dir, mut pool) = setup(1);
        let page = pool.load(1).unwrap();
        page.append(wine(3));
        pool.mark_dirty(1);

        pool.flush(1).unwrap();
        assert!(!pool.is_dirty(1));
        assert!(pool.is_resident(1));

        let on_disk = pool.store_mut().read_page(1).unwrap();
        assert_eq!(on_disk.len(), 1);
    }

    #[test]
    fn test_flush_all_idempotent() {
        let (_dir, mut pool) = setup(2);
        pool.store_mut().allocate_page().unwrap();
        for id in 1..=2 {
            let page = pool.load(id).unwrap();
            page.append(wine(id as i32));
            pool.mark_dirty(id);
        }

        pool.flush_all().unwrap();
        let writes = pool.store().write_count();
        let first = pool.store_mut().read_page(1).unwrap();
        let second = pool.store_mut().read_page(2).unwrap();

        pool.flush_all().unwrap();
        assert_eq!(pool.store_mut().read_page(1).unwrap(), first);
        assert_eq!(pool.store_mut().read_page(2).unwrap(), second);
        // second flush rewrites the same bytes, one write per frame
        assert_eq!(pool.store().write_count(), writes + 2);
    }

    #[test]
    fn test_get_current_returns_mru() {
        let (_dir, mut pool) = setup(2);
        pool.store_mut().allocate_page().unwrap();
        pool.load(1).unwrap();
        pool.load(2).unwrap();
        let current = pool.get_current().unwrap();
        assert_eq!(current.id, 2);
    }
}
