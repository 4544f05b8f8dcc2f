use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, RwLock},
};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::{
    common::{PageID, Permission, TableID, TransactionID, RID},
    config::Config,
    error::{Error, Result},
    lock::{self, LockManager, LockTable, LockWaitPolicy},
    page::HeapPage,
    record::Record,
    table::HeapFile,
};

pub type PageRef = Arc<RwLock<HeapPage>>;

/// Everything that changes cache membership or lock membership. One mutex
/// covers both so a waiter never observes a half-evicted page.
struct PoolState {
    pages: HashMap<PageID, PageRef>,
    lock_manager: LockManager,
}
impl LockTable for PoolState {
    fn lock_manager(&mut self) -> &mut LockManager {
        &mut self.lock_manager
    }
}

/// Bounded page cache with page-level strict two-phase locking.
///
/// Dirty pages stay resident until their transaction completes (no-steal):
/// eviction only ever picks clean pages, so an uncommitted change is never
/// written to a heap file. Callers that mutate a page obtained from
/// [`BufferPool::get_page`] must mark it dirty before returning control, and
/// must not hold a page latch while calling back into the pool.
pub struct BufferPool {
    size: usize,
    lock_wait: LockWaitPolicy,
    tables: RwLock<HashMap<TableID, Arc<HeapFile>>>,
    state: Mutex<PoolState>,
    lock_released: Condvar,
}

impl BufferPool {
    pub fn new(config: &Config) -> Self {
        Self {
            size: config.pool_size,
            lock_wait: config.lock_wait,
            tables: RwLock::new(HashMap::new()),
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(config.pool_size),
                lock_manager: LockManager::default(),
            }),
            lock_released: Condvar::new(),
        }
    }
    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn register_table(&self, file: Arc<HeapFile>) -> Result<()> {
        let mut tables = self.tables.write()?;
        let table_id = file.table_id();
        if tables.contains_key(&table_id) {
            return Err(Error::invalid_state(format!(
                "table {} is already registered",
                table_id.0
            )));
        }
        tables.insert(table_id, file);
        info!(table_id = table_id.0, "table registered");
        Ok(())
    }
    pub fn table(&self, table_id: TableID) -> Result<Arc<HeapFile>> {
        self.tables
            .read()?
            .get(&table_id)
            .cloned()
            .ok_or_else(|| Error::invalid_state(format!("unknown table {}", table_id.0)))
    }

    /// Locks `page_id` for `txn_id` and returns the resident page, loading it
    /// on a miss. Blocks while a conflicting lock is held; fails with
    /// [`Error::TransactionAborted`] once the wait runs too long.
    pub fn get_page(
        &self,
        txn_id: TransactionID,
        page_id: PageID,
        permission: Permission,
    ) -> Result<PageRef> {
        let state = self.state.lock()?;
        let mut state = lock::acquire(
            state,
            &self.lock_released,
            &self.lock_wait,
            txn_id,
            page_id,
            permission,
        )?;
        self.fetch_page(&mut state, page_id)
    }

    /// Fetches a page without taking any lock, for reads outside a transaction.
    pub fn get_page_unlocked(&self, page_id: PageID) -> Result<PageRef> {
        let mut state = self.state.lock()?;
        self.fetch_page(&mut state, page_id)
    }

    fn fetch_page(&self, state: &mut PoolState, page_id: PageID) -> Result<PageRef> {
        if let Some(page) = state.pages.get(&page_id) {
            return Ok(page.clone());
        }
        if state.pages.len() >= self.size {
            self.evict_page(state)?;
        }
        let page = self.table(page_id.table_id)?.read_page(page_id)?;
        debug!(%page_id, "page loaded");
        let page = Arc::new(RwLock::new(page));
        state.pages.insert(page_id, page.clone());
        Ok(page)
    }

    pub fn release_page(&self, txn_id: TransactionID, page_id: PageID) -> Result<()> {
        let mut state = self.state.lock()?;
        state.lock_manager.release(txn_id, page_id);
        self.lock_released.notify_all();
        Ok(())
    }

    pub fn holds_lock(&self, txn_id: TransactionID, page_id: PageID) -> Result<bool> {
        Ok(self.state.lock()?.lock_manager.holds_lock(txn_id, page_id))
    }

    pub fn insert_record(
        &self,
        txn_id: TransactionID,
        table_id: TableID,
        record: &mut Record,
    ) -> Result<()> {
        let file = self.table(table_id)?;
        let dirtied = file.insert_record(self, txn_id, record)?;
        self.pin_dirty_pages(txn_id, dirtied)
    }

    pub fn delete_record(&self, txn_id: TransactionID, record: &Record) -> Result<()> {
        let RID(page_id, _) = record
            .rid
            .ok_or_else(|| Error::invalid_state("record has no rid"))?;
        let file = self.table(page_id.table_id)?;
        let dirtied = file.delete_record(self, txn_id, record)?;
        self.pin_dirty_pages(txn_id, dirtied)
    }

    /// Makes the given versions of the pages resident, replacing whatever copy
    /// the cache holds, so later requests see the mutation.
    fn pin_dirty_pages(&self, txn_id: TransactionID, pages: Vec<PageRef>) -> Result<()> {
        let mut state = self.state.lock()?;
        for page in pages {
            let page_id = {
                let mut page = page.write()?;
                page.mark_dirty(txn_id);
                page.page_id()
            };
            if !state.pages.contains_key(&page_id) && state.pages.len() >= self.size {
                self.evict_page(&mut state)?;
            }
            state.pages.insert(page_id, page);
        }
        Ok(())
    }

    /// Writes every dirty resident page. This bypasses no-steal, so it belongs
    /// at forced durability points only.
    pub fn flush_all(&self) -> Result<()> {
        let state = self.state.lock()?;
        for page in state.pages.values() {
            self.flush_page(page)?;
        }
        Ok(())
    }

    pub fn flush_pages(&self, txn_id: TransactionID) -> Result<()> {
        let state = self.state.lock()?;
        self.flush_exclusive_pages(&state, txn_id)
    }

    fn flush_exclusive_pages(&self, state: &PoolState, txn_id: TransactionID) -> Result<()> {
        for page_id in state.lock_manager.exclusive_pages(txn_id) {
            if let Some(page) = state.pages.get(&page_id) {
                self.flush_page(page)?;
            }
        }
        Ok(())
    }

    fn flush_page(&self, page: &PageRef) -> Result<()> {
        let mut page = page.write()?;
        if page.is_dirty() {
            let page_id = page.page_id();
            self.table(page_id.table_id)?.write_page(&page)?;
            page.mark_clean();
            debug!(%page_id, "page flushed");
        }
        Ok(())
    }

    pub fn discard_page(&self, page_id: PageID) -> Result<()> {
        self.state.lock()?.pages.remove(&page_id);
        Ok(())
    }

    pub fn commit(&self, txn_id: TransactionID) -> Result<()> {
        self.transaction_complete(txn_id, true)
    }

    pub fn abort(&self, txn_id: TransactionID) -> Result<()> {
        self.transaction_complete(txn_id, false)
    }

    /// Commit flushes, abort discards, every page `txn_id` holds exclusively;
    /// then all of its locks are released.
    pub fn transaction_complete(&self, txn_id: TransactionID, commit: bool) -> Result<()> {
        let mut state = self.state.lock()?;
        if commit {
            self.flush_exclusive_pages(&state, txn_id)?;
        } else {
            for page_id in state.lock_manager.exclusive_pages(txn_id) {
                state.pages.remove(&page_id);
            }
        }
        let released = state.lock_manager.release_all(txn_id);
        self.lock_released.notify_all();
        info!(%txn_id, commit, locks = released.len(), "transaction complete");
        Ok(())
    }

    /// Discards one clean page picked uniformly at random. Pages latched for
    /// writing count as dirty, and so do pages under an exclusive lock: their
    /// holder may mark them dirty at any moment.
    fn evict_page(&self, state: &mut PoolState) -> Result<()> {
        let lock_manager = &state.lock_manager;
        let candidates = state
            .pages
            .iter()
            .filter(|(&page_id, _)| !lock_manager.is_exclusively_locked(page_id))
            .filter(|(_, page)| page.try_read().map_or(false, |page| !page.is_dirty()))
            .map(|(&page_id, _)| page_id)
            .collect::<Vec<_>>();
        let Some(&page_id) = candidates.choose(&mut rand::thread_rng()) else {
            warn!(capacity = self.size, "no clean page to evict");
            return Err(Error::ResourceExhausted {
                capacity: self.size,
            });
        };
        if let Some(page) = state.pages.get(&page_id) {
            self.flush_page(page)?;
        }
        state.pages.remove(&page_id);
        debug!(%page_id, "page evicted");
        Ok(())
    }

    pub fn resident_pages(&self) -> Result<usize> {
        Ok(self.state.lock()?.pages.len())
    }

    pub fn is_resident(&self, page_id: PageID) -> Result<bool> {
        Ok(self.state.lock()?.pages.contains_key(&page_id))
    }
}
