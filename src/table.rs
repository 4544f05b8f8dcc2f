use std::{path::Path, sync::Mutex};

use tracing::debug;

use crate::{
    buffer::{BufferPool, PageRef},
    common::{PageID, Permission, TableID, TransactionID, RID},
    disk::{DiskManager, PageStore},
    error::{Error, Result},
    page::{HeapPage, PageLayout},
    record::Record,
};

pub use self::table_iterator::HeapScan;

mod table_iterator;

/// Unordered collection of fixed-width records stored on the pages of one
/// page store.
pub struct HeapFile {
    table_id: TableID,
    layout: PageLayout,
    store: Mutex<Box<dyn PageStore>>,
}

impl HeapFile {
    pub fn new(table_id: TableID, record_width: usize, store: Box<dyn PageStore>) -> Result<Self> {
        let layout = PageLayout::new(store.page_size(), record_width)?;
        Ok(Self {
            table_id,
            layout,
            store: Mutex::new(store),
        })
    }
    pub fn open(
        path: impl AsRef<Path>,
        table_id: TableID,
        record_width: usize,
        page_size: usize,
    ) -> Result<Self> {
        let disk_manager = DiskManager::new(path, page_size)?;
        Self::new(table_id, record_width, Box::new(disk_manager))
    }
    pub fn table_id(&self) -> TableID {
        self.table_id
    }
    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    fn check_page_id(&self, page_id: PageID) -> Result<()> {
        if page_id.table_id != self.table_id {
            return Err(Error::invalid_state(format!(
                "page {} does not belong to table {}",
                page_id, self.table_id.0
            )));
        }
        Ok(())
    }

    pub fn read_page(&self, page_id: PageID) -> Result<HeapPage> {
        self.check_page_id(page_id)?;
        let mut data = self.layout.empty_page_data();
        self.store
            .lock()?
            .read_page(page_id.page_number, &mut data)?;
        HeapPage::from_data(page_id, self.layout, data)
    }

    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        self.check_page_id(page.page_id())?;
        self.store
            .lock()?
            .write_page(page.page_id().page_number, page.data())
    }

    pub fn num_pages(&self) -> Result<u32> {
        self.store.lock()?.num_pages()
    }

    /// Extends the file with one empty page.
    pub fn allocate_page(&self) -> Result<PageID> {
        let page_number = self.store.lock()?.allocate_page()?;
        let page_id = PageID::new(self.table_id, page_number);
        debug!(%page_id, "heap file extended");
        Ok(page_id)
    }

    /// First page, in page-number order, with an empty slot; extends the file
    /// when every page is full. Probing takes a shared lock per page. A probe
    /// lock the transaction did not already hold is given back for full pages,
    /// since nothing on them was read.
    fn page_with_empty_slot(&self, pool: &BufferPool, txn_id: TransactionID) -> Result<PageID> {
        for page_number in 0..self.num_pages()? {
            let page_id = PageID::new(self.table_id, page_number);
            let held = pool.holds_lock(txn_id, page_id)?;
            let page = pool.get_page(txn_id, page_id, Permission::ReadOnly)?;
            let has_room = page.read()?.has_empty_slot();
            if has_room {
                return Ok(page_id);
            }
            if !held {
                pool.release_page(txn_id, page_id)?;
            }
        }
        self.allocate_page()
    }

    /// Stores `record` in the first page with room and sets its rid. Returns
    /// the pages it dirtied.
    pub fn insert_record(
        &self,
        pool: &BufferPool,
        txn_id: TransactionID,
        record: &mut Record,
    ) -> Result<Vec<PageRef>> {
        if record.width() != self.layout.record_width {
            return Err(Error::invalid_state(format!(
                "record is {} bytes, table {} stores {}-byte records",
                record.width(),
                self.table_id.0,
                self.layout.record_width
            )));
        }
        loop {
            let page_id = self.page_with_empty_slot(pool, txn_id)?;
            let page = pool.get_page(txn_id, page_id, Permission::ReadWrite)?;
            {
                let mut guard = page.write()?;
                // someone filled it between the probe and the exclusive lock
                if !guard.has_empty_slot() {
                    continue;
                }
                guard.insert_record(record)?;
                guard.mark_dirty(txn_id);
            }
            return Ok(vec![page]);
        }
    }

    pub fn delete_record(
        &self,
        pool: &BufferPool,
        txn_id: TransactionID,
        record: &Record,
    ) -> Result<Vec<PageRef>> {
        let RID(page_id, _) = record
            .rid
            .ok_or_else(|| Error::invalid_state("record has no rid"))?;
        self.check_page_id(page_id)?;
        if page_id.page_number >= self.num_pages()? {
            return Err(Error::invalid_state(format!(
                "page {} is past the end of table {}",
                page_id, self.table_id.0
            )));
        }
        let page = pool.get_page(txn_id, page_id, Permission::ReadWrite)?;
        {
            let mut guard = page.write()?;
            guard.delete_record(record)?;
            guard.mark_dirty(txn_id);
        }
        Ok(vec![page])
    }

    /// Lazily walks every record through `pool`. With a transaction the scan
    /// takes shared locks page by page; without one it reads unlocked.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, txn_id: Option<TransactionID>) -> HeapScan<'a> {
        HeapScan::new(self, pool, txn_id)
    }
}
