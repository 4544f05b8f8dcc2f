use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    buffer::BufferPool,
    common::{TableID, TransactionID, RID},
    concurrency::TransactionManager,
    config::Config,
    error::{self, Error},
    record::Record,
    table::HeapFile,
};

#[derive(Debug, PartialEq, Eq)]
pub struct Stats {
    pub resident_pages: usize,
    pub capacity: usize,
    pub active_transactions: Vec<TransactionID>,
}

pub struct Instance {
    pub config: Config,
    pub buffer_pool: Arc<BufferPool>,
    pub transaction_manager: Arc<TransactionManager>,
    next_table_id: Mutex<u32>,
}

impl Instance {
    pub fn new(config: Config) -> Self {
        let buffer_pool = Arc::new(BufferPool::new(&config));
        let transaction_manager = Arc::new(TransactionManager::new(buffer_pool.clone()));
        Self {
            config,
            buffer_pool,
            transaction_manager,
            next_table_id: Mutex::new(1),
        }
    }

    /// Opens (or creates) the heap file at `path` and registers it under the
    /// next free table id.
    pub fn open_table(&self, path: impl AsRef<Path>, record_width: usize) -> Result<TableID> {
        let path = path.as_ref();
        let mut next_table_id = self.next_table_id.lock().map_err(Error::from)?;
        let table_id = TableID(*next_table_id);
        let file = HeapFile::open(path, table_id, record_width, self.config.page_size)
            .with_context(|| format!("failed to open table file {}", path.display()))?;
        self.buffer_pool.register_table(Arc::new(file))?;
        *next_table_id += 1;
        info!(table_id = table_id.0, path = %path.display(), "table opened");
        Ok(table_id)
    }
    pub fn table(&self, table_id: TableID) -> Result<Arc<HeapFile>> {
        Ok(self.buffer_pool.table(table_id)?)
    }

    // transactions
    pub fn begin(&self) -> Result<TransactionID> {
        Ok(self.transaction_manager.begin()?)
    }
    pub fn commit(&self, txn_id: TransactionID) -> Result<()> {
        Ok(self.transaction_manager.commit(txn_id)?)
    }
    pub fn abort(&self, txn_id: TransactionID) -> Result<()> {
        Ok(self.transaction_manager.abort(txn_id)?)
    }

    // records
    pub fn insert(&self, txn_id: TransactionID, table_id: TableID, values: &[i32]) -> Result<RID> {
        let mut record = Record::from_values(values);
        self.buffer_pool
            .insert_record(txn_id, table_id, &mut record)?;
        record
            .rid
            .ok_or_else(|| Error::invalid_state("inserted record has no rid").into())
    }
    pub fn delete(&self, txn_id: TransactionID, rid: RID) -> Result<()> {
        // deletion only looks at the rid
        let record = Record::new(Some(rid), &[]);
        Ok(self.buffer_pool.delete_record(txn_id, &record)?)
    }
    pub fn scan(&self, txn_id: Option<TransactionID>, table_id: TableID) -> Result<Vec<Record>> {
        let file = self.table(table_id)?;
        let records = file
            .iter(&self.buffer_pool, txn_id)
            .collect::<error::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.buffer_pool.flush_all()?)
    }
    pub fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            resident_pages: self.buffer_pool.resident_pages()?,
            capacity: self.buffer_pool.capacity(),
            active_transactions: self.transaction_manager.active_transactions()?,
        })
    }

    /// Aborts whatever is still running, then writes every dirty page.
    pub fn shutdown(&self) -> Result<()> {
        for txn_id in self.transaction_manager.active_transactions()? {
            self.abort(txn_id)?;
        }
        self.flush()?;
        info!("shutdown complete");
        Ok(())
    }
}
