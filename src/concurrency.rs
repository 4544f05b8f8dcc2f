use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tracing::debug;

use crate::{
    buffer::BufferPool,
    common::TransactionID,
    error::{Error, Result},
};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum TransactionStatus {
    Running,
    Aborted,
    Committed,
}

/// Hands out transaction ids and ends transactions through the buffer pool.
pub struct TransactionManager {
    buffer_pool: Arc<BufferPool>,
    next_txn_id: AtomicU64,
    statuses: Mutex<HashMap<TransactionID, TransactionStatus>>,
}

impl TransactionManager {
    pub fn new(buffer_pool: Arc<BufferPool>) -> Self {
        Self {
            buffer_pool,
            next_txn_id: AtomicU64::new(1),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self) -> Result<TransactionID> {
        let txn_id = TransactionID(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        self.statuses
            .lock()?
            .insert(txn_id, TransactionStatus::Running);
        debug!(%txn_id, "transaction started");
        Ok(txn_id)
    }

    /// Flushes the pages `txn_id` dirtied and releases its locks. If the
    /// flush fails the transaction stays running and should be aborted.
    pub fn commit(&self, txn_id: TransactionID) -> Result<()> {
        self.ensure_running(txn_id)?;
        self.buffer_pool.commit(txn_id)?;
        self.statuses
            .lock()?
            .insert(txn_id, TransactionStatus::Committed);
        Ok(())
    }

    /// Drops the pages `txn_id` dirtied and releases its locks.
    pub fn abort(&self, txn_id: TransactionID) -> Result<()> {
        self.ensure_running(txn_id)?;
        self.buffer_pool.abort(txn_id)?;
        self.statuses
            .lock()?
            .insert(txn_id, TransactionStatus::Aborted);
        Ok(())
    }

    pub fn status(&self, txn_id: TransactionID) -> Result<Option<TransactionStatus>> {
        Ok(self.statuses.lock()?.get(&txn_id).copied())
    }

    pub fn active_transactions(&self) -> Result<Vec<TransactionID>> {
        let mut active = self
            .statuses
            .lock()?
            .iter()
            .filter(|(_, &status)| status == TransactionStatus::Running)
            .map(|(&txn_id, _)| txn_id)
            .collect::<Vec<_>>();
        active.sort();
        Ok(active)
    }

    fn ensure_running(&self, txn_id: TransactionID) -> Result<()> {
        match self.status(txn_id)? {
            Some(TransactionStatus::Running) => Ok(()),
            Some(status) => Err(Error::invalid_state(format!(
                "{} is already {:?}",
                txn_id, status
            ))),
            None => Err(Error::invalid_state(format!("unknown transaction {}", txn_id))),
        }
    }
}
