use std::mem;

use crate::{
    buffer::{BufferPool, PageRef},
    common::{PageID, Permission, TransactionID},
    error::Result,
    record::Record,
};

use super::HeapFile;

enum ScanState {
    Unopened,
    OnPage {
        page_number: u32,
        slot: usize,
        page: PageRef,
    },
    Exhausted,
}

/// Walks a heap file page by page, slot by slot. Pages are fetched only as
/// the scan reaches them. After yielding an error the scan is exhausted.
pub struct HeapScan<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    txn_id: Option<TransactionID>,
    state: ScanState,
}

impl<'a> HeapScan<'a> {
    pub(super) fn new(
        file: &'a HeapFile,
        pool: &'a BufferPool,
        txn_id: Option<TransactionID>,
    ) -> Self {
        Self {
            file,
            pool,
            txn_id,
            state: ScanState::Unopened,
        }
    }

    /// Restarts from the first record. Locks taken so far stay held.
    pub fn rewind(&mut self) {
        self.state = ScanState::Unopened;
    }

    fn open(&self, page_number: u32) -> Result<ScanState> {
        if page_number >= self.file.num_pages()? {
            return Ok(ScanState::Exhausted);
        }
        let page_id = PageID::new(self.file.table_id(), page_number);
        let page = match self.txn_id {
            Some(txn_id) => self.pool.get_page(txn_id, page_id, Permission::ReadOnly)?,
            None => self.pool.get_page_unlocked(page_id)?,
        };
        Ok(ScanState::OnPage {
            page_number,
            slot: 0,
            page,
        })
    }

    fn advance(&mut self) -> Result<Option<Record>> {
        loop {
            match mem::replace(&mut self.state, ScanState::Exhausted) {
                ScanState::Exhausted => return Ok(None),
                ScanState::Unopened => self.state = self.open(0)?,
                ScanState::OnPage {
                    page_number,
                    slot,
                    page,
                } => {
                    let found = {
                        let page = page.read()?;
                        page.next_used_slot(slot)
                            .and_then(|slot| page.get_record(slot).map(|record| (slot, record)))
                    };
                    match found {
                        Some((slot, record)) => {
                            self.state = ScanState::OnPage {
                                page_number,
                                slot: slot + 1,
                                page,
                            };
                            return Ok(Some(record));
                        }
                        None => self.state = self.open(page_number + 1)?,
                    }
                }
            }
        }
    }
}

impl Iterator for HeapScan<'_> {
    type Item = Result<Record>;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
