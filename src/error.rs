use std::{io, sync::PoisonError};

use thiserror::Error;

use crate::common::{PageID, TransactionID};

#[derive(Debug, Error)]
pub enum Error {
    /// A lock wait ran past its abort threshold. The caller owns the cleanup:
    /// abort the transaction, then optionally retry as a new one.
    #[error("{txn_id} aborted while waiting for a lock on page {page_id}")]
    TransactionAborted {
        txn_id: TransactionID,
        page_id: PageID,
    },

    #[error("buffer pool is full: no clean page among {capacity} resident pages")]
    ResourceExhausted { capacity: usize },

    #[error("storage I/O error: {0}")]
    StorageIO(#[from] io::Error),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. })
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::InvalidState("lock poisoned".to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
