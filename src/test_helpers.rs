use std::{path::Path, sync::Arc, time::Duration};

use crate::{
    buffer::BufferPool,
    common::TableID,
    config::Config,
    disk::{MemoryStore, PageStore},
    error::Result,
    lock::LockWaitPolicy,
    table::HeapFile,
};

/// Two `i32` fields.
pub const TEST_RECORD_WIDTH: usize = 8;

/// A pool serving table 1, backed by memory, with `pages` empty pages
/// already allocated.
pub fn memory_table(config: Config, pages: u32) -> Result<(Arc<BufferPool>, Arc<HeapFile>)> {
    let mut store = MemoryStore::new(config.page_size);
    for _ in 0..pages {
        store.allocate_page()?;
    }
    let file = Arc::new(HeapFile::new(
        TableID(1),
        TEST_RECORD_WIDTH,
        Box::new(store),
    )?);
    let pool = Arc::new(BufferPool::new(&config));
    pool.register_table(file.clone())?;
    Ok((pool, file))
}

/// A pool serving table 1, backed by the file at `path`.
pub fn disk_table(
    config: Config,
    path: impl AsRef<Path>,
) -> Result<(Arc<BufferPool>, Arc<HeapFile>)> {
    let file = Arc::new(HeapFile::open(
        path,
        TableID(1),
        TEST_RECORD_WIDTH,
        config.page_size,
    )?);
    let pool = Arc::new(BufferPool::new(&config));
    pool.register_table(file.clone())?;
    Ok((pool, file))
}

/// Pages of four 8-byte slots.
pub fn small_page_config() -> Config {
    Config::default().with_page_size(40)
}

/// Waits long enough that no test should ever see a timeout abort.
pub fn patient_config() -> Config {
    Config::default().with_lock_wait(LockWaitPolicy {
        base: Duration::from_secs(10),
        jitter: Duration::ZERO,
        poll: Duration::from_millis(10),
    })
}

/// Gives up on lock waits quickly, for contention tests.
pub fn impatient_policy() -> LockWaitPolicy {
    LockWaitPolicy {
        base: Duration::from_millis(10),
        jitter: Duration::from_millis(20),
        poll: Duration::from_millis(2),
    }
}
