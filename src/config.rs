use crate::{
    common::{DEFAULT_POOL_SIZE, PAGE_SIZE},
    lock::LockWaitPolicy,
};

/// Tunables shared by the pool and the heap files it serves.
///
/// `page_size` should only differ from [`PAGE_SIZE`] in tests; every heap file
/// registered with one pool must use the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub page_size: usize,
    pub pool_size: usize,
    pub lock_wait: LockWaitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            lock_wait: LockWaitPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }
    pub fn with_lock_wait(mut self, lock_wait: LockWaitPolicy) -> Self {
        self.lock_wait = lock_wait;
        self
    }
}
