use std::{
    collections::HashMap,
    sync::{Condvar, MutexGuard},
    time::{Duration, Instant},
};

use rand::Rng;
use tracing::{debug, warn};

use crate::{
    common::{PageID, Permission, TransactionID},
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Shared,
    Exclusive,
}
impl From<Permission> for LockType {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::ReadOnly => LockType::Shared,
            Permission::ReadWrite => LockType::Exclusive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lock {
    pub txn_id: TransactionID,
    pub page_id: PageID,
    pub lock_type: LockType,
}

/// How long a blocked acquisition may wait before giving up.
///
/// Every acquisition draws its own threshold from `base + [0, jitter]`, so two
/// transactions stuck on each other rarely time out together. `poll` bounds
/// each sleep between re-checks even when nobody signals a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWaitPolicy {
    pub base: Duration,
    pub jitter: Duration,
    pub poll: Duration,
}

impl Default for LockWaitPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            jitter: Duration::from_millis(400),
            poll: Duration::from_millis(50),
        }
    }
}

impl LockWaitPolicy {
    pub fn threshold(&self) -> Duration {
        let jitter = self.jitter.as_millis() as u64;
        self.base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter))
    }
}

/// Lock bookkeeping. Holds no synchronization of its own; callers keep it
/// behind the same mutex as the pages it protects.
#[derive(Default)]
pub struct LockManager {
    shared_by_page: HashMap<PageID, Vec<TransactionID>>,
    // The head of the list, if any, holds the exclusive lock.
    exclusive_by_page: HashMap<PageID, Vec<TransactionID>>,
    locks_by_txn: HashMap<TransactionID, Vec<Lock>>,
}

/// State guarded by the mutex that [`acquire`] waits on. Whatever else lives
/// behind that mutex, it must expose the lock manager.
pub trait LockTable {
    fn lock_manager(&mut self) -> &mut LockManager;
}

impl LockTable for LockManager {
    fn lock_manager(&mut self) -> &mut LockManager {
        self
    }
}

impl LockManager {
    fn exclusive_holder(&self, page_id: PageID) -> Option<TransactionID> {
        self.exclusive_by_page
            .get(&page_id)
            .and_then(|holders| holders.first().copied())
    }
    fn has_other_shared(&self, txn_id: TransactionID, page_id: PageID) -> bool {
        self.shared_by_page
            .get(&page_id)
            .map_or(false, |holders| holders.iter().any(|&t| t != txn_id))
    }
    fn held_type(&self, txn_id: TransactionID, page_id: PageID) -> Option<LockType> {
        self.locks_by_txn
            .get(&txn_id)?
            .iter()
            .find(|lock| lock.page_id == page_id)
            .map(|lock| lock.lock_type)
    }

    pub fn can_grant(&self, txn_id: TransactionID, page_id: PageID, lock_type: LockType) -> bool {
        let other_exclusive = self
            .exclusive_holder(page_id)
            .map_or(false, |holder| holder != txn_id);
        match lock_type {
            LockType::Shared => !other_exclusive,
            LockType::Exclusive => !other_exclusive && !self.has_other_shared(txn_id, page_id),
        }
    }

    /// Grants the lock if it is compatible with every other holder.
    /// Never blocks; returns whether `txn_id` now holds a sufficient lock.
    pub fn try_acquire(
        &mut self,
        txn_id: TransactionID,
        page_id: PageID,
        permission: Permission,
    ) -> bool {
        let requested = LockType::from(permission);
        let held = self.held_type(txn_id, page_id);
        match (held, requested) {
            (Some(LockType::Exclusive), _) | (Some(LockType::Shared), LockType::Shared) => {
                return true
            }
            _ => {}
        }
        if !self.can_grant(txn_id, page_id, requested) {
            return false;
        }
        match requested {
            LockType::Shared => {
                self.shared_by_page.entry(page_id).or_default().push(txn_id);
            }
            LockType::Exclusive => {
                // upgrade: the shared entry is subsumed by the exclusive one
                if let Some(holders) = self.shared_by_page.get_mut(&page_id) {
                    holders.retain(|&t| t != txn_id);
                }
                self.exclusive_by_page
                    .entry(page_id)
                    .or_default()
                    .push(txn_id);
            }
        }
        let locks = self.locks_by_txn.entry(txn_id).or_default();
        locks.retain(|lock| lock.page_id != page_id);
        locks.push(Lock {
            txn_id,
            page_id,
            lock_type: requested,
        });
        true
    }

    pub fn release(&mut self, txn_id: TransactionID, page_id: PageID) {
        if let Some(locks) = self.locks_by_txn.get_mut(&txn_id) {
            locks.retain(|lock| lock.page_id != page_id);
            if locks.is_empty() {
                self.locks_by_txn.remove(&txn_id);
            }
        }
        self.remove_from_page(txn_id, page_id);
    }

    pub fn release_all(&mut self, txn_id: TransactionID) -> Vec<Lock> {
        let locks = self.locks_by_txn.remove(&txn_id).unwrap_or_default();
        for lock in locks.iter() {
            self.remove_from_page(txn_id, lock.page_id);
        }
        locks
    }

    fn remove_from_page(&mut self, txn_id: TransactionID, page_id: PageID) {
        if let Some(holders) = self.shared_by_page.get_mut(&page_id) {
            holders.retain(|&t| t != txn_id);
            if holders.is_empty() {
                self.shared_by_page.remove(&page_id);
            }
        }
        if let Some(holders) = self.exclusive_by_page.get_mut(&page_id) {
            holders.retain(|&t| t != txn_id);
            if holders.is_empty() {
                self.exclusive_by_page.remove(&page_id);
            }
        }
    }

    pub fn is_exclusively_locked(&self, page_id: PageID) -> bool {
        self.exclusive_holder(page_id).is_some()
    }

    pub fn holds_lock(&self, txn_id: TransactionID, page_id: PageID) -> bool {
        self.held_type(txn_id, page_id).is_some()
    }

    pub fn locks_held(&self, txn_id: TransactionID) -> Vec<Lock> {
        self.locks_by_txn.get(&txn_id).cloned().unwrap_or_default()
    }

    pub fn exclusive_pages(&self, txn_id: TransactionID) -> Vec<PageID> {
        self.locks_by_txn
            .get(&txn_id)
            .map(|locks| {
                locks
                    .iter()
                    .filter(|lock| lock.lock_type == LockType::Exclusive)
                    .map(|lock| lock.page_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Blocks until `txn_id` holds `permission` on `page_id`, or its wait exceeds
/// the policy's randomized threshold.
///
/// `guard` protects the lock table; it is released while waiting on
/// `released` and handed back once the lock is granted. Whoever releases
/// locks under the same mutex must `notify_all` on `released`.
pub fn acquire<'a, S: LockTable>(
    mut guard: MutexGuard<'a, S>,
    released: &Condvar,
    policy: &LockWaitPolicy,
    txn_id: TransactionID,
    page_id: PageID,
    permission: Permission,
) -> Result<MutexGuard<'a, S>> {
    if guard.lock_manager().try_acquire(txn_id, page_id, permission) {
        return Ok(guard);
    }
    let started = Instant::now();
    let threshold = policy.threshold();
    debug!(%txn_id, %page_id, ?permission, "waiting for lock");
    loop {
        let waited = started.elapsed();
        if waited > threshold {
            warn!(%txn_id, %page_id, ?permission, ?waited, "lock wait timed out");
            return Err(Error::TransactionAborted { txn_id, page_id });
        }
        let (next, _) = released.wait_timeout(guard, policy.poll)?;
        guard = next;
        if guard.lock_manager().try_acquire(txn_id, page_id, permission) {
            debug!(%txn_id, %page_id, "lock granted after wait");
            return Ok(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use super::*;
    use crate::common::TableID;

    fn page(page_number: u32) -> PageID {
        PageID::new(TableID(1), page_number)
    }

    fn patient() -> LockWaitPolicy {
        LockWaitPolicy {
            base: Duration::from_secs(10),
            jitter: Duration::from_millis(0),
            poll: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_shared_locks_coexist() {
        let mut lock_manager = LockManager::default();
        assert!(lock_manager.try_acquire(TransactionID(1), page(0), Permission::ReadOnly));
        assert!(lock_manager.try_acquire(TransactionID(2), page(0), Permission::ReadOnly));
        assert!(lock_manager.holds_lock(TransactionID(1), page(0)));
        assert!(lock_manager.holds_lock(TransactionID(2), page(0)));
        assert!(!lock_manager.try_acquire(TransactionID(3), page(0), Permission::ReadWrite));
    }

    #[test]
    fn test_exclusive_excludes_others() {
        let mut lock_manager = LockManager::default();
        assert!(lock_manager.try_acquire(TransactionID(1), page(0), Permission::ReadWrite));
        assert!(!lock_manager.try_acquire(TransactionID(2), page(0), Permission::ReadOnly));
        assert!(!lock_manager.try_acquire(TransactionID(2), page(0), Permission::ReadWrite));
        // other pages are unaffected
        assert!(lock_manager.try_acquire(TransactionID(2), page(1), Permission::ReadWrite));
    }

    #[test]
    fn test_reentrant_and_upgrade() {
        let mut lock_manager = LockManager::default();
        let txn_id = TransactionID(1);
        assert!(lock_manager.try_acquire(txn_id, page(0), Permission::ReadOnly));
        assert!(lock_manager.try_acquire(txn_id, page(0), Permission::ReadOnly));
        assert!(lock_manager.try_acquire(txn_id, page(0), Permission::ReadWrite));
        assert!(lock_manager.try_acquire(txn_id, page(0), Permission::ReadOnly));
        assert_eq!(
            lock_manager.locks_held(txn_id),
            vec![Lock {
                txn_id,
                page_id: page(0),
                lock_type: LockType::Exclusive
            }]
        );
        assert_eq!(lock_manager.exclusive_pages(txn_id), vec![page(0)]);
        assert!(lock_manager.is_exclusively_locked(page(0)));
        assert!(!lock_manager.is_exclusively_locked(page(1)));
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let mut lock_manager = LockManager::default();
        assert!(lock_manager.try_acquire(TransactionID(1), page(0), Permission::ReadOnly));
        assert!(lock_manager.try_acquire(TransactionID(2), page(0), Permission::ReadOnly));
        assert!(!lock_manager.try_acquire(TransactionID(1), page(0), Permission::ReadWrite));
        assert!(!lock_manager.is_exclusively_locked(page(0)));
        lock_manager.release(TransactionID(2), page(0));
        assert!(lock_manager.try_acquire(TransactionID(1), page(0), Permission::ReadWrite));
        assert!(lock_manager.is_exclusively_locked(page(0)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut lock_manager = LockManager::default();
        assert!(lock_manager.try_acquire(TransactionID(1), page(0), Permission::ReadWrite));
        lock_manager.release(TransactionID(1), page(0));
        lock_manager.release(TransactionID(1), page(0));
        assert!(!lock_manager.holds_lock(TransactionID(1), page(0)));
        assert!(lock_manager.try_acquire(TransactionID(2), page(0), Permission::ReadWrite));
    }

    #[test]
    fn test_release_all() {
        let mut lock_manager = LockManager::default();
        let txn_id = TransactionID(1);
        assert!(lock_manager.try_acquire(txn_id, page(0), Permission::ReadOnly));
        assert!(lock_manager.try_acquire(txn_id, page(1), Permission::ReadWrite));
        assert!(lock_manager.try_acquire(TransactionID(2), page(0), Permission::ReadOnly));

        let released = lock_manager.release_all(txn_id);
        assert_eq!(released.len(), 2);
        assert!(lock_manager.locks_held(txn_id).is_empty());
        assert!(lock_manager.holds_lock(TransactionID(2), page(0)));
        assert!(lock_manager.try_acquire(TransactionID(3), page(1), Permission::ReadWrite));
        assert!(lock_manager.release_all(txn_id).is_empty());
    }

    #[test]
    fn test_threshold_bounds() {
        let policy = LockWaitPolicy::default();
        for _ in 0..100 {
            let threshold = policy.threshold();
            assert!(threshold >= Duration::from_millis(200));
            assert!(threshold <= Duration::from_millis(600));
        }
    }

    #[test]
    fn test_waiter_proceeds_after_release() -> Result<()> {
        let state = Arc::new((Mutex::new(LockManager::default()), Condvar::new()));
        {
            let (lock_manager, _) = &*state;
            assert!(lock_manager.lock()?.try_acquire(
                TransactionID(1),
                page(5),
                Permission::ReadWrite
            ));
        }

        let waiter_state = state.clone();
        let waiter = thread::spawn(move || -> Result<Duration> {
            let (lock_manager, released) = &*waiter_state;
            let started = Instant::now();
            let guard = acquire(
                lock_manager.lock()?,
                released,
                &patient(),
                TransactionID(2),
                page(5),
                Permission::ReadOnly,
            )?;
            assert!(guard.holds_lock(TransactionID(2), page(5)));
            Ok(started.elapsed())
        });

        thread::sleep(Duration::from_millis(150));
        {
            let (lock_manager, released) = &*state;
            lock_manager.lock()?.release_all(TransactionID(1));
            released.notify_all();
        }
        let waited = waiter
            .join()
            .map_err(|_| Error::invalid_state("waiter panicked"))??;
        assert!(waited >= Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn test_wait_times_out() -> Result<()> {
        let lock_manager = Mutex::new(LockManager::default());
        let released = Condvar::new();
        assert!(lock_manager
            .lock()?
            .try_acquire(TransactionID(1), page(0), Permission::ReadOnly));

        let policy = LockWaitPolicy {
            base: Duration::from_millis(30),
            jitter: Duration::from_millis(20),
            poll: Duration::from_millis(5),
        };
        let started = Instant::now();
        let result = acquire(
            lock_manager.lock()?,
            &released,
            &policy,
            TransactionID(2),
            page(0),
            Permission::ReadWrite,
        );
        assert!(matches!(
            result,
            Err(Error::TransactionAborted { txn_id: TransactionID(2), .. })
        ));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!lock_manager.lock()?.holds_lock(TransactionID(2), page(0)));
        Ok(())
    }
}
