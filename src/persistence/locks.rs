use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

/// Keyed mutex table: one exclusive section per user id
///
/// Holders of different keys never wait on each other. An entry lives only
/// while some caller holds or waits for its section, so the table is bounded
/// by the users with a debit in progress.
#[derive(Debug, Default)]
pub struct UserLockTable {
    locks: Arc<LockMap>,
}

impl UserLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: i64) -> UserLockGuard {
        // Clone out of the map so the shard is not held across the await
        let mutex = self.locks.entry(user_id).or_default().clone();
        let guard = mutex.lock_owned().await;
        UserLockGuard {
            user_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Users with a section currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held section of one user; dropping it releases the section
#[derive(Debug)]
pub struct UserLockGuard {
    user_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl UserLockGuard {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's own reference is the last one once nobody holds or waits;
        // remove_if runs under the shard lock, so `lock` cannot clone in between
        self.locks
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
