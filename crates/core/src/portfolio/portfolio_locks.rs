use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// Async mutexes keyed by portfolio id. Entries exist only while a guard is
/// held or awaited, so the table does not grow with every id ever locked.
#[derive(Default)]
pub struct PortfolioLocks {
    locks: Arc<LockTable>,
}

/// Holds one portfolio's lock until dropped.
pub struct PortfolioLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockTable>,
    portfolio_id: String,
}

impl PortfolioLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, portfolio_id: &str) -> PortfolioLockGuard {
        let lock = self
            .locks
            .entry(portfolio_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        PortfolioLockGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            portfolio_id: portfolio_id.to_string(),
        }
    }

    /// Number of portfolios currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for PortfolioLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold their own clone of the mutex, so a count of one means
        // only the table still refers to it.
        self.locks
            .remove_if(&self.portfolio_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
