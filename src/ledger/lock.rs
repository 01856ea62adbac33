//! Operation lock for the ledger.
//!
//! ```plain
//!   top-level call ──► scope(ledger id) ──► acquire mutex ──► run ──► release
//!                                                              │
//!   nested call into the same ledger (same task) ◄─────────────┘
//!        └─► ledger id already in scope ──► Err(Reentrancy)
//! ```
//!
//! Top-level operations from different tasks wait on the mutex and run one at
//! a time. A call made from inside a running operation (an adapter or token
//! calling back into the ledger) finds the ledger's id in the task-local scope
//! and is rejected instead of deadlocking. The guard is dropped on every exit
//! path, errors included.

use crate::error::{VaultError, VaultResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::warn;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Ledger locks held by the operation chain running on this task.
    static HELD_LOCKS: Vec<u64>;
}

/// Serializing, reentrancy-rejecting lock.
#[derive(Debug)]
pub struct OperationLock {
    id: u64,
    mutex: Mutex<()>,
}

impl Default for OperationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationLock {
    pub fn new() -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            mutex: Mutex::new(()),
        }
    }

    /// Whether the current call chain is already inside an operation guarded by this lock.
    pub fn held_by_current_task(&self) -> bool {
        HELD_LOCKS
            .try_with(|held| held.contains(&self.id))
            .unwrap_or(false)
    }

    /// Run `operation` exclusively.
    pub async fn run<T, F>(&self, operation: F) -> VaultResult<T>
    where
        F: Future<Output = VaultResult<T>>,
    {
        if self.held_by_current_task() {
            warn!(lock = self.id, "Reentrant ledger call rejected");
            return Err(VaultError::Reentrancy);
        }

        let mut held = HELD_LOCKS.try_with(|held| held.clone()).unwrap_or_default();
        held.push(self.id);

        HELD_LOCKS
            .scope(held, async {
                let _guard = self.mutex.lock().await;
                operation.await
            })
            .await
    }
}
