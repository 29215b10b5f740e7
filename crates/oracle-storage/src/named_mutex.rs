//! Process-wide advisory locks keyed by resource name.
//!
//! Each name maps to a fair `tokio::sync::Mutex`, so waiters are served in
//! arrival order. A [`LockHandle`] releases on drop, which covers early
//! returns, errors, panics and cancelled tasks alike. Locks are not
//! reentrant: acquiring a name you already hold waits forever.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use oracle_core::storage::ProfileStoreError;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{trace, warn};

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

/// Registry of named mutexes. Create one at process start and hand clones
/// to every component that must serialize on the same resources.
#[derive(Debug, Clone, Default)]
pub struct NamedMutexRegistry {
    table: Arc<Mutex<LockTable>>,
}

/// Exclusive hold on one resource name. Released when dropped.
#[derive(Debug)]
pub struct LockHandle {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<Mutex<LockTable>>,
}

impl NamedMutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `name` to be free. With a timeout, gives up with
    /// `LockTimeout` and leaves the queue.
    pub async fn acquire(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<LockHandle, ProfileStoreError> {
        let mutex = self.entry(name);
        let guard = match timeout {
            None => mutex.lock_owned().await,
            Some(limit) => match tokio::time::timeout(limit, Arc::clone(&mutex).lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    let waited_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    warn!(resource = name, waited_ms, "lock wait timed out");
                    drop(mutex);
                    self.prune(name);
                    return Err(ProfileStoreError::LockTimeout {
                        resource: name.to_string(),
                        waited_ms,
                    });
                }
            },
        };
        trace!(resource = name, "lock acquired");
        Ok(self.handle(name, guard))
    }

    /// Take `name` only if nobody holds or waits for it.
    pub fn try_acquire(&self, name: &str) -> Option<LockHandle> {
        let mutex = self.entry(name);
        match Arc::clone(&mutex).try_lock_owned() {
            Ok(guard) => Some(self.handle(name, guard)),
            Err(_) => {
                drop(mutex);
                self.prune(name);
                None
            }
        }
    }

    /// Number of names currently held or waited on.
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, name: &str) -> Arc<AsyncMutex<()>> {
        lock_table(&self.table)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn handle(&self, name: &str, guard: OwnedMutexGuard<()>) -> LockHandle {
        LockHandle {
            name: name.to_string(),
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    fn prune(&self, name: &str) {
        prune_entry(&mut lock_table(&self.table), name);
    }
}

impl LockHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        // Release first so the waiter count below is accurate.
        drop(self.guard.take());
        prune_entry(&mut table, &self.name);
        trace!(resource = %self.name, "lock released");
    }
}

/// Drop the entry once no holder or waiter references it.
fn prune_entry(table: &mut LockTable, name: &str) {
    if table
        .get(name)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        table.remove(name);
    }
}

// The table holds no invariant a panicking holder could break.
fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
