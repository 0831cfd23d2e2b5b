//! Single-writer leases keyed by binding store identity
//!
//! Two runs against the same binding store would both see an unbound
//! transaction and both push it. Every run holds the lease for its store for
//! its whole duration, so runs on one store are serialized within a process.
//! An entry lives in the table only while some run holds or waits for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LeaseTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

fn table() -> &'static LeaseTable {
    static TABLE: OnceLock<LeaseTable> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_for(identity: &str) -> Arc<AsyncMutex<()>> {
    // A poisoned table only means another thread panicked while inserting;
    // the map itself is still consistent.
    let mut table = table().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    table
        .entry(identity.to_string())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Held for the duration of a run; released on drop
#[derive(Debug)]
pub struct RunLease {
    identity: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RunLease {
    /// The binding store this lease covers
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Wait until no other run holds the lease for `identity`, then take it
pub async fn acquire(identity: &str) -> RunLease {
    let guard = lock_for(identity).lock_owned().await;
    RunLease {
        identity: identity.to_string(),
        guard: Some(guard),
    }
}

/// Take the lease only if it is free right now
pub fn try_acquire(identity: &str) -> Option<RunLease> {
    let lock = lock_for(identity);
    match lock.try_lock_owned() {
        Ok(guard) => Some(RunLease {
            identity: identity.to_string(),
            guard: Some(guard),
        }),
        Err(_) => None,
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        // The guard owns a reference to the mutex; release it before counting
        drop(self.guard.take());

        let mut table = table().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Waiters and other holders keep their own reference
        let unused = table
            .get(&self.identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            table.remove(&self.identity);
        }
    }
}

#[cfg(test)]
fn is_tracked(identity: &str) -> bool {
    table()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .contains_key(identity)
}
