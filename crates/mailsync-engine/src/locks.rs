//! # Per-Mailbox Locks
//!
//! Keyed async mutexes enforcing the single-writer invariant: two
//! overlapping syncs for the *same* mailbox must not interleave, or one
//! could silently overwrite the other's cursor. Different mailboxes sync
//! concurrently without contention.
//!
//! The optimistic version column on mailbox rows is the second line of
//! defense; this lock keeps well-behaved callers from ever hitting it.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed mutex registry, one async mutex per mailbox address.
///
/// Entries are created on first use and kept for the process lifetime;
/// the set of monitored mailboxes is small and bounded by configuration.
#[derive(Debug, Default)]
pub struct MailboxLocks {
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MailboxLocks {
    pub fn new() -> Self {
        MailboxLocks::default()
    }

    /// Acquires the lock for one mailbox address, waiting if another sync
    /// holds it. The guard releases on drop.
    pub async fn acquire(&self, address: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("mailbox lock registry poisoned");
            locks
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_address_is_mutually_exclusive() {
        let locks = Arc::new(MailboxLocks::new());

        let guard = locks.acquire("a@x.com").await;

        let locks_clone = locks.clone();
        let contender = tokio::spawn(async move {
            let _guard = locks_clone.acquire("a@x.com").await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn different_addresses_do_not_contend() {
        let locks = MailboxLocks::new();

        let _a = locks.acquire("a@x.com").await;
        // Acquiring a different key must not block.
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b@x.com"))
            .await
            .expect("different key should not block");
    }
}
