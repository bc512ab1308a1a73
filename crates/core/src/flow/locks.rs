use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-ticket mutual exclusion. The orchestrator's load-mutate-save
/// sequence for one conversation is a critical section: two concurrent
/// replies to the same open ticket must not race to merge fields. Tickets
/// are keyed by customer, so the lock is too; different customers proceed
/// in parallel.
#[derive(Default)]
pub struct TicketLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TicketLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::TicketLocks;

    #[tokio::test]
    async fn same_key_serializes_and_different_keys_do_not() {
        let locks = Arc::new(TicketLocks::default());

        let held = locks.acquire("alice@example.com").await;

        // A different customer is not blocked by the held lock.
        let _other = locks.acquire("bob@example.com").await;

        // The same customer is blocked until the guard drops.
        let contended = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("alice@example.com").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(held);
        contended.await.expect("lock holder should finish after release");
    }
}
