//! Per-customer serialization
//!
//! Each ledger unit of work holds its customer's lock from before the
//! transaction begins until after it commits, so two operations on one
//! customer never interleave inside this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct CustomerLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `customer_id`.
    pub async fn acquire(&self, customer_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on can go
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(customer_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of customers with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_customer_waits() {
        let locks = Arc::new(CustomerLocks::new());
        let guard = locks.acquire("10000001").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("10000001").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_customers_do_not_block() {
        let locks = CustomerLocks::new();
        let _a = locks.acquire("10000001").await;
        let _b = locks.acquire("10000002").await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = CustomerLocks::new();
        drop(locks.acquire("10000001").await);
        drop(locks.acquire("10000002").await);
        let _c = locks.acquire("10000003").await;
        assert_eq!(locks.tracked(), 1);
    }
}
