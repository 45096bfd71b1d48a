//! # Order Store
//!
//! The order-access interface the gateway runs against, plus an in-memory
//! implementation used by the HTTP service and tests.
//!
//! Saves are optimistic: an order carries the version it was loaded at, and
//! a save against a newer stored version fails with
//! [`PaymentError::ConcurrentModification`]. Mutating operations also take
//! the per-order lock from [`OrderLocks`] so two admins acting on the same
//! order are serialized rather than rejected.

use crate::error::{PaymentError, PaymentResult};
use crate::order::Order;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Order persistence used by the lifecycle
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Load an order by id
    async fn get(&self, order_id: &str) -> PaymentResult<Order>;

    /// Register a new order
    async fn insert(&self, order: Order) -> PaymentResult<()>;

    /// Persist `order` if nobody saved it since it was loaded; bumps its
    /// version on success
    async fn save(&self, order: &mut Order) -> PaymentResult<()>;
}

/// Type alias for a shared order store
pub type SharedOrderStore = Arc<dyn OrderStore>;

/// `HashMap` behind an async `RwLock`
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, order_id: &str) -> PaymentResult<Order> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| PaymentError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }

    async fn insert(&self, order: Order) -> PaymentResult<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(PaymentError::InvalidRequest(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn save(&self, order: &mut Order) -> PaymentResult<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get(&order.id)
            .ok_or_else(|| PaymentError::OrderNotFound {
                order_id: order.id.clone(),
            })?;
        if stored.version() != order.version() {
            return Err(PaymentError::ConcurrentModification {
                order_id: order.id.clone(),
            });
        }
        order.bump_version();
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }
}

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// Per-order async mutexes. An entry lives only while someone holds or
/// waits for it.
#[derive(Debug, Default)]
pub struct OrderLocks {
    locks: Arc<StdMutex<LockMap>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `order_id`
    pub async fn lock(&self, order_id: &str) -> OrderLockGuard {
        let lock = lock_map(&self.locks)
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        OrderLockGuard {
            guard: Some(lock.lock_owned().await),
            order_id: order_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Orders currently locked or awaited
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one order; releasing the last holder removes the
/// order's entry
#[derive(Debug)]
pub struct OrderLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    order_id: String,
    locks: Arc<StdMutex<LockMap>>,
}

impl Drop for OrderLockGuard {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // Waiters clone the entry under the map lock, so the count is stable here
        let mut locks = lock_map(&self.locks);
        drop(guard);
        if locks
            .get(&self.order_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&self.order_id);
        }
    }
}

fn lock_map(locks: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryOrderStore::new();
        let err = store.get("404").await.unwrap_err();
        assert!(matches!(err, PaymentError::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = InMemoryOrderStore::new();
        store.insert(Order::new("1", Currency::USD, 100)).await.unwrap();
        assert!(store.insert(Order::new("1", Currency::USD, 200)).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let store = InMemoryOrderStore::new();
        store.insert(Order::new("1", Currency::USD, 100)).await.unwrap();

        let mut first = store.get("1").await.unwrap();
        let mut second = store.get("1").await.unwrap();

        first.add_note("first writer");
        store.save(&mut first).await.unwrap();
        assert_eq!(first.version(), 1);

        second.add_note("second writer");
        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(err, PaymentError::ConcurrentModification { .. }));

        let stored = store.get("1").await.unwrap();
        assert_eq!(stored.notes().len(), 1);
        assert_eq!(stored.notes()[0].message, "first writer");
    }

    #[tokio::test]
    async fn test_order_locks_serialize() {
        let locks = Arc::new(OrderLocks::new());
        let guard = locks.lock("1").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock("1").await;
        });

        // Different orders do not contend
        let _unrelated = locks.lock("2").await;

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_order_locks_release_entries() {
        let locks = Arc::new(OrderLocks::new());
        for i in 0..100 {
            let _guard = locks.lock(&format!("ghost-{}", i)).await;
        }
        assert!(locks.is_empty());

        // Entry survives while a waiter still needs it
        let guard = locks.lock("1").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock("1").await;
        });
        tokio::task::yield_now().await;
        drop(guard);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
