//! Generic event-correlation pool.
//!
//! Subtags that must pause until some external event occurs register an
//! awaiter under one or more pool keys with a predicate and a deadline. When
//! the host observes a candidate event it calls [`AwaiterPool::deliver`];
//! awaiters are offered the event in registration order and the first
//! predicate match claims it exclusively. Resolution and timeout both remove
//! the awaiter from every key it was registered under.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

/// Decides whether a delivered event belongs to a waiting execution.
pub type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A shared pool of pending awaiters, keyed by arbitrary strings.
pub struct AwaiterPool<T> {
    inner: Arc<Mutex<PoolInner<T>>>,
}

impl<T> Clone for AwaiterPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Default for AwaiterPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct PoolInner<T> {
    next_id: u64,
    // Registration order per key; entry ids are monotonically increasing.
    pools: HashMap<String, Vec<u64>>,
    entries: HashMap<u64, Entry<T>>,
}

struct Entry<T> {
    keys: Vec<String>,
    predicate: Predicate<T>,
    sender: oneshot::Sender<T>,
}

impl<T: Send + 'static> AwaiterPool<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                next_id: 0,
                pools: HashMap::new(),
                entries: HashMap::new(),
            })),
        }
    }

    /// Suspends until an event matching `predicate` arrives on any of `keys`,
    /// or until `timeout` elapses. Returns `None` on timeout.
    pub async fn wait(
        &self,
        keys: Vec<String>,
        predicate: Predicate<T>,
        timeout: Duration,
    ) -> Option<T> {
        let (sender, receiver) = oneshot::channel();
        let id = {
            let mut inner = self.inner.lock().await;
            let id = inner.next_id;
            inner.next_id += 1;
            for key in &keys {
                inner.pools.entry(key.clone()).or_default().push(id);
            }
            inner.entries.insert(
                id,
                Entry {
                    keys,
                    predicate,
                    sender,
                },
            );
            id
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(event)) => Some(event),
            // Timed out, or the sender was dropped during pool teardown.
            _ => {
                self.remove(id).await;
                None
            }
        }
    }

    /// Offers `event` to the awaiters registered under `key`, in registration
    /// order. The first predicate match consumes the event; returns whether
    /// anything claimed it.
    pub async fn deliver(&self, key: &str, mut event: T) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(candidates) = inner.pools.get(key).cloned() else {
            return false;
        };

        for id in candidates {
            let matches = match inner.entries.get(&id) {
                Some(entry) => (entry.predicate)(&event),
                None => continue,
            };
            if !matches {
                continue;
            }
            if let Some(entry) = inner.entries.remove(&id) {
                detach(&mut inner.pools, id, &entry.keys);
                // A closed receiver means the waiter already gave up; the
                // event stays unclaimed and the next candidate gets a look.
                match entry.sender.send(event) {
                    Ok(()) => return true,
                    Err(returned) => {
                        event = returned;
                        continue;
                    }
                }
            }
        }
        false
    }

    /// Number of pending awaiters, across all keys.
    pub async fn pending(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    async fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.remove(&id) {
            detach(&mut inner.pools, id, &entry.keys);
        }
    }
}

fn detach(pools: &mut HashMap<String, Vec<u64>>, id: u64, keys: &[String]) {
    for key in keys {
        if let Some(ids) = pools.get_mut(key) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                pools.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_resolves_a_matching_awaiter() {
        let pool: AwaiterPool<u32> = AwaiterPool::new();
        let waiter = pool.clone();
        let handle = tokio::spawn(async move {
            waiter
                .wait(
                    vec!["k".into()],
                    Box::new(|event| *event > 10),
                    Duration::from_secs(5),
                )
                .await
        });
        tokio::task::yield_now().await;
        while pool.pending().await == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!pool.deliver("k", 3).await);
        assert!(pool.deliver("k", 42).await);
        assert_eq!(handle.await.unwrap(), Some(42));
        assert_eq!(pool.pending().await, 0);
    }

    #[tokio::test]
    async fn at_most_one_awaiter_claims_an_event() {
        let pool: AwaiterPool<u32> = AwaiterPool::new();
        let first = pool.clone();
        let second = pool.clone();
        let a = tokio::spawn(async move {
            first
                .wait(vec!["k".into()], Box::new(|_| true), Duration::from_secs(5))
                .await
        });
        while pool.pending().await < 1 {
            tokio::task::yield_now().await;
        }
        let b = tokio::spawn(async move {
            second
                .wait(
                    vec!["k".into(), "other".into()],
                    Box::new(|_| true),
                    Duration::from_millis(200),
                )
                .await
        });
        while pool.pending().await < 2 {
            tokio::task::yield_now().await;
        }

        assert!(pool.deliver("k", 7).await);
        // Registration order: the first awaiter wins, the second times out.
        assert_eq!(a.await.unwrap(), Some(7));
        assert_eq!(b.await.unwrap(), None);
        assert_eq!(pool.pending().await, 0);
    }

    #[tokio::test]
    async fn timeout_cleans_up_every_key() {
        let pool: AwaiterPool<u32> = AwaiterPool::new();
        let result = pool
            .wait(
                vec!["a".into(), "b".into()],
                Box::new(|_| true),
                Duration::from_millis(20),
            )
            .await;
        assert_eq!(result, None);
        assert_eq!(pool.pending().await, 0);
        assert!(!pool.deliver("a", 1).await);
        assert!(!pool.deliver("b", 1).await);
    }
}
