//! Per-key single-flight: concurrent requests for the same key share one
//! execution.
//!
//! The first caller for a key becomes the leader and runs the work; later
//! callers subscribe to a watch channel and receive a clone of the leader's
//! result. If the leader is cancelled its sender is dropped, the entry is
//! removed, and a waiting follower retries as the new leader.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type Slot<T> = watch::Receiver<Option<T>>;

#[derive(Debug)]
pub struct Flights<T> {
    inflight: Arc<Mutex<HashMap<String, Slot<T>>>>,
}

impl<T> Default for Flights<T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> Clone for Flights<T> {
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

/// Held by the leader. Dropping it removes the entry before the sender
/// closes, so a woken follower never rejoins a dead slot.
struct LeaderGuard<T> {
    inflight: Arc<Mutex<HashMap<String, Slot<T>>>>,
    key: String,
    tx: watch::Sender<Option<T>>,
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        let mut map = match self.inflight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(&self.key);
    }
}

enum Role<T> {
    Leader(LeaderGuard<T>),
    Follower(Slot<T>),
}

impl<T: Clone + Send + Sync> Flights<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently executing.
    pub fn len(&self) -> usize {
        self.inflight.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join(&self, key: &str) -> Role<T> {
        // A poisoned lock only means another caller panicked while holding
        // it; the map itself is still consistent.
        let mut map = match self.inflight.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(rx) = map.get(key) {
            return Role::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        map.insert(key.to_string(), rx);
        Role::Leader(LeaderGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.to_string(),
            tx,
        })
    }

    /// Runs `work` for `key` unless another caller already is, in which case
    /// waits for and returns that caller's result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = loop {
            match self.join(key) {
                Role::Leader(guard) => break guard,
                Role::Follower(mut rx) => {
                    tracing::debug!(key, "joining in-flight build");
                    match rx.wait_for(Option::is_some).await {
                        Ok(value) => {
                            if let Some(result) = value.as_ref() {
                                return result.clone();
                            }
                        }
                        Err(_) => {
                            tracing::debug!(key, "in-flight build was cancelled, retrying");
                        }
                    }
                }
            }
        };

        let result = work().await;
        let _ = guard.tx.send(Some(result.clone()));
        drop(guard);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flights: Flights<u32> = Flights::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let work = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            7
        };

        let (a, b) = tokio::join!(
            flights.run("k", || work(calls.clone())),
            flights.run("k", || work(calls.clone())),
        );
        assert_eq!((a, b), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights: Flights<&'static str> = Flights::new();
        let (a, b) = tokio::join!(flights.run("a", || async { "a" }), flights.run("b", || async { "b" }));
        assert_eq!((a, b), ("a", "b"));
    }

    #[tokio::test]
    async fn test_cancelled_leader_hands_over() {
        let flights: Flights<u32> = Flights::new();
        let leader = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .run("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(flights.len(), 1);

        let follower = {
            let flights = flights.clone();
            tokio::spawn(async move { flights.run("k", || async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        assert_eq!(follower.await.unwrap(), 2);
        assert!(flights.is_empty());
    }
}
