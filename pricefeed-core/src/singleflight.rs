use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::FeedError;

/// Keyed single-flight registry: at most one producer runs per key, and
/// every concurrent caller for that key observes the one outcome.
///
/// The producer runs on a spawned task that owns its registry entry and
/// removes it when it settles, so a caller abandoning its wait (e.g. on a
/// request deadline) does not cancel the flight — the result still lands
/// wherever the producer writes it.
pub struct SingleFlight<K, V> {
    inflight: Arc<Mutex<HashMap<K, broadcast::Sender<Result<V, FeedError>>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys currently in flight.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inflight.lock().expect("singleflight mutex poisoned").len()
    }

    /// Whether no flight is currently running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Join the flight for `key`, or start one by running `producer`.
    ///
    /// The producer must be idempotent-safe: several callers observe its
    /// single execution.
    ///
    /// # Errors
    /// Returns whatever the producer returned, shared across all joiners.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    pub async fn run<F>(&self, key: K, producer: F) -> Result<V, FeedError>
    where
        F: Future<Output = Result<V, FeedError>> + Send + 'static,
    {
        let mut rx = {
            let mut map = self.inflight.lock().expect("singleflight mutex poisoned");
            if let Some(tx) = map.get(&key) {
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                map.insert(key.clone(), tx.clone());
                let registry = Arc::clone(&self.inflight);
                tokio::spawn(async move {
                    let outcome = producer.await;
                    // Remove before broadcasting: a caller arriving after the
                    // send would otherwise subscribe to a channel that never
                    // fires again.
                    registry
                        .lock()
                        .expect("singleflight mutex poisoned")
                        .remove(&key);
                    let _ = tx.send(outcome);
                });
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(FeedError::ShuttingDown),
        }
    }
}
