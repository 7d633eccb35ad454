use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use pricefeed_types::{Pair, Registration, RegistryEvent, SourceName, now_ms};

/// Event-emitting set of tracked `(source, pair)` registrations.
///
/// Writes are serialized behind one mutex; reads hand out snapshots. Add
/// and remove notifications go out on a typed broadcast channel that the
/// streaming service subscribes to.
pub struct PairRegistry {
    inner: Mutex<HashMap<(SourceName, Pair), Registration>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for PairRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PairRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to add/remove notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Track a pair. Returns `true` if it was newly added (emitting
    /// `PairAdded`), `false` if it was already tracked.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    pub fn add_pair(&self, source: SourceName, pair: &Pair) -> bool {
        let added = {
            let mut inner = self.inner.lock().expect("registry mutex poisoned");
            let key = (source, pair.clone());
            if inner.contains_key(&key) {
                false
            } else {
                let now = now_ms();
                inner.insert(
                    key,
                    Registration {
                        pair: pair.clone(),
                        source,
                        registered_at: now,
                        last_request_at: now,
                        last_response_at: None,
                        last_fetch_at: None,
                    },
                );
                true
            }
        };
        if added {
            let _ = self.events.send(RegistryEvent::PairAdded {
                source,
                pair: pair.clone(),
            });
        }
        added
    }

    /// Stop tracking a pair. Returns `true` if it was tracked (emitting
    /// `PairRemoved`).
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    pub fn remove_pair(&self, source: SourceName, pair: &Pair) -> bool {
        let removed = self
            .inner
            .lock()
            .expect("registry mutex poisoned")
            .remove(&(source, pair.clone()))
            .is_some();
        if removed {
            let _ = self.events.send(RegistryEvent::PairRemoved {
                source,
                pair: pair.clone(),
            });
        }
        removed
    }

    /// Record a caller request, tracking the pair if it is new.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    pub fn track_request(&self, source: SourceName, pair: &Pair) {
        self.add_pair(source, pair);
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(reg) = inner.get_mut(&(source, pair.clone())) {
            reg.last_request_at = now_ms();
        }
    }

    /// Record an outbound upstream fetch.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    pub fn track_fetch(&self, source: SourceName, pair: &Pair) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(reg) = inner.get_mut(&(source, pair.clone())) {
            reg.last_fetch_at = Some(now_ms());
        }
    }

    /// Record a successful fetch (REST or streaming).
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    pub fn track_success(&self, source: SourceName, pair: &Pair) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if let Some(reg) = inner.get_mut(&(source, pair.clone())) {
            reg.last_response_at = Some(now_ms());
        }
    }

    /// Whether the pair is tracked for the source.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn contains(&self, source: SourceName, pair: &Pair) -> bool {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .contains_key(&(source, pair.clone()))
    }

    /// Tracked pairs for one source.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn pairs_for(&self, source: SourceName) -> Vec<Pair> {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .filter(|r| r.source == source)
            .map(|r| r.pair.clone())
            .collect()
    }

    /// Snapshot of every registration.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Registration> {
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.source, &a.pair).cmp(&(b.source, &b.pair)));
        rows
    }

    /// Snapshot of registrations for one source.
    ///
    /// # Panics
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn snapshot_for(&self, source: SourceName) -> Vec<Registration> {
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .filter(|r| r.source == source)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.pair.cmp(&b.pair));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Pair {
        Pair::new("BTC", "USD").unwrap()
    }

    #[tokio::test]
    async fn add_and_remove_emit_events() {
        let registry = PairRegistry::new();
        let mut rx = registry.subscribe();

        assert!(registry.add_pair(SourceName::Binance, &pair()));
        assert!(!registry.add_pair(SourceName::Binance, &pair()));
        assert!(registry.remove_pair(SourceName::Binance, &pair()));
        assert!(!registry.remove_pair(SourceName::Binance, &pair()));

        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::PairAdded {
                source: SourceName::Binance,
                pair: pair()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::PairRemoved {
                source: SourceName::Binance,
                pair: pair()
            }
        );
    }

    #[test]
    fn request_and_response_stamps_are_ordered() {
        let registry = PairRegistry::new();
        registry.track_request(SourceName::Kraken, &pair());
        registry.track_success(SourceName::Kraken, &pair());

        let rows = registry.snapshot_for(SourceName::Kraken);
        assert_eq!(rows.len(), 1);
        let reg = &rows[0];
        assert!(reg.registered_at <= reg.last_request_at);
        let responded = reg.last_response_at.unwrap();
        assert!(responded <= now_ms());
    }

    #[test]
    fn pairs_are_scoped_per_source() {
        let registry = PairRegistry::new();
        registry.track_request(SourceName::Binance, &pair());
        let eth = Pair::new("ETH", "USD").unwrap();
        registry.track_request(SourceName::Binance, &eth);
        registry.track_request(SourceName::Kraken, &pair());

        assert_eq!(registry.pairs_for(SourceName::Binance).len(), 2);
        assert_eq!(registry.pairs_for(SourceName::Kraken).len(), 1);
        assert_eq!(registry.snapshot().len(), 3);
    }
}
