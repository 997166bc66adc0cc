//! Deletion events and the table of handlers listening for them.
//!
//! The domain layer reports "object about to be removed" as a
//! [`DeletionEvent`]. The [`SignalBus`] routes it to every handler connected
//! for the event's `(source, domain)` pair. Connections are keyed, so wiring
//! the same listener twice replaces it instead of running it twice.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use recommends_core::{Domain, ItemRef, Result};
use serde::{Deserialize, Serialize};

/// Kind of domain-layer notification a provider can listen to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Sent before an object is permanently deleted.
    PreDelete,
    /// Sent after an object was deleted.
    PostDelete,
    /// Application-defined source.
    Custom(String),
}

/// An object in `domain` is being removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEvent {
    /// What emitted the event.
    pub source: EventSource,
    /// Domain of the removed object.
    pub domain: Domain,
    /// Id of the removed object.
    pub object_id: String,
}

impl DeletionEvent {
    /// Create an event.
    pub fn new(source: EventSource, domain: Domain, object_id: impl Into<String>) -> Self {
        Self {
            source,
            domain,
            object_id: object_id.into(),
        }
    }

    /// A [`EventSource::PreDelete`] event.
    pub fn pre_delete(domain: Domain, object_id: impl Into<String>) -> Self {
        Self::new(EventSource::PreDelete, domain, object_id)
    }

    /// The removed object as an item reference.
    pub fn item(&self) -> ItemRef {
        ItemRef::new(self.domain.clone(), self.object_id.clone())
    }
}

/// A deletion handler.
pub type Handler = Arc<dyn Fn(&DeletionEvent) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&DeletionEvent) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Receiver {
    key: String,
    handler: Handler,
}

/// Routing table from `(source, domain)` to keyed handlers.
#[derive(Default)]
pub struct SignalBus {
    receivers: BTreeMap<(EventSource, Domain), Vec<Receiver>>,
}

impl SignalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `handler` under `key` for `(source, domain)`.
    ///
    /// Returns `false` when a handler with the same key was already connected
    /// there; it is replaced.
    pub fn connect(
        &mut self,
        source: EventSource,
        domain: Domain,
        key: impl Into<String>,
        handler: Handler,
    ) -> bool {
        let key = key.into();
        let receivers = self.receivers.entry((source, domain)).or_default();
        if let Some(existing) = receivers.iter_mut().find(|r| r.key == key) {
            existing.handler = handler;
            return false;
        }
        receivers.push(Receiver { key, handler });
        true
    }

    /// Disconnect every handler registered under `key`. Returns how many.
    pub fn disconnect_key(&mut self, key: &str) -> usize {
        let mut removed = 0;
        for receivers in self.receivers.values_mut() {
            let before = receivers.len();
            receivers.retain(|r| r.key != key);
            removed += before - receivers.len();
        }
        self.receivers.retain(|_, receivers| !receivers.is_empty());
        removed
    }

    /// Number of handlers connected for `(source, domain)`.
    pub fn receiver_count(&self, source: &EventSource, domain: &Domain) -> usize {
        self.receivers
            .get(&(source.clone(), domain.clone()))
            .map_or(0, Vec::len)
    }

    /// Call every handler connected for the event's `(source, domain)`.
    ///
    /// All handlers run even if one fails; the first error is returned after.
    /// Returns how many handlers were called.
    pub fn send(&self, event: &DeletionEvent) -> Result<usize> {
        let Some(receivers) = self
            .receivers
            .get(&(event.source.clone(), event.domain.clone()))
        else {
            log::debug!(
                "No receivers for {:?} on '{}'",
                event.source,
                event.domain
            );
            return Ok(0);
        };

        let mut first_error = None;
        for receiver in receivers {
            if let Err(e) = (receiver.handler)(event) {
                log::warn!(
                    "Handler '{}' failed for {} ({:?}): {e}",
                    receiver.key,
                    event.item(),
                    event.source
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(receivers.len()),
        }
    }
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((source, domain), receivers) in &self.receivers {
            let keys: Vec<&str> = receivers.iter().map(|r| r.key.as_str()).collect();
            map.entry(&format!("{source:?}@{domain}"), &keys);
        }
        map.finish()
    }
}
