//! lxosc-core/src/listener.rs
//!
//! Listener callbacks and the registry that holds them.
//!
//! Registration hands back a [`ListenerId`], which is the only way to remove
//! a listener again. Delivery iterates a snapshot of the registry, so a
//! listener may add or remove listeners (itself included) while it runs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::message::OscMessage;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Receives dispatched messages on the dispatching thread.
pub trait OscListener: Send + Sync {
    fn on_message(&self, message: &OscMessage) -> ListenerResult;
}

impl<F> OscListener for F
where
    F: Fn(&OscMessage) -> ListenerResult + Send + Sync,
{
    fn on_message(&self, message: &OscMessage) -> ListenerResult {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<dyn OscListener>)>,
}

/// Shared, cloneable set of listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, listener: impl OscListener + 'static) -> ListenerId {
        self.add_shared(Arc::new(listener))
    }

    /// Closure registration with the argument and return types inferred.
    pub fn add_fn<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OscMessage) -> ListenerResult + Send + Sync + 'static,
    {
        self.add(listener)
    }

    pub fn add_shared(&self, listener: Arc<dyn OscListener>) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.entries.push((id, listener));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn OscListener>> {
        self.lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Deliver `message` to every listener registered right now. Errors and
    /// panics are logged per listener and never stop delivery to the rest.
    /// Returns how many listeners failed.
    pub fn deliver(&self, message: &OscMessage) -> usize {
        let mut failures = 0;
        for listener in self.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_message(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!("OSC listener failed on {}: {e}", message.address());
                }
                Err(payload) => {
                    failures += 1;
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("OSC listener panicked on {}: {reason}", message.address());
                }
            }
        }
        failures
    }
}
