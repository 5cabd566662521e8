//! Event listener registry.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::types::SourceEvent;

/// A listener callback.
pub type Listener = Arc<dyn Fn(&SourceEvent) + Send + Sync>;

/// Routes dispatched events to listeners by event type.
pub trait EventDispatcher: Send + Sync + 'static {
    /// Register `listener` for `event_type`.
    fn add_listener(&self, event_type: &str, listener: Listener);

    /// Remove a previously registered listener. Returns `true` if it was found.
    fn remove_listener(&self, event_type: &str, listener: &Listener) -> bool;

    /// Invoke every listener registered for `event_type`, in registration order.
    fn dispatch(&self, event_type: &str, event: &SourceEvent);
}

/// Default [`EventDispatcher`].
///
/// Listeners are invoked outside the lock, so they may register or remove
/// listeners themselves.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.read().get(event_type).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_map()
            .entries(listeners.iter().map(|(ty, list)| (ty, list.len())))
            .finish()
    }
}

impl EventDispatcher for ListenerRegistry {
    fn add_listener(&self, event_type: &str, listener: Listener) {
        self.listeners
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }

    fn remove_listener(&self, event_type: &str, listener: &Listener) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(event_type) else {
            return false;
        };
        let Some(index) = list.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            listeners.remove(event_type);
        }
        true
    }

    fn dispatch(&self, event_type: &str, event: &SourceEvent) {
        let listeners = self.listeners.read().get(event_type).cloned();
        for listener in listeners.into_iter().flatten() {
            listener(event);
        }
    }
}
