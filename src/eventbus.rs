use crate::event::{ConnectionEvent, EventFilter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for reacting to connection events.
pub trait ConnectionListener: Send {
    fn on_event(&mut self, event: &ConnectionEvent);
}

impl<F> ConnectionListener for F
where
    F: FnMut(&ConnectionEvent) + Send,
{
    fn on_event(&mut self, event: &ConnectionEvent) {
        self(event)
    }
}

/// Handle returned by [`ConnectionEventBus::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type SharedListener = Arc<Mutex<Box<dyn ConnectionListener>>>;

/// Metadata-wrapped listener with filter and control flag.
struct ListenerEntry {
    listener: SharedListener,
    enabled: bool,
    filter: EventFilter,
}

/// Registry of connection listeners.
///
/// Listeners are invoked outside the registry lock, so a listener may add or remove
/// listeners (including itself) while handling an event.
#[derive(Default)]
pub struct ConnectionEventBus {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<u64, ListenerEntry>,
}

impl ConnectionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener with a filter.
    pub fn add_listener(
        &self,
        listener: impl ConnectionListener + 'static,
        filter: EventFilter,
    ) -> ListenerId {
        let mut reg = self.inner.lock();
        let id = reg.next_id;
        reg.listeners.insert(
            id,
            ListenerEntry {
                listener: Arc::new(Mutex::new(Box::new(listener))),
                enabled: true,
                filter,
            },
        );
        reg.next_id += 1;
        ListenerId(id)
    }

    /// Enables a previously registered listener.
    pub fn enable(&self, id: ListenerId) {
        if let Some(entry) = self.inner.lock().listeners.get_mut(&id.0) {
            entry.enabled = true;
        }
    }

    /// Disables (mutes) a listener without removing it.
    pub fn disable(&self, id: ListenerId) {
        if let Some(entry) = self.inner.lock().listeners.get_mut(&id.0) {
            entry.enabled = false;
        }
    }

    /// Unregisters a listener entirely. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.lock().listeners.remove(&id.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emits one event to all enabled, matching listeners in registration order.
    pub fn emit(&self, event: &ConnectionEvent) {
        let targets: Vec<SharedListener> = {
            let reg = self.inner.lock();
            let mut matching: Vec<(&u64, &ListenerEntry)> = reg
                .listeners
                .iter()
                .filter(|(_, entry)| entry.enabled && entry.filter.accepts(event))
                .collect();
            matching.sort_by_key(|(id, _)| **id);
            matching
                .into_iter()
                .map(|(_, entry)| entry.listener.clone())
                .collect()
        };

        for listener in targets {
            listener.lock().on_event(event);
        }
    }

    /// Emits a batch of events, in order.
    pub fn emit_all(&self, events: &[ConnectionEvent]) {
        for event in events {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IS_CONNECTED;

    fn recorder() -> (Arc<Mutex<Vec<ConnectionEvent>>>, impl ConnectionListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |e: &ConnectionEvent| sink.lock().push(e.clone()))
    }

    #[test]
    fn disabled_listeners_are_skipped_until_reenabled() {
        let bus = ConnectionEventBus::new();
        let (seen, listener) = recorder();
        let id = bus.add_listener(listener, EventFilter::All);

        bus.disable(id);
        bus.emit(&ConnectionEvent::ConnectionChanged(true));
        assert!(seen.lock().is_empty());

        bus.enable(id);
        bus.emit(&ConnectionEvent::ConnectionChanged(false));
        assert_eq!(*seen.lock(), vec![ConnectionEvent::ConnectionChanged(false)]);
    }

    #[test]
    fn removed_listener_receives_nothing() {
        let bus = ConnectionEventBus::new();
        let (seen, listener) = recorder();
        let id = bus.add_listener(listener, EventFilter::All);

        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.emit(&ConnectionEvent::ConnectionChanged(true));
        assert!(seen.lock().is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn filter_applies_per_listener() {
        let bus = ConnectionEventBus::new();
        let (conn, conn_listener) = recorder();
        let (prop, prop_listener) = recorder();
        bus.add_listener(conn_listener, EventFilter::ConnectionOnly);
        bus.add_listener(prop_listener, EventFilter::PropertyOnly);

        bus.emit_all(&[
            ConnectionEvent::ConnectionChanged(true),
            ConnectionEvent::PropertyChanged {
                property: IS_CONNECTED,
            },
        ]);

        assert_eq!(*conn.lock(), vec![ConnectionEvent::ConnectionChanged(true)]);
        assert_eq!(
            *prop.lock(),
            vec![ConnectionEvent::PropertyChanged {
                property: IS_CONNECTED
            }]
        );
    }

    #[test]
    fn listener_may_unsubscribe_itself_while_handling() {
        let bus = Arc::new(ConnectionEventBus::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0u32));

        let (bus2, slot2, calls2) = (bus.clone(), slot.clone(), calls.clone());
        let id = bus.add_listener(
            move |_: &ConnectionEvent| {
                *calls2.lock() += 1;
                if let Some(id) = *slot2.lock() {
                    bus2.remove_listener(id);
                }
            },
            EventFilter::All,
        );
        *slot.lock() = Some(id);

        bus.emit(&ConnectionEvent::ConnectionChanged(true));
        bus.emit(&ConnectionEvent::ConnectionChanged(false));
        assert_eq!(*calls.lock(), 1);
    }
}
