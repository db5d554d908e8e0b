//! Observable connected flag.

use crate::dispatch::{Dispatcher, InlineDispatcher};
use crate::event::{ConnectionEvent, IS_CONNECTED};
use crate::eventbus::ConnectionEventBus;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Transitions recorded but not yet posted.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<bool>,
    draining: bool,
    sealed: bool,
}

/// Connected flag plus the machinery to announce its changes.
///
/// Recording and posting are separate steps. The attachment controller records a transition
/// while it still holds its lock, so the flag never disagrees with the attachment and the
/// outbox order is the transition order. It flushes once the lock is released, so listeners
/// can call back into the connection. Only one thread drains at a time; a transition recorded
/// while another thread is draining is posted by that thread, after the ones before it.
pub struct ConnectionState {
    connected: AtomicBool,
    outbox: Mutex<Outbox>,
    dispatcher: RwLock<Arc<dyn Dispatcher>>,
    bus: Arc<ConnectionEventBus>,
}

impl ConnectionState {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            outbox: Mutex::new(Outbox::default()),
            dispatcher: RwLock::new(dispatcher),
            bus: Arc::new(ConnectionEventBus::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stores `value` and, if it changed, queues its announcement. Returns whether it changed.
    pub(crate) fn transition(&self, value: bool) -> bool {
        let mut outbox = self.outbox.lock();
        let changed = self.connected.swap(value, Ordering::SeqCst) != value;
        if changed && !outbox.sealed {
            outbox.pending.push_back(value);
        }
        changed
    }

    /// Stores `false`, drops queued announcements and refuses further ones.
    pub(crate) fn seal(&self) {
        let mut outbox = self.outbox.lock();
        outbox.sealed = true;
        outbox.pending.clear();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Posts queued transitions in order, unless another thread already is.
    pub(crate) fn flush(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        loop {
            let value = {
                let mut outbox = self.outbox.lock();
                match outbox.pending.pop_front() {
                    Some(value) => value,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            self.post(value);
        }
    }

    /// One job per transition, carrying both events.
    fn post(&self, value: bool) {
        let bus = self.bus.clone();
        let dispatcher = self.dispatcher.read().clone();
        dispatcher.post(Box::new(move || {
            bus.emit_all(&[
                ConnectionEvent::ConnectionChanged(value),
                ConnectionEvent::PropertyChanged {
                    property: IS_CONNECTED,
                },
            ]);
        }));
    }

    /// Stores and, if the value changed, publishes.
    pub fn set(&self, value: bool) {
        if self.transition(value) {
            self.flush();
        }
    }

    pub fn bus(&self) -> &ConnectionEventBus {
        &self.bus
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.read().clone()
    }

    pub fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        *self.dispatcher.write() = dispatcher;
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(Arc::new(InlineDispatcher))
    }
}
