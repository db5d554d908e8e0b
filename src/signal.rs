//! Payload-less notifications from transport collaborators.
//!
//! Inventories use a [`Signal`] for "the device list changed", streams use one for "this stream
//! was closed". Subscribers get a [`Subscription`] guard; dropping it unsubscribes.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

pub type Callback = Box<dyn Fn() + Send + Sync>;

type Slots = Mutex<BTreeMap<u64, Arc<dyn Fn() + Send + Sync>>>;

#[derive(Default)]
struct Shared {
    next_id: Mutex<u64>,
    slots: Slots,
}

/// Multi-subscriber notification.
#[derive(Default, Clone)]
pub struct Signal {
    shared: Arc<Shared>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: Callback) -> Subscription {
        let id = {
            let mut next = self.shared.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        self.shared.slots.lock().insert(id, Arc::from(callback));
        Subscription {
            signal: Arc::downgrade(&self.shared),
            id: Some(id),
        }
    }

    /// Invokes every current subscriber on the calling thread.
    ///
    /// Callbacks run after the subscriber table is unlocked, so a callback may subscribe or
    /// unsubscribe. A callback unsubscribed concurrently with `emit` may still run once.
    pub fn emit(&self) {
        let callbacks: Vec<_> = self.shared.slots.lock().values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.slots.lock().len()
    }
}

/// Live subscription to a [`Signal`]. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    signal: Weak<Shared>,
    id: Option<u64>,
}

impl Subscription {
    /// A subscription to nothing, for transports without the corresponding notification.
    pub fn detached() -> Self {
        Self {
            signal: Weak::new(),
            id: None,
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(shared)) = (self.id.take(), self.signal.upgrade()) {
            shared.slots.lock().remove(&id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
