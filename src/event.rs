//! Connection events.
//!
//! Every change of [`HidConnection::is_connected`](crate::HidConnection::is_connected) produces
//! exactly two events, delivered in this order through the configured
//! [`Dispatcher`](crate::dispatch::Dispatcher):
//!
//! 1. [`ConnectionEvent::ConnectionChanged`] carrying the new value
//! 2. [`ConnectionEvent::PropertyChanged`] naming the property (`"is_connected"`)
//!
//! The second form exists for generic observers (data-binding layers) that only want to know
//! *something* changed and re-read the state themselves.

/// Property name carried by [`ConnectionEvent::PropertyChanged`] for the connected flag.
pub const IS_CONNECTED: &str = "is_connected";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connected flag changed; `true` means a device is attached and being read.
    ConnectionChanged(bool),

    /// A named property of the connection changed.
    PropertyChanged { property: &'static str },
}

/// Determines which events a listener wants to receive.
#[derive(Debug, Clone, Copy)]
pub enum EventFilter {
    All,
    ConnectionOnly,
    PropertyOnly,
    Custom(fn(&ConnectionEvent) -> bool),
}

impl EventFilter {
    pub fn accepts(&self, event: &ConnectionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::ConnectionOnly => matches!(event, ConnectionEvent::ConnectionChanged(_)),
            EventFilter::PropertyOnly => matches!(event, ConnectionEvent::PropertyChanged { .. }),
            EventFilter::Custom(f) => f(event),
        }
    }
}
