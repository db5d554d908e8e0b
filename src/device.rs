//! Device identity and the consumer-facing client trait.

use serde::{Deserialize, Serialize};
use std::fmt;

/// USB vendor/product pair the connection looks for.
///
/// Fixed for the lifetime of a [`HidConnection`](crate::HidConnection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Implemented by the concrete client for one kind of device.
///
/// Both callbacks run on the connection's own threads: `on_connect` on whichever thread
/// completed the attach (constructor, inventory watcher or a reader recovering from a
/// failure), `on_report` on the epoch's reader thread. Neither goes through the dispatcher.
pub trait HidClient: Send + Sync + 'static {
    /// Which device to attach to. Read once, at construction.
    fn identity(&self) -> DeviceIdentity;

    /// Called after each transition into the connected state, before the new epoch's reader
    /// delivers its first report.
    fn on_connect(&self) {}

    /// One input report, exactly as many bytes as the read returned.
    fn on_report(&self, report: Vec<u8>);
}
