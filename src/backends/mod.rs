//! Transport backends for `hidclient`.
//!
//! The connection manager never touches a platform API directly. It talks to three traits:
//!
//! - [`DeviceInventory`]: the live set of attached devices, plus a "changed" notification
//! - [`DeviceHandle`]: one enumerated device that can be opened
//! - [`ReportStream`]: an open byte stream to that device
//!
//! # Feature flags
//! - **`hid`**: enables the [`hid`] backend built on `hidapi` (default).
//!
//! The [`virtual_input`] backend is always available and is what the test-suite runs against.

use crate::device::DeviceIdentity;
use crate::error::{ReadError, Result};
use crate::metadata::DeviceMeta;
use crate::signal::{Callback, Subscription};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

#[cfg(feature = "hid")]
pub mod descriptor;

pub mod virtual_input;

/// Live collection of attached devices. Owned by the platform, only observed by the manager.
pub trait DeviceInventory: Send + Sync {
    /// First attached device matching `identity`, if any.
    fn find_device(&self, identity: DeviceIdentity) -> Option<Box<dyn DeviceHandle>>;

    /// Subscribes to "the set of attached devices may have changed".
    ///
    /// The callback may run on any thread, including concurrently with other calls.
    fn subscribe_changed(&self, callback: Callback) -> Subscription;
}

/// One enumerated device.
pub trait DeviceHandle: Send {
    fn open(&self) -> Result<Box<dyn ReportStream>>;

    /// Largest input report in bytes, or `0` when the device doesn't say.
    ///
    /// Only meaningful after a successful [`open`](Self::open).
    fn max_input_report_len(&self) -> usize;

    fn meta(&self) -> DeviceMeta {
        DeviceMeta::default()
    }
}

/// An open byte stream to one device.
pub trait ReportStream: Send + Sync {
    /// Blocks until a report arrives, the stream fails or `cancel` fires.
    ///
    /// `Ok(0)` is allowed and means "nothing this time"; callers loop.
    fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize, ReadError>;

    fn write(&self, data: &[u8]) -> Result<usize>;

    fn send_feature_report(&self, _data: &[u8]) -> Result<()> {
        Err(crate::error::HidError::Unsupported("feature reports"))
    }

    /// Subscribes to "this stream was closed", whoever closed it.
    fn on_closed(&self, callback: Callback) -> Subscription;

    /// Releases the underlying handle. Further reads fail.
    fn close(&self);
}
