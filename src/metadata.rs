//! Device metadata snapshot.
//!
//! [`DeviceMeta`] is a lightweight, cloneable description of the attached device suitable
//! for UI display and logging. Backends populate what they know; unknown fields remain `None`.
//!
//! ## Identity notes
//! - `vid`/`pid` and `serial_number` (when present) are stable across reconnects.
//! - `path` is platform-specific and usually changes when the device is replugged into another
//!   port; treat it as diagnostic.
//!
//! # Example
//! ```no_run
//! # use hidclient::{HidConnection, HidClient, DeviceIdentity};
//! # fn show<C: HidClient>(conn: &HidConnection<C>) {
//! if let Some(meta) = conn.device_meta() {
//!     println!("attached: {:?} ({:?})", meta.product_string, meta.path);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};

/// What the backend knew about the device when it was opened.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub product_string: Option<String>,
    pub manufacturer_string: Option<String>,
    pub serial_number: Option<String>,
    /// `-1` on stacks that have no interface concept.
    pub interface_number: Option<i32>,
    pub usage_page: Option<u16>,
    pub usage: Option<u16>,
    /// Platform device path. Opaque.
    pub path: Option<String>,
}
