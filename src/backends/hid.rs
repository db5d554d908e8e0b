//! `hidapi` backend.
//!
//! - [`HidApiInventory`] owns the process' `HidApi` and a watcher thread that re-enumerates on
//!   an interval, firing the changed signal whenever the set of attached devices differs.
//!   hidapi has no hotplug callback, so polling is the portable option.
//! - [`HidApiDevice`] is one enumerated entry. Opening it also reads the report descriptor to
//!   learn the largest input report.
//! - [`HidApiStream`] wraps the open `hidapi::HidDevice`. Reads are issued in bounded slices so
//!   a pending read notices cancellation within one slice.

use super::descriptor;
use super::{DeviceHandle, DeviceInventory, ReportStream};
use crate::config::ClientConfig;
use crate::device::DeviceIdentity;
use crate::error::{HidError, ReadError, Result};
use crate::metadata::DeviceMeta;
use crate::signal::{Callback, Signal, Subscription};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound for a HID report descriptor (USB spec limit).
const MAX_REPORT_DESCRIPTOR_SIZE: usize = 4096;

/// Granularity at which the watcher notices shutdown while sleeping.
const WATCH_TICK: Duration = Duration::from_millis(50);

type Fingerprint = (u16, u16, String);

fn fingerprint(info: &DeviceInfo) -> Fingerprint {
    (
        info.vendor_id(),
        info.product_id(),
        info.path().to_string_lossy().into_owned(),
    )
}

fn snapshot(api: &HidApi) -> BTreeSet<Fingerprint> {
    api.device_list().map(fingerprint).collect()
}

struct InventoryShared {
    api: Arc<Mutex<HidApi>>,
    changed: Signal,
    read_slice_ms: i32,
}

/// Device inventory backed by `hidapi` enumeration.
pub struct HidApiInventory {
    shared: Arc<InventoryShared>,
    stop: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl HidApiInventory {
    /// Initializes hidapi and starts the watcher thread.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let api = HidApi::new()?;
        let shared = Arc::new(InventoryShared {
            api: Arc::new(Mutex::new(api)),
            changed: Signal::new(),
            read_slice_ms: config.read_slice_ms,
        });
        let stop = CancellationToken::new();
        let interval = config.inventory_poll_interval();

        let weak = Arc::downgrade(&shared);
        let token = stop.clone();
        let watcher = std::thread::Builder::new()
            .name("hid-inventory".to_string())
            .spawn(move || watch(weak, token, interval))
            .map_err(HidError::Spawn)?;

        Ok(Self {
            shared,
            stop,
            watcher: Some(watcher),
        })
    }

    /// Devices currently known to hidapi, as metadata.
    pub fn devices(&self) -> Vec<DeviceMeta> {
        self.shared.api.lock().device_list().map(meta_of).collect()
    }
}

impl Drop for HidApiInventory {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(watcher) = self.watcher.take() {
            // The last owner may be a callback running on the watcher itself.
            if watcher.thread().id() != std::thread::current().id() {
                let _ = watcher.join();
            }
        }
    }
}

fn watch(shared: Weak<InventoryShared>, stop: CancellationToken, interval: Duration) {
    let mut known = match shared.upgrade() {
        Some(s) => snapshot(&s.api.lock()),
        None => return,
    };
    tracing::trace!(devices = known.len(), "hid inventory watcher started");

    loop {
        let mut slept = Duration::ZERO;
        while slept < interval {
            if stop.is_cancelled() {
                tracing::trace!("hid inventory watcher exiting");
                return;
            }
            let tick = WATCH_TICK.min(interval - slept);
            std::thread::sleep(tick);
            slept += tick;
        }

        let Some(shared) = shared.upgrade() else { return };
        let current = {
            let mut api = shared.api.lock();
            if let Err(e) = api.refresh_devices() {
                tracing::debug!(error = %e, "hid refresh failed");
                continue;
            }
            snapshot(&api)
        };
        if current != known {
            tracing::debug!(
                before = known.len(),
                after = current.len(),
                "hid device list changed"
            );
            known = current;
            shared.changed.emit();
        }
    }
}

impl DeviceInventory for HidApiInventory {
    fn find_device(&self, identity: DeviceIdentity) -> Option<Box<dyn DeviceHandle>> {
        let info = self
            .shared
            .api
            .lock()
            .device_list()
            .find(|d| d.vendor_id() == identity.vendor_id && d.product_id() == identity.product_id)
            .cloned()?;
        Some(Box::new(HidApiDevice {
            info,
            api: self.shared.api.clone(),
            report_len: AtomicUsize::new(0),
            read_slice_ms: self.shared.read_slice_ms,
        }))
    }

    fn subscribe_changed(&self, callback: Callback) -> Subscription {
        self.shared.changed.subscribe(callback)
    }
}

fn meta_of(info: &DeviceInfo) -> DeviceMeta {
    DeviceMeta {
        vid: Some(info.vendor_id()),
        pid: Some(info.product_id()),
        product_string: info.product_string().map(str::to_string),
        manufacturer_string: info.manufacturer_string().map(str::to_string),
        serial_number: info.serial_number().map(str::to_string),
        interface_number: Some(info.interface_number()),
        usage_page: Some(info.usage_page()),
        usage: Some(info.usage()),
        path: Some(info.path().to_string_lossy().into_owned()),
    }
}

/// One enumerated hidapi device.
pub struct HidApiDevice {
    info: DeviceInfo,
    api: Arc<Mutex<HidApi>>,
    report_len: AtomicUsize,
    read_slice_ms: i32,
}

impl DeviceHandle for HidApiDevice {
    fn open(&self) -> Result<Box<dyn ReportStream>> {
        let device = self.info.open_device(&self.api.lock())?;

        let mut desc = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        let len = match device.get_report_descriptor(&mut desc) {
            Ok(n) => descriptor::max_input_report_len(&desc[..n]),
            Err(e) => {
                tracing::debug!(error = %e, "report descriptor unavailable");
                0
            }
        };
        self.report_len.store(len, Ordering::SeqCst);

        Ok(Box::new(HidApiStream {
            device: SharedHandle::new(device),
            closed_signal: Signal::new(),
            read_slice_ms: self.read_slice_ms,
        }))
    }

    fn max_input_report_len(&self) -> usize {
        self.report_len.load(Ordering::SeqCst)
    }

    fn meta(&self) -> DeviceMeta {
        meta_of(&self.info)
    }
}

/// A device handle that can be closed while another thread is using it.
///
/// `close` never waits: it marks the handle closed and releases the value if it is free;
/// otherwise whichever call holds it releases it on the next lock. Each use hands the lock
/// over fairly, so a waiting caller gets in after at most one use.
struct SharedHandle<T> {
    slot: Mutex<Option<T>>,
    closed: AtomicBool,
}

impl<T> SharedHandle<T> {
    fn new(value: T) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
            closed: AtomicBool::new(false),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let mut guard = self.slot.lock();
        if self.closed.load(Ordering::SeqCst) {
            guard.take();
        }
        let out = guard.as_ref().map(f).ok_or(HidError::Closed);
        MutexGuard::unlock_fair(guard);
        out
    }

    /// Returns `true` the first time only.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(mut guard) = self.slot.try_lock() {
            guard.take();
        }
        true
    }
}

/// Open hidapi handle.
pub struct HidApiStream {
    device: SharedHandle<HidDevice>,
    closed_signal: Signal,
    read_slice_ms: i32,
}

impl ReportStream for HidApiStream {
    fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize, ReadError> {
        if cancel.is_cancelled() {
            return Err(ReadError::Cancelled);
        }
        self.device
            .with(|device| device.read_timeout(buf, self.read_slice_ms))
            .map_err(ReadError::Io)?
            .map_err(|e| ReadError::Io(e.into()))
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        Ok(self.device.with(|device| device.write(data))??)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        Ok(self.device.with(|device| device.send_feature_report(data))??)
    }

    fn on_closed(&self, callback: Callback) -> Subscription {
        self.closed_signal.subscribe(callback)
    }

    fn close(&self) {
        if self.device.close() {
            self.closed_signal.emit();
        }
    }
}
