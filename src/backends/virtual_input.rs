//! In-memory transport.
//!
//! [`VirtualInventory`] and [`VirtualDevice`] implement the backend traits without touching any
//! hardware. A device carries a script of read outcomes that is shared by every stream opened
//! on it, so a script survives reattachment: queue a failure followed by a report and the
//! report is delivered by the *next* epoch.
//!
//! ```
//! use hidclient::backends::virtual_input::{VirtualDevice, VirtualInventory};
//! use hidclient::DeviceIdentity;
//!
//! let inventory = VirtualInventory::new();
//! let pad = VirtualDevice::new(DeviceIdentity::new(0x077d, 0x0410), 4);
//! pad.push_report([0, 1, 2, 3]);
//! inventory.attach(pad.clone());
//! assert_eq!(inventory.len(), 1);
//! ```

use super::{DeviceHandle, DeviceInventory, ReportStream};
use crate::device::DeviceIdentity;
use crate::error::{HidError, ReadError, Result};
use crate::metadata::DeviceMeta;
use crate::signal::{Callback, Signal, Subscription};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often a pending read re-checks its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// One scripted outcome of [`ReportStream::read`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadStep {
    /// Deliver these bytes (truncated to the caller's buffer).
    Report(Vec<u8>),
    /// Return `Ok(0)`.
    Empty,
    /// Fail with an I/O error, as an unplugged device would.
    Fail,
}

struct DeviceShared {
    identity: DeviceIdentity,
    max_input_report_len: usize,
    meta: DeviceMeta,
    script: Mutex<VecDeque<ReadStep>>,
    script_ready: Condvar,
    fail_open: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    streams: Mutex<Vec<Weak<StreamShared>>>,
    written: Mutex<Vec<Vec<u8>>>,
    features: Mutex<Vec<Vec<u8>>>,
}

/// Scriptable fake device. Clones share state.
#[derive(Clone)]
pub struct VirtualDevice {
    shared: Arc<DeviceShared>,
}

impl VirtualDevice {
    pub fn new(identity: DeviceIdentity, max_input_report_len: usize) -> Self {
        let meta = DeviceMeta {
            vid: Some(identity.vendor_id),
            pid: Some(identity.product_id),
            product_string: Some("Virtual HID".to_string()),
            path: Some(format!("virtual:{identity}")),
            ..DeviceMeta::default()
        };
        Self {
            shared: Arc::new(DeviceShared {
                identity,
                max_input_report_len,
                meta,
                script: Mutex::new(VecDeque::new()),
                script_ready: Condvar::new(),
                fail_open: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
                max_live: AtomicUsize::new(0),
                streams: Mutex::new(Vec::new()),
                written: Mutex::new(Vec::new()),
                features: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.shared.identity
    }

    pub fn push_step(&self, step: ReadStep) {
        self.shared.script.lock().push_back(step);
        self.shared.script_ready.notify_all();
    }

    pub fn push_report(&self, bytes: impl Into<Vec<u8>>) {
        self.push_step(ReadStep::Report(bytes.into()));
    }

    pub fn push_failure(&self) {
        self.push_step(ReadStep::Fail);
    }

    /// Makes subsequent `open` calls fail (or succeed again).
    pub fn set_fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Streams opened so far.
    pub fn open_count(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Streams closed so far.
    pub fn close_count(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Streams currently open.
    pub fn live_streams(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open streams ever observed.
    pub fn max_live_streams(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    /// Reports written through any stream, oldest first.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.shared.written.lock().clone()
    }

    pub fn feature_reports(&self) -> Vec<Vec<u8>> {
        self.shared.features.lock().clone()
    }

    /// Closes every open stream, as the OS does when the device goes away.
    fn close_streams(&self) {
        let streams: Vec<_> = self
            .shared
            .streams
            .lock()
            .drain(..)
            .filter_map(|s| s.upgrade())
            .collect();
        for stream in streams {
            stream.close(&self.shared);
        }
    }
}

impl DeviceHandle for VirtualDevice {
    fn open(&self) -> Result<Box<dyn ReportStream>> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(HidError::Open(format!("{} refused to open", self.shared.identity)));
        }
        let stream = Arc::new(StreamShared {
            closed: AtomicBool::new(false),
            closed_signal: Signal::new(),
        });
        self.shared.streams.lock().push(Arc::downgrade(&stream));
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(VirtualStream {
            device: self.shared.clone(),
            stream,
        }))
    }

    fn max_input_report_len(&self) -> usize {
        self.shared.max_input_report_len
    }

    fn meta(&self) -> DeviceMeta {
        self.shared.meta.clone()
    }
}

struct StreamShared {
    closed: AtomicBool,
    closed_signal: Signal,
}

impl StreamShared {
    fn close(&self, device: &DeviceShared) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        device.live.fetch_sub(1, Ordering::SeqCst);
        device.closed.fetch_add(1, Ordering::SeqCst);
        device.script_ready.notify_all();
        self.closed_signal.emit();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct VirtualStream {
    device: Arc<DeviceShared>,
    stream: Arc<StreamShared>,
}

impl ReportStream for VirtualStream {
    fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize, ReadError> {
        let mut script = self.device.script.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            if self.stream.is_closed() {
                return Err(ReadError::Io(HidError::Closed));
            }
            match script.pop_front() {
                Some(ReadStep::Report(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    return Ok(n);
                }
                Some(ReadStep::Empty) => return Ok(0),
                Some(ReadStep::Fail) => {
                    return Err(ReadError::Io(HidError::Io(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "virtual device disconnected",
                    ))))
                }
                None => {
                    self.device.script_ready.wait_for(&mut script, CANCEL_POLL);
                }
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        if self.stream.is_closed() {
            return Err(HidError::Closed);
        }
        self.device.written.lock().push(data.to_vec());
        Ok(data.len())
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<()> {
        if self.stream.is_closed() {
            return Err(HidError::Closed);
        }
        self.device.features.lock().push(data.to_vec());
        Ok(())
    }

    fn on_closed(&self, callback: Callback) -> Subscription {
        self.stream.closed_signal.subscribe(callback)
    }

    fn close(&self) {
        self.stream.close(&self.device);
    }
}

/// Fake device list with simulated plug/unplug.
#[derive(Clone, Default)]
pub struct VirtualInventory {
    devices: Arc<Mutex<Vec<VirtualDevice>>>,
    changed: Signal,
    lookups: Arc<AtomicUsize>,
}

impl VirtualInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs `device` in and announces the change.
    pub fn attach(&self, device: VirtualDevice) {
        self.devices.lock().push(device);
        self.changed.emit();
    }

    /// Adds `device` without announcing it.
    pub fn insert(&self, device: VirtualDevice) {
        self.devices.lock().push(device);
    }

    /// Unplugs every device matching `identity`: removes it from the list, closes its open
    /// streams, then announces the change.
    pub fn detach(&self, identity: DeviceIdentity) {
        let removed: Vec<VirtualDevice> = {
            let mut devices = self.devices.lock();
            let (gone, kept) = devices.drain(..).partition(|d| d.identity() == identity);
            *devices = kept;
            gone
        };
        for device in &removed {
            device.close_streams();
        }
        self.changed.emit();
    }

    /// Announces a change without altering the list.
    pub fn notify_changed(&self) {
        self.changed.emit();
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times `find_device` has been called.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.changed.subscriber_count()
    }
}

impl DeviceInventory for VirtualInventory {
    fn find_device(&self, identity: DeviceIdentity) -> Option<Box<dyn DeviceHandle>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.devices
            .lock()
            .iter()
            .find(|d| d.identity() == identity)
            .map(|d| Box::new(d.clone()) as Box<dyn DeviceHandle>)
    }

    fn subscribe_changed(&self, callback: Callback) -> Subscription {
        self.changed.subscribe(callback)
    }
}
