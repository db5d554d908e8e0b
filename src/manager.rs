//! Connection lifecycle manager.
//!
//! [`HidConnection`] keeps at most one stream open to the device named by its
//! [`HidClient`], reads it on a dedicated thread and reattaches on its own whenever the device
//! list changes or the stream fails. The consumer never sees a transport error on the read
//! path: failure shows up as `is_connected()` going `false`, followed by an immediate attempt
//! to attach again.
//!
//! # Example
//! ```
//! use hidclient::backends::virtual_input::{VirtualDevice, VirtualInventory};
//! use hidclient::{DeviceIdentity, HidClient, HidConnection};
//!
//! struct Pad;
//! impl HidClient for Pad {
//!     fn identity(&self) -> DeviceIdentity {
//!         DeviceIdentity::new(0x077d, 0x0410)
//!     }
//!     fn on_report(&self, report: Vec<u8>) {
//!         println!("{report:02x?}");
//!     }
//! }
//!
//! let inventory = VirtualInventory::new();
//! inventory.attach(VirtualDevice::new(Pad.identity(), 4));
//!
//! let conn = HidConnection::new(Pad, inventory);
//! assert!(conn.is_connected());
//! ```

use crate::backends::{DeviceInventory, ReportStream};
use crate::config::{ClientConfig, DEFAULT_FALLBACK_REPORT_LEN};
use crate::device::{DeviceIdentity, HidClient};
use crate::dispatch::{Dispatcher, InlineDispatcher};
use crate::error::{HidError, Result};
use crate::event::EventFilter;
use crate::eventbus::{ConnectionListener, ListenerId};
use crate::metadata::DeviceMeta;
use crate::reader::{ReadLoop, ReadSink};
use crate::signal::Subscription;
use crate::state::ConnectionState;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One attachment epoch: everything created by a successful open, released together.
struct Attachment {
    epoch: u64,
    stream: Arc<dyn ReportStream>,
    cancel: CancellationToken,
    max_report_len: usize,
    meta: DeviceMeta,
    closed_sub: Subscription,
    /// Releases a reader still waiting for its start signal.
    gate: Sender<()>,
    reader: JoinHandle<()>,
}

impl Attachment {
    /// Stops the reader, forgets the closed notification and closes the stream.
    ///
    /// Returns the reader so disposal can wait for it.
    fn release(self) -> JoinHandle<()> {
        self.cancel.cancel();
        let _ = self.gate.try_send(());
        drop(self.closed_sub);
        self.stream.close();
        self.reader
    }
}

#[derive(Default)]
struct Slot {
    attachment: Option<Attachment>,
    next_epoch: u64,
    disposed: bool,
}

struct Shared<C: HidClient> {
    me: Weak<Shared<C>>,
    client: C,
    identity: DeviceIdentity,
    inventory: Arc<dyn DeviceInventory>,
    state: ConnectionState,
    fallback_report_len: usize,
    slot: Mutex<Slot>,
    inventory_sub: Mutex<Option<Subscription>>,
}

impl<C: HidClient> Shared<C> {
    /// Opens the device if nothing is attached and the device is present.
    fn try_attach(&self) {
        let Some(this) = self.me.upgrade() else { return };

        let (go, started) = crossbeam_channel::bounded(1);
        let epoch = {
            let mut slot = self.slot.lock();
            if slot.disposed || slot.attachment.is_some() {
                return;
            }
            let Some(device) = self.inventory.find_device(self.identity) else {
                tracing::trace!(device = %self.identity, "device not present");
                return;
            };
            let stream: Arc<dyn ReportStream> = match device.open() {
                Ok(stream) => Arc::from(stream),
                Err(e) => {
                    tracing::debug!(device = %self.identity, error = %e, "open failed");
                    return;
                }
            };
            let max_report_len = device.max_input_report_len();
            let epoch = slot.next_epoch;
            let cancel = CancellationToken::new();

            let weak = self.me.clone();
            let closed_sub = stream.on_closed(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.detach_and_retry(Some(epoch));
                }
            }));

            let buffer_len = if max_report_len > 0 {
                max_report_len
            } else {
                self.fallback_report_len
            };
            let reader = ReadLoop {
                sink: this,
                stream: stream.clone(),
                cancel: cancel.clone(),
                buffer_len,
                identity: self.identity,
                epoch,
                start: started,
            }
            .spawn();
            let reader = match reader {
                Ok(reader) => reader,
                Err(e) => {
                    tracing::warn!(device = %self.identity, error = %e, "could not start reader");
                    drop(closed_sub);
                    stream.close();
                    return;
                }
            };

            slot.next_epoch += 1;
            slot.attachment = Some(Attachment {
                epoch,
                stream,
                cancel,
                max_report_len,
                meta: device.meta(),
                closed_sub,
                gate: go.clone(),
                reader,
            });
            self.state.transition(true).then_some(epoch)
        };

        if let Some(epoch) = epoch {
            tracing::info!(device = %self.identity, epoch, "connected");
            self.state.flush();
            if self.is_current(epoch) {
                self.client.on_connect();
            }
        }
        let _ = go.try_send(());
    }

    /// Whether `epoch` is still attached and the connection is open.
    fn is_current(&self, epoch: u64) -> bool {
        let slot = self.slot.lock();
        !slot.disposed && slot.attachment.as_ref().is_some_and(|a| a.epoch == epoch)
    }

    /// Tears down the current epoch (only `epoch`, if given) and tries to attach again.
    fn detach_and_retry(&self, epoch: Option<u64>) {
        let detached = {
            let mut slot = self.slot.lock();
            let current = slot
                .attachment
                .as_ref()
                .is_some_and(|a| epoch.map_or(true, |e| e == a.epoch));
            if current {
                slot.attachment.take().and_then(|attachment| {
                    let epoch = attachment.epoch;
                    // The reader may be the caller; it exits on its own once cancelled.
                    drop(attachment.release());
                    self.state.transition(false).then_some(epoch)
                })
            } else {
                None
            }
        };

        if let Some(epoch) = detached {
            tracing::info!(device = %self.identity, epoch, "disconnected");
            self.state.flush();
        }
        self.try_attach();
    }

    /// Silent, one-shot shutdown.
    fn dispose(&self) {
        let attachment = {
            let mut slot = self.slot.lock();
            if slot.disposed {
                return;
            }
            slot.disposed = true;
            self.state.seal();
            slot.attachment.take().map(|a| (a.epoch, a.release()))
        };

        if let Some((epoch, reader)) = attachment {
            tracing::info!(device = %self.identity, epoch, "closed");
            if reader.thread().id() != std::thread::current().id() {
                let _ = reader.join();
            }
        }
        self.inventory_sub.lock().take();
    }
}

impl<C: HidClient> ReadSink for Shared<C> {
    fn report(&self, bytes: Vec<u8>) {
        self.client.on_report(bytes);
    }

    fn failed(&self, epoch: u64) {
        self.detach_and_retry(Some(epoch));
    }
}

/// Self-healing connection to one HID device.
///
/// Dropping the connection closes it; see [`close`](Self::close).
pub struct HidConnection<C: HidClient> {
    shared: Arc<Shared<C>>,
}

impl<C: HidClient> HidConnection<C> {
    /// Connects using `inventory` and the inline dispatcher.
    ///
    /// If the device is present, `is_connected()` is already `true` when this returns.
    pub fn new(client: C, inventory: impl DeviceInventory + 'static) -> Self {
        Self::start(
            client,
            Arc::new(inventory),
            Arc::new(InlineDispatcher),
            DEFAULT_FALLBACK_REPORT_LEN,
        )
    }

    pub fn builder(client: C) -> HidConnectionBuilder<C> {
        HidConnectionBuilder {
            client,
            inventory: None,
            dispatcher: None,
            config: None,
        }
    }

    fn start(
        client: C,
        inventory: Arc<dyn DeviceInventory>,
        dispatcher: Arc<dyn Dispatcher>,
        fallback_report_len: usize,
    ) -> Self {
        let identity = client.identity();
        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            client,
            identity,
            inventory,
            state: ConnectionState::new(dispatcher),
            fallback_report_len: fallback_report_len.max(1),
            slot: Mutex::new(Slot::default()),
            inventory_sub: Mutex::new(None),
        });

        let weak = Arc::downgrade(&shared);
        let sub = shared.inventory.subscribe_changed(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.try_attach();
            }
        }));
        *shared.inventory_sub.lock() = Some(sub);

        tracing::debug!(device = %identity, "watching for device");
        shared.try_attach();
        Self { shared }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.shared.identity
    }

    pub fn client(&self) -> &C {
        &self.shared.client
    }

    /// Registers a listener for connection events.
    pub fn subscribe(
        &self,
        listener: impl ConnectionListener + 'static,
        filter: EventFilter,
    ) -> ListenerId {
        self.shared.state.bus().add_listener(listener, filter)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.state.bus().remove_listener(id)
    }

    pub fn enable_listener(&self, id: ListenerId) {
        self.shared.state.bus().enable(id);
    }

    pub fn disable_listener(&self, id: ListenerId) {
        self.shared.state.bus().disable(id);
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.shared.state.dispatcher()
    }

    /// Replaces the dispatcher used for subsequent events.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) {
        self.shared.state.set_dispatcher(dispatcher);
    }

    /// Metadata of the attached device.
    pub fn device_meta(&self) -> Option<DeviceMeta> {
        self.shared
            .slot
            .lock()
            .attachment
            .as_ref()
            .map(|a| a.meta.clone())
    }

    /// Max input report length the attached device reported (`0` if it didn't).
    pub fn max_report_len(&self) -> Option<usize> {
        self.shared
            .slot
            .lock()
            .attachment
            .as_ref()
            .map(|a| a.max_report_len)
    }

    fn stream(&self) -> Result<Arc<dyn ReportStream>> {
        self.shared
            .slot
            .lock()
            .attachment
            .as_ref()
            .map(|a| a.stream.clone())
            .ok_or(HidError::NotConnected)
    }

    /// Writes one output report to the attached device.
    pub fn write(&self, report: &[u8]) -> Result<usize> {
        self.stream()?.write(report)
    }

    pub fn send_feature_report(&self, report: &[u8]) -> Result<()> {
        self.stream()?.send_feature_report(report)
    }

    /// Disconnects and stops reacting to the device list.
    ///
    /// Idempotent. No connection event is published for the disconnect this causes. Waits for
    /// the reader thread to finish unless called from it.
    pub fn close(&self) {
        self.shared.dispose();
    }
}

impl<C: HidClient> Drop for HidConnection<C> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

/// Configures a [`HidConnection`] before it starts.
pub struct HidConnectionBuilder<C: HidClient> {
    client: C,
    inventory: Option<Arc<dyn DeviceInventory>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    config: Option<ClientConfig>,
}

impl<C: HidClient> HidConnectionBuilder<C> {
    pub fn inventory(mut self, inventory: impl DeviceInventory + 'static) -> Self {
        self.inventory = Some(Arc::new(inventory));
        self
    }

    pub fn shared_inventory(mut self, inventory: Arc<dyn DeviceInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    pub fn shared_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn config(mut self, config: &ClientConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Starts the connection. Without an explicit inventory this opens the hidapi backend.
    pub fn build(self) -> Result<HidConnection<C>> {
        let config = self.config.unwrap_or_default();
        let inventory = match self.inventory {
            Some(inventory) => inventory,
            None => default_inventory(&config)?,
        };
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(InlineDispatcher));
        Ok(HidConnection::start(
            self.client,
            inventory,
            dispatcher,
            config.fallback_report_len,
        ))
    }
}

#[cfg(feature = "hid")]
fn default_inventory(config: &ClientConfig) -> Result<Arc<dyn DeviceInventory>> {
    Ok(Arc::new(crate::backends::hid::HidApiInventory::new(config)?))
}

#[cfg(not(feature = "hid"))]
fn default_inventory(_config: &ClientConfig) -> Result<Arc<dyn DeviceInventory>> {
    Err(HidError::Config(
        "no inventory given and the `hid` feature is disabled".into(),
    ))
}
