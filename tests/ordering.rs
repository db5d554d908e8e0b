//! Interleavings between the attachment lock and event delivery.
//!
//! A global `tracing` layer stalls chosen log lines on chosen threads, which holds a thread
//! inside the window right after it leaves the attachment lock. Each test uses its own device
//! identity, so the reader threads it spawns (`hid-read-<identity>`) match only its own rules.

mod common;

use common::*;
use hidclient::backends::virtual_input::{VirtualDevice, VirtualInventory};
use hidclient::{DeviceIdentity, HidConnection};
use std::fmt;
use std::sync::Once;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

const REORDER: DeviceIdentity = DeviceIdentity::new(0x077d, 0x0501);
const STALE: DeviceIdentity = DeviceIdentity::new(0x077d, 0x0502);
const CLOSING: DeviceIdentity = DeviceIdentity::new(0x077d, 0x0503);

const STALL: Duration = Duration::from_millis(300);

/// (thread name, log message) pairs that sleep for [`STALL`] when logged.
const STALLS: &[(&str, &str)] = &[
    ("hid-read-077d:0501", "disconnected"),
    ("hid-read-077d:0502", "read failed"),
    ("attach-077d:0503", "connected"),
];

#[derive(Default)]
struct Message(String);

impl Visit for Message {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

struct Stall;

impl<S: Subscriber> Layer<S> for Stall {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let thread = std::thread::current();
        let Some(name) = thread.name() else { return };
        let mut message = Message::default();
        event.record(&mut message);
        if STALLS.iter().any(|&(t, m)| t == name && m == message.0) {
            std::thread::sleep(STALL);
        }
    }
}

fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        tracing::subscriber::set_global_default(tracing_subscriber::registry().with(Stall))
            .expect("install subscriber");
    });
}

#[test]
fn late_disconnect_is_not_delivered_after_reconnect() {
    install();
    let inventory = VirtualInventory::new();
    let dev = VirtualDevice::new(REORDER, 4);
    inventory.attach(dev.clone());

    let (client, _probe) = client_for(REORDER);
    let conn = HidConnection::new(client, inventory.clone());
    let events = connection_events(&conn);

    // The reader records `false` and then stalls before announcing it; meanwhile this thread
    // attaches again.
    dev.push_failure();
    std::thread::sleep(Duration::from_millis(100));
    inventory.notify_changed();

    assert!(!next(&events));
    assert!(next(&events));
    assert!(events.recv_timeout(STALL + QUIET).is_err());
    assert!(conn.is_connected());
    assert_eq!(dev.open_count(), 2);
}

#[test]
fn failure_from_an_old_epoch_leaves_the_new_one_alone() {
    install();
    let inventory = VirtualInventory::new();
    let dev = VirtualDevice::new(STALE, 4);
    inventory.attach(dev.clone());

    let (client, probe) = client_for(STALE);
    let conn = HidConnection::new(client, inventory.clone());
    let events = connection_events(&conn);

    // Epoch 0's reader fails and stalls before reporting it. Meanwhile the device is replugged,
    // which ends epoch 0 and starts epoch 1.
    dev.push_failure();
    std::thread::sleep(Duration::from_millis(100));
    inventory.detach(STALE);
    assert!(!next(&events));
    dev.push_report([3, 3]);
    inventory.attach(dev.clone());
    assert!(next(&events));
    assert_eq!(next(&probe.reports), vec![3, 3]);

    // The stale failure lands now and must change nothing.
    std::thread::sleep(STALL);
    assert!(events.recv_timeout(QUIET).is_err());
    assert!(conn.is_connected());
    assert_eq!(dev.open_count(), 2);
    assert_eq!(dev.live_streams(), 1);
}

#[test]
fn close_during_connect_suppresses_the_announcement() {
    install();
    let inventory = VirtualInventory::new();
    let (client, probe) = client_for(CLOSING);
    let conn = HidConnection::new(client, inventory.clone());
    let events = connection_events(&conn);

    let dev = VirtualDevice::new(CLOSING, 4);
    let attacher = {
        let inventory = inventory.clone();
        let dev = dev.clone();
        std::thread::Builder::new()
            .name(format!("attach-{CLOSING}"))
            .spawn(move || inventory.attach(dev))
            .unwrap()
    };
    // The attacher has recorded `true` and stalls before announcing it.
    std::thread::sleep(Duration::from_millis(100));
    conn.close();
    attacher.join().unwrap();

    assert!(!conn.is_connected());
    assert!(events.recv_timeout(QUIET).is_err());
    assert!(probe.connects.try_recv().is_err());
    assert_eq!(dev.live_streams(), 0);
}
