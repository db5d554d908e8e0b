mod common;

use common::*;
use hidclient::backends::virtual_input::{VirtualDevice, VirtualInventory};
use hidclient::HidConnection;

#[test]
fn io_failure_reconnects_and_delivers_next_report() {
    let inventory = VirtualInventory::new();
    let (client, probe) = client();
    let conn = HidConnection::new(client, inventory.clone());
    let events = connection_events(&conn);

    let dev = VirtualDevice::new(PAD, 4);
    dev.push_failure();
    dev.push_report([5, 6, 7, 8]);
    inventory.attach(dev.clone());

    assert!(next(&events));
    assert!(!next(&events));
    assert!(next(&events));
    assert_eq!(next(&probe.reports), vec![5, 6, 7, 8]);

    // Nothing partial was delivered before the good report.
    assert!(probe.reports.try_recv().is_err());
    assert_eq!(dev.open_count(), 2);
    assert_eq!(dev.close_count(), 1);
    assert_eq!(dev.max_live_streams(), 1);
    assert!(conn.is_connected());
}

#[test]
fn on_connect_fires_once_per_epoch() {
    let inventory = VirtualInventory::new();
    let dev = VirtualDevice::new(PAD, 4);
    inventory.attach(dev.clone());

    let (client, probe) = client();
    let _conn = HidConnection::new(client, inventory.clone());
    next(&probe.connects);

    dev.push_failure();
    next(&probe.connects);
    assert!(probe.connects.recv_timeout(QUIET).is_err());
    assert_eq!(dev.open_count(), 2);
}

#[test]
fn repeated_failures_retry_without_limit() {
    let inventory = VirtualInventory::new();
    let (client, probe) = client();
    let conn = HidConnection::new(client, inventory.clone());
    let events = connection_events(&conn);

    let dev = VirtualDevice::new(PAD, 4);
    for _ in 0..3 {
        dev.push_failure();
    }
    dev.push_report([1]);
    inventory.attach(dev.clone());

    let seen: Vec<bool> = (0..7).map(|_| next(&events)).collect();
    assert_eq!(seen, vec![true, false, true, false, true, false, true]);
    assert_eq!(next(&probe.reports), vec![1]);
    assert_eq!(dev.open_count(), 4);
    assert_eq!(dev.max_live_streams(), 1);
}

#[test]
fn unplug_and_replug() {
    let inventory = VirtualInventory::new();
    let dev = VirtualDevice::new(PAD, 4);
    inventory.attach(dev.clone());

    let (client, probe) = client();
    let conn = HidConnection::new(client, inventory.clone());
    let events = connection_events(&conn);
    assert!(conn.is_connected());

    inventory.detach(PAD);
    assert!(!next(&events));
    assert!(!conn.is_connected());
    assert_eq!(dev.live_streams(), 0);
    // Exactly one disconnect, even though both the closed notification and the
    // reader's failed read may race to report it.
    assert!(events.recv_timeout(QUIET).is_err());

    dev.push_report([9, 9]);
    inventory.attach(dev.clone());
    assert!(next(&events));
    assert_eq!(next(&probe.reports), vec![9, 9]);
    assert_eq!(dev.open_count(), 2);
}
