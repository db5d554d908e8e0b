#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use hidclient::{ConnectionEvent, DeviceIdentity, EventFilter, HidClient, HidConnection};
use std::time::Duration;

pub const PAD: DeviceIdentity = DeviceIdentity::new(0x077d, 0x0410);
pub const TIMEOUT: Duration = Duration::from_secs(4);
pub const QUIET: Duration = Duration::from_millis(100);

pub struct TestClient {
    identity: DeviceIdentity,
    reports: Sender<Vec<u8>>,
    connects: Sender<()>,
}

impl HidClient for TestClient {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    fn on_connect(&self) {
        let _ = self.connects.send(());
    }

    fn on_report(&self, report: Vec<u8>) {
        let _ = self.reports.send(report);
    }
}

pub struct Probe {
    pub reports: Receiver<Vec<u8>>,
    pub connects: Receiver<()>,
}

pub fn client() -> (TestClient, Probe) {
    client_for(PAD)
}

pub fn client_for(identity: DeviceIdentity) -> (TestClient, Probe) {
    let (reports_tx, reports) = crossbeam_channel::unbounded();
    let (connects_tx, connects) = crossbeam_channel::unbounded();
    (
        TestClient {
            identity,
            reports: reports_tx,
            connects: connects_tx,
        },
        Probe { reports, connects },
    )
}

/// Subscribes to connection-changed events only.
pub fn connection_events(conn: &HidConnection<TestClient>) -> Receiver<bool> {
    let (tx, rx) = crossbeam_channel::unbounded();
    conn.subscribe(
        move |e: &ConnectionEvent| {
            if let ConnectionEvent::ConnectionChanged(v) = e {
                let _ = tx.send(*v);
            }
        },
        EventFilter::ConnectionOnly,
    );
    rx
}

/// Subscribes to every event.
pub fn all_events(conn: &HidConnection<TestClient>) -> Receiver<ConnectionEvent> {
    let (tx, rx) = crossbeam_channel::unbounded();
    conn.subscribe(
        move |e: &ConnectionEvent| {
            let _ = tx.send(e.clone());
        },
        EventFilter::All,
    );
    rx
}

pub fn next<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(TIMEOUT).expect("timed out waiting")
}

/// Polls `cond` until it holds or the timeout elapses.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + TIMEOUT;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
