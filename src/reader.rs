//! Per-epoch read loop.

use crate::backends::ReportStream;
use crate::device::DeviceIdentity;
use crate::error::{HidError, ReadError};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the loop reports back to its owner.
pub(crate) trait ReadSink: Send + Sync + 'static {
    fn report(&self, bytes: Vec<u8>);

    /// The stream failed for `epoch`. Called at most once per loop.
    fn failed(&self, epoch: u64);
}

pub(crate) struct ReadLoop<S: ReadSink> {
    pub sink: Arc<S>,
    pub stream: Arc<dyn ReportStream>,
    pub cancel: CancellationToken,
    pub buffer_len: usize,
    pub identity: DeviceIdentity,
    pub epoch: u64,
    /// Released by the attaching thread once the connect has been announced, or by teardown
    /// if the epoch ends first. Dropping every sender also releases it.
    pub start: Receiver<()>,
}

impl<S: ReadSink> ReadLoop<S> {
    /// Starts the loop on its own named thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, HidError> {
        std::thread::Builder::new()
            .name(format!("hid-read-{}", self.identity))
            .spawn(move || self.run())
            .map_err(HidError::Spawn)
    }

    fn run(self) {
        let _ = self.start.recv();
        let mut buf = vec![0u8; self.buffer_len];
        tracing::trace!(device = %self.identity, epoch = self.epoch, len = buf.len(), "read loop started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.stream.read(&mut buf, &self.cancel) {
                Ok(0) => continue,
                Ok(n) => {
                    // A read that raced a teardown must not deliver.
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    tracing::trace!(device = %self.identity, epoch = self.epoch, len = n, "report");
                    self.sink.report(buf[..n].to_vec());
                }
                Err(ReadError::Cancelled) => break,
                Err(ReadError::Io(e)) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    tracing::debug!(device = %self.identity, epoch = self.epoch, error = %e, "read failed");
                    self.sink.failed(self.epoch);
                    return;
                }
            }
        }
        tracing::trace!(device = %self.identity, epoch = self.epoch, "read loop cancelled");
    }
}
