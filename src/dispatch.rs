//! Dispatch contexts for connection events.
//!
//! A [`Dispatcher`] decides where posted jobs run. The connection posts one job per state
//! transition; the job fans the resulting events out to listeners. Use
//! [`QueueDispatcher`] when listeners must run on a thread you own (a UI loop, a game tick),
//! or pass any `Fn(Job)` closure to forward jobs to your own executor.

use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Dispatcher: Send + Sync {
    fn post(&self, job: Job);
}

impl<F> Dispatcher for F
where
    F: Fn(Job) + Send + Sync,
{
    fn post(&self, job: Job) {
        self(job)
    }
}

/// Runs each job immediately on the posting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn post(&self, job: Job) {
        job()
    }
}

/// Queues jobs until the owner pumps them.
///
/// Cloning the dispatcher shares the same queue.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Runs every job queued so far and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one job and runs it. Returns whether a job ran.
    pub fn run_one_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for QueueDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for QueueDispatcher {
    fn post(&self, job: Job) {
        // The dispatcher owns a receiver, so the channel can't be disconnected.
        let _ = self.tx.send(job);
    }
}
