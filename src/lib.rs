//! Self-healing connection to a single USB HID device.
//!
//! Implement [`HidClient`] for your device (vendor/product id plus a report callback), hand it
//! to [`HidConnection`], and the connection takes care of the rest: it attaches as soon as the
//! device is present, reads input reports on a dedicated thread, and reattaches after unplugs
//! and I/O failures. Connection changes are published as [`ConnectionEvent`]s through a
//! pluggable [`Dispatcher`](dispatch::Dispatcher).
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod backends;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod logger;
pub mod manager;
pub mod metadata;
pub mod signal;
pub mod state;

mod reader;

pub use config::ClientConfig;
pub use device::*;
pub use dispatch::{Dispatcher, InlineDispatcher, Job, QueueDispatcher};
pub use error::{HidError, ReadError, Result};
pub use event::*;
pub use eventbus::{ConnectionListener, ListenerId};
pub use manager::*;
pub use metadata::DeviceMeta;
