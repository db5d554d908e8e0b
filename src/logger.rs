use crate::event::ConnectionEvent;
use crate::eventbus::ConnectionListener;
use tracing::info;

/// A simple listener that logs every connection event.
pub struct LoggingListener {
    label: String,
}

impl LoggingListener {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ConnectionListener for LoggingListener {
    fn on_event(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectionChanged(connected) => {
                info!(device = %self.label, connected, "connection changed")
            }
            ConnectionEvent::PropertyChanged { property } => {
                info!(device = %self.label, property, "property changed")
            }
        }
    }
}
