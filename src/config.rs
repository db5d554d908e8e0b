//! Client configuration.
//!
//! Everything has a default except the device identity. Typically loaded from TOML:
//!
//! ```toml
//! vendor_id = 0x077d
//! product_id = 0x0410
//! fallback_report_len = 64
//! inventory_poll_interval_ms = 500
//! ```

use crate::device::DeviceIdentity;
use crate::error::{HidError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Read buffer size when the device reports a max input length of zero.
pub const DEFAULT_FALLBACK_REPORT_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Read buffer size used when the device doesn't report one.
    pub fallback_report_len: usize,
    /// How often the hidapi inventory re-enumerates.
    pub inventory_poll_interval_ms: u64,
    /// Upper bound of a single hidapi read, i.e. the cancellation latency of the read loop.
    pub read_slice_ms: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            fallback_report_len: DEFAULT_FALLBACK_REPORT_LEN,
            inventory_poll_interval_ms: 1000,
            read_slice_ms: 100,
        }
    }
}

impl ClientConfig {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            vendor_id: identity.vendor_id,
            product_id: identity.product_id,
            ..Self::default()
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.vendor_id, self.product_id)
    }

    pub fn inventory_poll_interval(&self) -> Duration {
        Duration::from_millis(self.inventory_poll_interval_ms.max(1))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| HidError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HidError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HidError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.fallback_report_len == 0 {
            return Err(HidError::Config("fallback_report_len must be > 0".into()));
        }
        if self.read_slice_ms <= 0 {
            return Err(HidError::Config("read_slice_ms must be > 0".into()));
        }
        Ok(())
    }
}
