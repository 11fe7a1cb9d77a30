// Device capability seam
//
// The feeder is a single stateful appliance reachable only over the LAN.
// Everything above this trait treats it as an opaque capability: write one
// data point, or read the full data-point map. The encrypted local protocol
// lives behind the `DeviceLink` implementation.

pub mod dispatcher;
pub mod lan;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub use dispatcher::{Dispatcher, RetryPolicy};
pub use lan::LanDevice;

/// Snapshot of the device's data points, keyed by data-point index.
/// BTreeMap so status rendering is stable.
pub type DeviceState = BTreeMap<String, Value>;

/// A single wire-level exchange outcome. The dispatcher's retry policy
/// keys off `is_transient`.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Could not reach or converse with the device (refused, reset, ...).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The device answered with something that does not parse as an ack.
    #[error("malformed device reply: {0}")]
    Malformed(String),

    /// The device answered and explicitly refused the command.
    #[error("device refused: {0}")]
    Rejected(String),
}

impl LinkError {
    /// Transient failures are retried; an explicit refusal is not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LinkError::Rejected(_))
    }
}

/// One session with the physical device: connect, exchange, disconnect.
///
/// Implementations need not be safe for concurrent sessions — the
/// dispatcher guarantees at most one in-flight call per process.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Write `value` to data point `dp` and wait for the ack.
    async fn send_data_point(&self, dp: &str, value: u32) -> Result<(), LinkError>;

    /// Read the full data-point map.
    async fn query_state(&self) -> Result<DeviceState, LinkError>;
}
