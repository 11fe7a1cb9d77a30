// Configuration structs
//
// Mirrors the on-disk TOML layout: [device], [operators], [general].
// Everything the core consumes is constructed here once and passed to
// components explicitly — no ambient globals.

use anyhow::{bail, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Device connection and dispatch parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    /// Static LAN address of the feeder.
    pub host: String,

    /// Local control port (Tuya devices listen on 6668).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Device id as registered with the vendor cloud.
    pub device_id: String,

    /// Local encryption key; consumed by the protocol bridge, opaque here.
    pub local_key: String,

    /// Local protocol version (3.3 on most current feeders).
    #[serde(default = "default_version")]
    pub version: f32,

    /// Data-point index that triggers portion dispensing (often "3").
    pub feed_dp: String,

    /// Portions dispensed by a feed command that names no count.
    #[serde(default = "default_portions")]
    pub default_portions: u32,

    /// Wire-level attempts per logical command before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Deadline for a single connect/send/ack exchange, in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// How long a caller waits for the device session before `DeviceBusy`.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

/// Operator bootstrap list.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSettings {
    /// Operator ids merged into the store at startup. Must be non-empty:
    /// the allowed set only grows at runtime, so an empty seed would leave
    /// nobody able to add anyone.
    pub seed: Vec<i64>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralSettings {
    /// IANA timezone all timers are interpreted in. Fixed for the process
    /// lifetime.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Durable state file (timers + operators). Defaults to
    /// ~/.petfeeder/state.json.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            state_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub device: DeviceSettings,
    pub operators: OperatorSettings,
    #[serde(default)]
    pub general: GeneralSettings,
}

impl Settings {
    /// Validate cross-field constraints TOML parsing cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.device.host.is_empty() {
            bail!("[device] host must not be empty");
        }
        if self.device.feed_dp.is_empty() {
            bail!("[device] feed_dp must not be empty");
        }
        if self.device.default_portions == 0 {
            bail!("[device] default_portions must be at least 1");
        }
        if self.device.max_attempts == 0 {
            bail!("[device] max_attempts must be at least 1");
        }
        if self.operators.seed.is_empty() {
            bail!("[operators] seed must list at least one operator id");
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.device.attempt_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.device.acquire_timeout_secs)
    }
}

fn default_port() -> u16 {
    6668
}

fn default_version() -> f32 {
    3.3
}

fn default_portions() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_timezone() -> Tz {
    Tz::UTC
}
