// Persisted data model
//
// Timers are keyed by their normalized "HH:MM" string, the same layout the
// pre-daemon timers.json used. Zero-padded keys sort chronologically, so a
// BTreeMap doubles as the sorted listing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FeederError;

/// Durable value stored per timer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEntry {
    pub portions: u32,

    /// Calendar date (in the configured timezone) of the most recent
    /// successful fire. Guards against double-firing within one day and
    /// survives restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired: Option<NaiveDate>,
}

/// A timer as handed to callers: entry plus its decoded time-of-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timer {
    pub hour: u8,
    pub minute: u8,
    pub portions: u32,
    pub last_fired: Option<NaiveDate>,
}

impl Timer {
    pub fn key(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

/// Normalize `(hour, minute)` into the canonical "HH:MM" key.
///
/// Range errors surface as `InvalidTimer` so bad front-end input never
/// reaches the store.
pub fn timer_key(hour: u8, minute: u8) -> Result<String, FeederError> {
    if hour > 23 || minute > 59 {
        return Err(FeederError::InvalidTimer(format!(
            "time-of-day {hour:02}:{minute:02} is out of range"
        )));
    }
    Ok(format!("{hour:02}:{minute:02}"))
}

/// Decode a stored "HH:MM" key. Entries with unparseable keys are skipped
/// by callers rather than failing the whole listing.
pub fn parse_timer_key(key: &str) -> Option<(u8, u8)> {
    let (h, m) = key.split_once(':')?;
    let hour: u8 = h.parse().ok()?;
    let minute: u8 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// The full durable document: timers plus the allowed-operator set.
///
/// All fields default so older files (including bare timer maps written by
/// previous versions) still load; unknown fields are ignored for forward
/// compatibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default = "default_state_version")]
    pub version: u32,

    #[serde(default)]
    pub timers: BTreeMap<String, TimerEntry>,

    #[serde(default)]
    pub operators: BTreeSet<i64>,
}

fn default_state_version() -> u32 {
    1
}
