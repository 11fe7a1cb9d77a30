// Crate-wide error taxonomy
//
// Authorization and validation failures surface immediately; device errors
// are classified after the dispatcher's retry policy has run its course.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeederError {
    /// Operator is not in the allowed set.
    #[error("operator {0} is not authorized")]
    Unauthorized(i64),

    /// All retry attempts against the device failed with transient errors.
    #[error("device unreachable after {attempts} attempt(s): {last_error}")]
    DeviceUnreachable { attempts: u32, last_error: String },

    /// The device explicitly refused the command; not retried.
    #[error("device rejected the command: {0}")]
    DeviceRejected(String),

    /// Another command held the device session past the acquire deadline.
    #[error("device busy: another command is in flight")]
    DeviceBusy,

    /// Persisted state exists but cannot be parsed.
    #[error("state file is corrupt: {0}")]
    StoreCorrupt(String),

    /// No timer is scheduled at the given time-of-day.
    #[error("no timer scheduled at {0}")]
    TimerNotFound(String),

    /// Out-of-range time-of-day or non-positive portion count.
    #[error("invalid timer: {0}")]
    InvalidTimer(String),

    /// Durable write or other local I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
