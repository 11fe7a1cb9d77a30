// Device dispatcher: serialized, retrying command channel
//
// The physical feeder cannot handle concurrent sessions from one
// controller, so a single mutex guards the entire session lifecycle. A
// caller that cannot take the session within its acquire deadline fails
// with DeviceBusy instead of queueing; an in-flight attempt always runs to
// its own completion or per-attempt deadline.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{DeviceLink, DeviceState, LinkError};
use crate::error::FeederError;

/// Bounded-retry parameters for one logical command.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before the command is declared unreachable.
    pub max_attempts: u32,
    /// Deadline for one connect/send/ack exchange.
    pub attempt_timeout: Duration,
    /// Delay before attempt n+1; grows linearly (delay, 2*delay, ...).
    pub retry_delay: Duration,
    /// How long a caller waits for the exclusive session.
    pub acquire_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Dispatcher<L> {
    link: L,
    feed_dp: String,
    policy: RetryPolicy,
    // Single-holder exclusive section around the device session. A mutex,
    // not a pool: the appliance genuinely serializes.
    session: Mutex<()>,
}

impl<L: DeviceLink> Dispatcher<L> {
    pub fn new(link: L, feed_dp: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            link,
            feed_dp: feed_dp.into(),
            policy,
            session: Mutex::new(()),
        }
    }

    /// Dispense `portions` portions.
    pub async fn feed(&self, portions: u32) -> Result<(), FeederError> {
        if portions == 0 {
            return Err(FeederError::InvalidTimer(
                "portions must be at least 1".to_string(),
            ));
        }

        let _session = self.acquire().await?;
        debug!(portions, dp = %self.feed_dp, "Dispatching feed command");
        self.run_with_retry(|| self.link.send_data_point(&self.feed_dp, portions))
            .await?;
        info!(portions, "Feed command acknowledged");
        Ok(())
    }

    /// Read the device's current data-point map.
    pub async fn status(&self) -> Result<DeviceState, FeederError> {
        let _session = self.acquire().await?;
        debug!("Querying device status");
        self.run_with_retry(|| self.link.query_state()).await
    }

    /// Take the exclusive section, bounded by the acquire deadline.
    /// Abandoning the wait does not disturb the in-flight command.
    async fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, FeederError> {
        timeout(self.policy.acquire_timeout, self.session.lock())
            .await
            .map_err(|_| FeederError::DeviceBusy)
    }

    /// Run one logical command: up to `max_attempts` wire attempts, each
    /// under its own deadline, with linearly growing delay in between.
    /// A device-side refusal short-circuits immediately.
    async fn run_with_retry<T, F, Fut>(&self, op: F) -> Result<T, FeederError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LinkError>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match timeout(self.policy.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_transient() => {
                    warn!(attempt, error = %e, "Device rejected command");
                    return Err(FeederError::DeviceRejected(e.to_string()));
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Device attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!(attempt, "Device attempt hit its deadline");
                    last_error = format!(
                        "attempt deadline of {:?} exceeded",
                        self.policy.attempt_timeout
                    );
                }
            }

            if attempt < self.policy.max_attempts {
                sleep(self.policy.retry_delay * attempt).await;
            }
        }

        Err(FeederError::DeviceUnreachable {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }
}
