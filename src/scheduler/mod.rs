// Feed scheduler daemon loop
//
// One tick per minute: any timer whose time-of-day matches the current
// minute in the configured timezone, and which has not already fired
// today, is dispatched. The predicate is strictly "matches now" — a timer
// whose minute passed while the process was down is not fired late, and a
// fire that fails against the device is missed for that day rather than
// deferred.

use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::device::{DeviceLink, Dispatcher};
use crate::store::{StateStore, Timer};

/// Timers carry minute granularity, so one tick per minute is the natural
/// resolution: coarser would skip matching minutes, finer buys nothing.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct FeedScheduler<L> {
    store: Arc<StateStore>,
    dispatcher: Arc<Dispatcher<L>>,
    timezone: Tz,
    running: Arc<AtomicBool>,
}

impl<L: DeviceLink> FeedScheduler<L> {
    pub fn new(store: Arc<StateStore>, dispatcher: Arc<Dispatcher<L>>, timezone: Tz) -> Self {
        Self {
            store,
            dispatcher,
            timezone,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the tick loop until `stop` is called.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(timezone = %self.timezone, "Feed scheduler started");

        let mut interval = tokio::time::interval(TICK_INTERVAL);
        // A delayed tick must not be replayed: no catch-up firing.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick completes immediately
        interval.tick().await;

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let now = chrono::Utc::now().with_timezone(&self.timezone);
            self.tick(now).await;
        }

        info!("Feed scheduler stopped");
    }

    /// One evaluation pass at clock time `now`.
    ///
    /// Dispatch failures are logged and swallowed: the loop must keep
    /// ticking for other timers and future days.
    pub async fn tick(&self, now: DateTime<Tz>) {
        let today = now.date_naive();
        let due: Vec<Timer> = self
            .store
            .timers()
            .await
            .into_iter()
            .filter(|t| {
                u32::from(t.hour) == now.hour()
                    && u32::from(t.minute) == now.minute()
                    && t.last_fired != Some(today)
            })
            .collect();

        for timer in due {
            let key = timer.key();
            info!(timer = %key, portions = timer.portions, "Timer due, dispatching feed");

            match self.dispatcher.feed(timer.portions).await {
                Ok(()) => {
                    if let Err(e) = self.store.mark_fired(&key, today).await {
                        // The feeding happened; losing the marker risks a
                        // double feed only if the persist failure clears
                        // before the next tick of this same minute.
                        error!(timer = %key, error = %e, "Failed to persist last_fired");
                    } else {
                        info!(timer = %key, "Scheduled feeding completed");
                    }
                }
                Err(e) => {
                    // Missed for today: last_fired stays unset, and the
                    // minute window will have passed by the next tick.
                    error!(timer = %key, error = %e, "Scheduled feeding failed");
                }
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
