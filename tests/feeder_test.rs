// End-to-end scenarios for the feeder core: service, store, gate,
// dispatcher and scheduler wired together against a scripted device.

use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use petfeeder::auth::AuthGate;
use petfeeder::device::{DeviceLink, DeviceState, Dispatcher, LinkError, RetryPolicy};
use petfeeder::error::FeederError;
use petfeeder::scheduler::FeedScheduler;
use petfeeder::service::FeederService;
use petfeeder::store::StateStore;

/// Device double: records every dispensed portion count, can be switched
/// to fail transiently, and tracks wire-session overlap.
#[derive(Default)]
struct FakeFeeder {
    feeds: std::sync::Mutex<Vec<u32>>,
    failing: AtomicBool,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    session_delay_ms: u64,
}

/// Local newtype so `DeviceLink` can be implemented without hitting the
/// orphan rule on `Arc<FakeFeeder>`.
#[derive(Clone)]
struct SharedFeeder(Arc<FakeFeeder>);

impl std::ops::Deref for SharedFeeder {
    type Target = FakeFeeder;
    fn deref(&self) -> &FakeFeeder {
        &self.0
    }
}

#[async_trait]
impl DeviceLink for SharedFeeder {
    async fn send_data_point(&self, _dp: &str, value: u32) -> Result<(), LinkError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.session_delay_ms > 0 {
            sleep(Duration::from_millis(self.session_delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(LinkError::Connect("connection refused".into()));
        }
        self.feeds.lock().unwrap().push(value);
        Ok(())
    }

    async fn query_state(&self) -> Result<DeviceState, LinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LinkError::Connect("connection refused".into()));
        }
        let mut state = DeviceState::new();
        state.insert("3".to_string(), serde_json::json!(0));
        Ok(state)
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    feeder: Arc<FakeFeeder>,
    store: Arc<StateStore>,
    service: FeederService<SharedFeeder>,
    scheduler: FeedScheduler<SharedFeeder>,
}

fn harness_with(feeder: FakeFeeder) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).unwrap());
    let feeder = Arc::new(feeder);

    let dispatcher = Arc::new(Dispatcher::new(
        SharedFeeder(feeder.clone()),
        "3",
        RetryPolicy {
            max_attempts: 2,
            attempt_timeout: Duration::from_millis(500),
            retry_delay: Duration::from_millis(1),
            acquire_timeout: Duration::from_secs(2),
        },
    ));
    let gate = AuthGate::new(store.clone());
    let service = FeederService::new(store.clone(), gate, dispatcher.clone(), 1);
    let scheduler = FeedScheduler::new(store.clone(), dispatcher, Tz::UTC);

    Harness {
        _dir: dir,
        feeder,
        store,
        service,
        scheduler,
    }
}

fn harness() -> Harness {
    harness_with(FakeFeeder::default())
}

fn clock(day: u32, hour: u32, minute: u32) -> chrono::DateTime<Tz> {
    Tz::UTC.with_ymd_and_hms(2026, 8, day, hour, minute, 0).unwrap()
}

#[tokio::test]
async fn test_seeded_operator_schedules_and_scheduler_fires_across_days() {
    let h = harness();
    h.store.seed_operators(&[111]).await.unwrap();

    // Operator 111 schedules 2 portions at 08:00
    h.service.add_timer(111, 8, 0, 2).await.unwrap();
    let timers = h.service.list_timers(111).await.unwrap();
    assert_eq!(timers.len(), 1);
    assert_eq!((timers[0].hour, timers[0].minute, timers[0].portions), (8, 0, 2));

    // 08:00 same day: the scheduler dispatches Feed(2)
    h.scheduler.tick(clock(27, 8, 0)).await;
    assert_eq!(*h.feeder.feeds.lock().unwrap(), vec![2]);
    assert_eq!(
        h.service.list_timers(111).await.unwrap()[0].last_fired,
        Some(chrono::NaiveDate::from_ymd_opt(2026, 8, 27).unwrap())
    );

    // Repeated ticks the same day do nothing
    h.scheduler.tick(clock(27, 8, 0)).await;
    assert_eq!(h.feeder.feeds.lock().unwrap().len(), 1);

    // 08:00 the following day: fires again
    h.scheduler.tick(clock(28, 8, 0)).await;
    assert_eq!(*h.feeder.feeds.lock().unwrap(), vec![2, 2]);
}

#[tokio::test]
async fn test_unauthorized_add_operator_changes_nothing() {
    let h = harness();
    h.store.seed_operators(&[111]).await.unwrap();

    assert!(matches!(
        h.service.add_operator(999, 222).await,
        Err(FeederError::Unauthorized(999))
    ));

    // Membership is unchanged: 222 still cannot list timers
    assert!(matches!(
        h.service.list_timers(222).await,
        Err(FeederError::Unauthorized(222))
    ));
    // And whoami still answers the unauthorized caller
    assert_eq!(h.service.whoami(999), 999);
}

#[tokio::test]
async fn test_device_outage_means_missed_for_the_day() {
    let h = harness();
    h.store.seed_operators(&[111]).await.unwrap();
    h.service.add_timer(111, 8, 0, 2).await.unwrap();

    // All retry attempts fail during the matching minute
    h.feeder.failing.store(true, Ordering::SeqCst);
    h.scheduler.tick(clock(27, 8, 0)).await;

    assert!(h.feeder.feeds.lock().unwrap().is_empty());
    assert_eq!(h.service.list_timers(111).await.unwrap()[0].last_fired, None);

    // The device recovers later the same day, but the window has passed:
    // no catch-up firing
    h.feeder.failing.store(false, Ordering::SeqCst);
    h.scheduler.tick(clock(27, 9, 0)).await;
    h.scheduler.tick(clock(27, 12, 0)).await;
    assert!(h.feeder.feeds.lock().unwrap().is_empty());

    // Next day's window fires normally
    h.scheduler.tick(clock(28, 8, 0)).await;
    assert_eq!(*h.feeder.feeds.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_manual_feed_and_scheduled_fire_share_one_wire_session() {
    let h = harness_with(FakeFeeder {
        session_delay_ms: 20,
        ..FakeFeeder::default()
    });
    h.store.seed_operators(&[111]).await.unwrap();
    h.store.upsert_timer(8, 0, 2).await.unwrap();

    let service_feed = h.service.feed(111, Some(3));
    let scheduled = h.scheduler.tick(clock(27, 8, 0));
    let (manual, ()) = tokio::join!(service_feed, scheduled);
    manual.unwrap();

    let feeds = h.feeder.feeds.lock().unwrap();
    assert_eq!(feeds.len(), 2);
    assert!(feeds.contains(&2) && feeds.contains(&3));
    // Never two simultaneous sessions against the device
    assert_eq!(h.feeder.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let store = Arc::new(StateStore::load(&path).unwrap());
        store.seed_operators(&[111]).await.unwrap();
        store.upsert_timer(8, 0, 2).await.unwrap();
        store
            .mark_fired("08:00", chrono::NaiveDate::from_ymd_opt(2026, 8, 27).unwrap())
            .await
            .unwrap();
    }

    // "Restart": load the same file into a fresh store and wire a fresh
    // scheduler; the already-fired date must still hold the timer back.
    let store = Arc::new(StateStore::load(&path).unwrap());
    assert!(store.is_operator(111).await);

    let feeder = Arc::new(FakeFeeder::default());
    let dispatcher = Arc::new(Dispatcher::new(
        SharedFeeder(feeder.clone()),
        "3",
        RetryPolicy::default(),
    ));
    let scheduler = FeedScheduler::new(store.clone(), dispatcher, Tz::UTC);

    scheduler.tick(clock(27, 8, 0)).await;
    assert!(feeder.feeds.lock().unwrap().is_empty());

    scheduler.tick(clock(28, 8, 0)).await;
    assert_eq!(*feeder.feeds.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_replacing_a_timer_keeps_latest_portions() {
    let h = harness();
    h.store.seed_operators(&[111]).await.unwrap();

    h.service.add_timer(111, 8, 0, 2).await.unwrap();
    h.service.add_timer(111, 8, 0, 5).await.unwrap();

    let timers = h.service.list_timers(111).await.unwrap();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].portions, 5);

    h.scheduler.tick(clock(27, 8, 0)).await;
    assert_eq!(*h.feeder.feeds.lock().unwrap(), vec![5]);
}

#[tokio::test]
async fn test_operator_onboarding_flow() {
    let h = harness();
    h.store.seed_operators(&[111]).await.unwrap();

    // New user discovers their id, an existing operator authorizes it
    let new_id = h.service.whoami(222);
    h.service.add_operator(111, new_id).await.unwrap();

    // The new operator can use privileged commands right away
    assert_eq!(h.service.feed(222, None).await.unwrap(), 1);
    assert_eq!(*h.feeder.feeds.lock().unwrap(), vec![1]);
}
