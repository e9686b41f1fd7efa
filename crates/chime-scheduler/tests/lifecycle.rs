//! End-to-end tests for the full pipeline: store + poller + processor +
//! service over a shared SQLite file, under paused tokio time.
//!
//! Each test gets its own database file so multi-connection setups (two
//! "processes" sharing one store) behave like production.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use chime_core::config::SchedulerConfig;
use chime_core::reminder::Reminder;
use chime_scheduler::db::{init_db, open_db};
use chime_scheduler::{Clock, ReminderCallback, ReminderService, ReminderStore};

const BASE: i64 = 1_700_000_000_000;

static DB_SEQ: AtomicU32 = AtomicU32::new(0);

fn temp_db_path() -> PathBuf {
    let n = DB_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("chime-lifecycle-{}-{n}.db", std::process::id()))
}

fn cleanup(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

/// Pins the clock to tokio's virtual time, so paused-time sleeps move the
/// whole pipeline (poll ticks, dispatch timer, eligibility windows) together.
struct TestClock {
    base: i64,
    start: tokio::time::Instant,
}

impl TestClock {
    fn new(base: i64) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn now_millis(&self) -> i64 {
        self.base + self.start.elapsed().as_millis() as i64
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig::default()
}

fn open_store(path: &Path) -> ReminderStore {
    let conn = open_db(path.to_str().unwrap()).unwrap();
    init_db(&conn).unwrap();
    ReminderStore::new(conn)
}

fn reminder(name: &str, execution_time: i64) -> Reminder {
    Reminder {
        actor_type: "worker".into(),
        actor_id: "1".into(),
        name: name.into(),
        execution_time,
        period: None,
        ttl: None,
        data: Vec::new(),
        lease_time: 0,
    }
}

type FiredLog = Arc<Mutex<Vec<(String, Vec<u8>, i64)>>>;

/// Build one "process": a service over two fresh connections to `path`, with
/// its poller and dispatch loop running. The returned log records
/// `(key, data, fired_at_ms)` per callback invocation.
fn start_service(
    path: &Path,
    clock: &Arc<dyn Clock>,
    shutdown: &watch::Sender<bool>,
    config: SchedulerConfig,
) -> (ReminderService, FiredLog) {
    let fired: FiredLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let cb_clock = Arc::clone(clock);
    let callback: ReminderCallback = Arc::new(move |r: &Reminder| {
        sink.lock()
            .unwrap()
            .push((r.key().format(), r.data.clone(), cb_clock.now_millis()));
    });
    let service = ReminderService::new(
        open_store(path),
        open_store(path),
        Arc::clone(clock),
        callback,
    );
    service.start(config, shutdown.subscribe());
    (service, fired)
}

fn row_count(path: &Path) -> i64 {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn future_reminder_fires_once_and_row_is_gone() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let (service, fired) = start_service(&path, &clock, &shutdown, config());

    service.add(reminder("due", BASE + 100)).unwrap();
    tokio::time::sleep(Duration::from_millis(5000)).await;

    {
        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, "worker/1/due");
        assert!(fired[0].2 >= BASE + 100);
    }
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn past_due_reminder_fires_on_next_tick() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let (service, fired) = start_service(&path, &clock, &shutdown, config());

    service.add(reminder("overdue", BASE - 10_000)).unwrap();
    tokio::time::sleep(Duration::from_millis(3000)).await;

    assert_eq!(fired.lock().unwrap().len(), 1);
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn replace_before_fire_uses_latest_version_once() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let (service, fired) = start_service(&path, &clock, &shutdown, config());

    // v1 sits inside the fetch-ahead window, so it is leased and queued
    // almost immediately. The replacement must displace that queued copy.
    service.add(reminder("job", BASE + 3000)).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let mut v2 = reminder("job", BASE + 20_000);
    v2.data = b"v2".to_vec();
    service.add(v2).unwrap();

    tokio::time::sleep(Duration::from_millis(21_000)).await;

    {
        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, b"v2");
        assert!(fired[0].2 >= BASE + 20_000);
    }
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn delete_before_fire_suppresses_callback() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let (service, fired) = start_service(&path, &clock, &shutdown, config());

    let r = reminder("doomed", BASE + 5000);
    let key = r.key();
    service.add(r).unwrap();
    tokio::time::sleep(Duration::from_millis(3000)).await;

    service.delete(&key).unwrap();
    tokio::time::sleep(Duration::from_millis(7000)).await;

    assert!(fired.lock().unwrap().is_empty());
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn two_processes_fire_a_shared_row_exactly_once() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let (service_a, fired_a) = start_service(&path, &clock, &shutdown, config());
    let (_service_b, fired_b) = start_service(&path, &clock, &shutdown, config());

    service_a.add(reminder("shared", BASE + 1000)).unwrap();
    tokio::time::sleep(Duration::from_millis(6000)).await;

    let total = fired_a.lock().unwrap().len() + fired_b.lock().unwrap().len();
    assert_eq!(total, 1);
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn lease_expiry_recovers_a_crashed_acquirer() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));

    // Process P leases the row, then "dies" without firing it.
    let store_p = open_store(&path);
    store_p.upsert(&reminder("orphan", BASE + 100)).unwrap();
    let leased = store_p.acquire_next_batch(BASE, 5000, 30_000, 1).unwrap();
    assert_eq!(leased.len(), 1);
    drop(store_p);

    let (shutdown, _rx) = watch::channel(false);
    let (_service_q, fired) = start_service(&path, &clock, &shutdown, config());

    // Inside the lease window the row is invisible to process Q.
    tokio::time::sleep(Duration::from_millis(25_000)).await;
    assert!(fired.lock().unwrap().is_empty());

    // Once the lease expires, Q's next poll reclaims and fires it.
    tokio::time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(fired.lock().unwrap().len(), 1);
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn batch_size_one_drains_backlog_across_ticks() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let mut small = config();
    small.batch_size = 1;
    let (service, fired) = start_service(&path, &clock, &shutdown, small);

    for name in ["a", "b", "c"] {
        service.add(reminder(name, BASE - 1000)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10_000)).await;

    assert_eq!(fired.lock().unwrap().len(), 3);
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}

#[tokio::test(start_paused = true)]
async fn repeating_reminder_fires_until_deleted() {
    let path = temp_db_path();
    let clock: Arc<dyn Clock> = Arc::new(TestClock::new(BASE));
    let (shutdown, _rx) = watch::channel(false);
    let (service, fired) = start_service(&path, &clock, &shutdown, config());

    let mut tick = reminder("tick", BASE + 100);
    tick.period = Some(5000);
    let key = tick.key();
    service.add(tick).unwrap();

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(fired.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(fired.lock().unwrap().len(), 2);

    service.delete(&key).unwrap();
    tokio::time::sleep(Duration::from_millis(10_000)).await;
    assert_eq!(fired.lock().unwrap().len(), 2);
    assert_eq!(row_count(&path), 0);
    cleanup(&path);
}
