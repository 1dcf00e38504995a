/// Tests for the cycle runner and scheduler
///
/// These run against an in-memory store and a scripted prober so that
/// timing, ordering and failure injection are fully under test control.
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    CycleError, CycleRunner, CycleState, ProbeErrorKind, ProbeLimiter, ProbeOutcome, Prober,
    Scheduler,
};
use crate::database::{StoreError, Target, TargetStore};
use crate::events::{EventBus, EventFrame, Subscription};

#[derive(Default)]
struct MemoryStore {
    targets: Mutex<Vec<Target>>,
    list_calls: AtomicUsize,
    fail_listing: AtomicBool,
    fail_writes: AtomicBool,
    /// Simulates a delete racing with the cycle
    delete_before_write: AtomicBool,
}

impl MemoryStore {
    fn with_urls(urls: &[&str]) -> Self {
        let store = Self::default();
        *store.targets.lock().unwrap() = urls.iter().map(|u| Target::new(u.to_string())).collect();
        store
    }

    fn find(&self, id: Uuid) -> Option<Target> {
        self.targets.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    fn simulated() -> StoreError {
        StoreError::InvalidRow { table: "targets", reason: "simulated failure".into() }
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::simulated());
        }
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn get_target(&self, id: Uuid) -> Result<Option<Target>, StoreError> {
        Ok(self.find(id))
    }

    async fn create_target(&self, url: &str) -> Result<Target, StoreError> {
        let target = Target::new(url.to_string());
        self.targets.lock().unwrap().push(target.clone());
        Ok(target)
    }

    async fn delete_target(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut targets = self.targets.lock().unwrap();
        let before = targets.len();
        targets.retain(|t| t.id != id);
        Ok(targets.len() != before)
    }

    async fn upsert_probe_result(
        &self,
        outcome: &ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Target>, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::simulated());
        }
        if self.delete_before_write.load(Ordering::SeqCst) {
            self.delete_target(outcome.target_id).await?;
        }

        let mut targets = self.targets.lock().unwrap();
        Ok(targets.iter_mut().find(|t| t.id == outcome.target_id).map(|target| {
            target.apply_outcome(outcome, at);
            target.clone()
        }))
    }
}

/// Answers after a fixed delay; any URL containing "down" fails and one
/// containing "crash" panics
#[derive(Default)]
struct ScriptedProber {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl ScriptedProber {
    fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target_id: Uuid, url: &str, _deadline: Duration) -> ProbeOutcome {
        if url.contains("crash") {
            panic!("scripted crash for {url}");
        }
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        self.started.lock().unwrap().push(url.to_string());

        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if url.contains("down") {
            ProbeOutcome::failure(target_id, ProbeErrorKind::Network, 1, "connection refused")
        } else {
            ProbeOutcome::success(target_id, 200, self.delay.as_millis() as u64)
        }
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    prober: Arc<ScriptedProber>,
    bus: Arc<EventBus>,
    runner: Arc<CycleRunner>,
}

fn harness(store: MemoryStore, prober: ScriptedProber, capacity: usize, interval_ms: u64) -> Harness {
    let store = Arc::new(store);
    let prober = Arc::new(prober);
    let state = Arc::new(CycleState::new(Duration::from_millis(interval_ms)));
    let bus = Arc::new(EventBus::new(state.clone()));
    let runner = Arc::new(CycleRunner::new(
        store.clone(),
        prober.clone(),
        ProbeLimiter::new(capacity),
        bus.clone(),
        state,
        Duration::from_millis(200),
    ));

    Harness { store, prober, bus, runner }
}

/// Attach an observer and swallow its greeting
fn observe(bus: &Arc<EventBus>) -> (Subscription, mpsc::UnboundedReceiver<EventFrame>) {
    let (subscription, mut rx) = bus.subscribe_channel();
    assert_eq!(rx.try_recv().map(|f| f.name).ok(), Some("connected"));
    assert_eq!(rx.try_recv().map(|f| f.name).ok(), Some("interval_status"));
    (subscription, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<EventFrame>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        events.push(serde_json::from_str(&frame.data).unwrap());
    }
    events
}

#[tokio::test]
async fn test_cycle_reports_each_target_once_then_status() {
    let urls: Vec<String> = (0..10).map(|i| format!("https://site{i}.test")).collect();
    let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
    let h = harness(
        MemoryStore::with_urls(&urls),
        ScriptedProber::with_delay(Duration::from_millis(20)),
        3,
        1000,
    );
    let (_subscription, mut rx) = observe(&h.bus);

    let report = h.runner.run_cycle().await.unwrap();
    assert_eq!((report.targets, report.succeeded, report.failed), (10, 10, 0));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 11);

    let pinged: HashSet<_> = events[..10]
        .iter()
        .map(|e| {
            assert_eq!(e["type"], "url_pinged");
            e["target"]["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(pinged.len(), 10);

    let status = &events[10];
    assert_eq!(status["type"], "interval_status");
    assert!(status["lastCycleStartedAt"].is_i64());
    assert!(status["nextCycleAt"].as_i64().unwrap() > status["lastCycleStartedAt"].as_i64().unwrap());

    let peak = h.prober.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded the limit");
}

#[tokio::test]
async fn test_probes_start_in_list_order() {
    let urls = ["https://a.test", "https://b.test", "https://c.test", "https://d.test"];
    let h = harness(
        MemoryStore::with_urls(&urls),
        ScriptedProber::with_delay(Duration::from_millis(5)),
        1,
        1000,
    );

    h.runner.run_cycle().await.unwrap();

    assert_eq!(*h.prober.started.lock().unwrap(), urls);
    assert_eq!(h.prober.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failures_are_published_and_recorded() {
    let h = harness(
        MemoryStore::with_urls(&["https://up.test", "https://down.test"]),
        ScriptedProber::default(),
        2,
        1000,
    );
    let (_subscription, mut rx) = observe(&h.bus);

    let report = h.runner.run_cycle().await.unwrap();
    assert_eq!((report.succeeded, report.failed), (1, 1));

    let events = drain(&mut rx);
    let down = events
        .iter()
        .find(|e| e["target"]["url"] == "https://down.test")
        .expect("failed probe was not published");
    assert_eq!(down["outcome"]["success"], false);
    assert_eq!(down["outcome"]["error"], "network");
    assert_eq!(down["target"]["lastError"], "network");

    let stored = h.store.targets.lock().unwrap().clone();
    let down = stored.iter().find(|t| t.url == "https://down.test").unwrap();
    assert_eq!(down.last_error, Some(ProbeErrorKind::Network));
    assert!(down.last_attempt_at.is_some());
    assert_eq!(down.last_probe_at, None);
}

#[tokio::test]
async fn test_list_failure_aborts_cycle() {
    let h = harness(
        MemoryStore::with_urls(&["https://a.test"]),
        ScriptedProber::default(),
        2,
        1000,
    );
    let (_subscription, mut rx) = observe(&h.bus);
    h.store.fail_listing.store(true, Ordering::SeqCst);

    let result = h.runner.run_cycle().await;
    assert!(matches!(result, Err(CycleError::ListTargets(_))));
    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.runner.state().snapshot().last_cycle_started_at, None);

    // The next cycle runs normally once the store recovers
    h.store.fail_listing.store(false, Ordering::SeqCst);
    let report = h.runner.run_cycle().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(drain(&mut rx).len(), 2);
}

#[tokio::test]
async fn test_write_failure_still_publishes() {
    let h = harness(
        MemoryStore::with_urls(&["https://a.test"]),
        ScriptedProber::default(),
        2,
        1000,
    );
    let (_subscription, mut rx) = observe(&h.bus);
    h.store.fail_writes.store(true, Ordering::SeqCst);

    h.runner.run_cycle().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events[0]["type"], "url_pinged");
    assert_eq!(events[0]["target"]["lastStatusCode"], 200);
    assert!(events[0]["target"]["lastAttemptAt"].is_i64());
    assert_eq!(events[1]["type"], "interval_status");
}

#[tokio::test]
async fn test_target_deleted_mid_cycle_is_still_reported() {
    let h = harness(
        MemoryStore::with_urls(&["https://gone.test"]),
        ScriptedProber::default(),
        1,
        1000,
    );
    let (_subscription, mut rx) = observe(&h.bus);
    h.store.delete_before_write.store(true, Ordering::SeqCst);

    h.runner.run_cycle().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events[0]["type"], "url_pinged");
    assert_eq!(events[0]["target"]["url"], "https://gone.test");
    assert!(h.store.targets.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_cycle_still_reports_status() {
    let h = harness(MemoryStore::default(), ScriptedProber::default(), 2, 1000);
    let (_subscription, mut rx) = observe(&h.bus);

    let report = h.runner.run_cycle().await.unwrap();
    assert_eq!(report.targets, 0);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "interval_status");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_observer_keeps_every_frame_of_a_large_cycle() {
    let urls: Vec<String> = (0..100).map(|i| format!("https://site{i}.test")).collect();
    let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
    let h = harness(MemoryStore::with_urls(&urls), ScriptedProber::default(), 10, 1000);
    let (_subscription, mut rx) = observe(&h.bus);

    // Reads slower than the cycle publishes
    let reader = tokio::spawn(async move {
        let mut pinged = 0;
        while let Some(frame) = rx.recv().await {
            match frame.name {
                "url_pinged" => pinged += 1,
                "interval_status" => return pinged,
                other => panic!("unexpected frame {other}"),
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        pinged
    });

    let report = h.runner.run_cycle().await.unwrap();
    assert_eq!(report.targets, 100);
    assert_eq!(h.bus.subscriber_count(), 1);

    let pinged = tokio::time::timeout(Duration::from_secs(10), reader).await.unwrap().unwrap();
    assert_eq!(pinged, 100);
}

#[tokio::test]
async fn test_panicking_check_is_still_reported() {
    let h = harness(
        MemoryStore::with_urls(&["https://a.test", "https://crash.test", "https://b.test"]),
        ScriptedProber::default(),
        1,
        1000,
    );
    let (_subscription, mut rx) = observe(&h.bus);

    let report = h.runner.run_cycle().await.unwrap();
    assert_eq!((report.targets, report.succeeded, report.failed), (3, 2, 1));

    let events = drain(&mut rx);
    assert_eq!(events.iter().filter(|e| e["type"] == "url_pinged").count(), 3);
    assert_eq!(events.last().unwrap()["type"], "interval_status");

    let crashed = events
        .iter()
        .find(|e| e["target"]["url"] == "https://crash.test")
        .expect("crashed target was not published");
    assert_eq!(crashed["outcome"]["success"], false);
    assert_eq!(crashed["outcome"]["error"], "other");

    let stored = h.store.targets.lock().unwrap().clone();
    let crashed = stored.iter().find(|t| t.url == "https://crash.test").unwrap();
    assert_eq!(crashed.last_error, Some(ProbeErrorKind::Other));
}

#[tokio::test(start_paused = true)]
async fn test_restart_keeps_a_single_timer() {
    let h = harness(MemoryStore::default(), ScriptedProber::default(), 2, 1000);
    let scheduler = Scheduler::new(h.runner.clone());

    scheduler.start();
    scheduler.start();
    assert!(scheduler.is_armed());
    assert!(scheduler.snapshot().next_cycle_at > Utc::now());

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(h.store.list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_does_not_stop_timer() {
    let h = harness(MemoryStore::default(), ScriptedProber::default(), 2, 1000);
    h.store.fail_listing.store(true, Ordering::SeqCst);
    let scheduler = Scheduler::new(h.runner.clone());

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(h.store.list_calls.load(Ordering::SeqCst), 2);
    assert!(scheduler.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_does_not_delay_next_tick() {
    let h = harness(
        MemoryStore::with_urls(&["https://slow.test"]),
        ScriptedProber::with_delay(Duration::from_millis(2500)),
        4,
        1000,
    );
    let scheduler = Scheduler::new(h.runner.clone());

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    // Ticks at 1s, 2s and 3s each started a cycle while the first was still probing
    assert_eq!(h.store.list_calls.load(Ordering::SeqCst), 3);
    assert!(h.prober.peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_scheduler_stops_timer() {
    let h = harness(MemoryStore::default(), ScriptedProber::default(), 2, 1000);
    let scheduler = Scheduler::new(h.runner.clone());

    scheduler.start();
    drop(scheduler);
    tokio::time::sleep(Duration::from_millis(3000)).await;

    assert_eq!(h.store.list_calls.load(Ordering::SeqCst), 0);
}
