use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduling snapshot exposed to subscribers and the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSnapshot {
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub next_cycle_at: DateTime<Utc>,
}

/// Process-wide cycle bookkeeping
///
/// Written by the scheduler and the cycle runner only; everybody else reads
/// snapshots.
#[derive(Debug)]
pub struct CycleState {
    interval: Duration,
    step: chrono::Duration,
    inner: RwLock<CycleSnapshot>,
}

impl CycleState {
    pub fn new(interval: Duration) -> Self {
        let step = chrono::Duration::milliseconds(interval.as_millis() as i64);
        Self {
            interval,
            step,
            inner: RwLock::new(CycleSnapshot {
                last_cycle_started_at: None,
                next_cycle_at: Utc::now() + step,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Timer (re)armed at `now`
    pub fn armed(&self, now: DateTime<Utc>) -> CycleSnapshot {
        self.update(|snapshot| snapshot.next_cycle_at = now + self.step)
    }

    pub fn cycle_started(&self, at: DateTime<Utc>) -> CycleSnapshot {
        self.update(|snapshot| snapshot.last_cycle_started_at = Some(at))
    }

    /// Cycle finished at `now`
    pub fn cycle_completed(&self, now: DateTime<Utc>) -> CycleSnapshot {
        self.update(|snapshot| snapshot.next_cycle_at = now + self.step)
    }

    fn update(&self, apply: impl FnOnce(&mut CycleSnapshot)) -> CycleSnapshot {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut guard);
        *guard
    }
}
