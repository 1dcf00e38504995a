use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info};

use super::cycle::CycleRunner;
use super::state::CycleSnapshot;

/// Scheduler - owns the repeating timer that triggers cycles
///
/// Ticks are fixed to the wall clock rather than chained to cycle completion:
/// every tick spawns a cycle without waiting for it, so a slow cycle may
/// overlap the next one.
pub struct Scheduler {
    runner: Arc<CycleRunner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(runner: Arc<CycleRunner>) -> Self {
        Self { runner, timer: Mutex::new(None) }
    }

    /// Arm the timer. Re-arming tears the previous timer down first, so there
    /// is never more than one live timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Clear any existing timer to prevent duplicates
        if let Some(existing) = timer.take() {
            existing.abort();
            info!("Cleared existing pinger timer");
        }

        let runner = Arc::clone(&self.runner);
        let period = runner.state().interval();

        *timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                // A panicking or failing cycle stays inside its own task
                let runner = Arc::clone(&runner);
                tokio::spawn(async move {
                    if let Err(e) = runner.run_cycle().await {
                        error!("Probe cycle aborted: {}", e);
                    }
                });
            }
        }));

        self.runner.state().armed(Utc::now());
        info!(interval_ms = period.as_millis() as u64, "Pinger timer armed");
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        self.runner.state().snapshot()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}
