use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info};

use super::limiter::ProbeLimiter;
use super::prober::Prober;
use super::state::CycleState;
use super::types::{ProbeErrorKind, ProbeOutcome};
use crate::database::{StoreError, Target, TargetStore};
use crate::events::{EventBus, ServerEvent};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to list targets: {0}")]
    ListTargets(#[source] StoreError),
}

/// Summary of one finished cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Cycle runner - one sweep over every current target
pub struct CycleRunner {
    store: Arc<dyn TargetStore>,
    prober: Arc<dyn Prober>,
    limiter: ProbeLimiter,
    bus: Arc<EventBus>,
    state: Arc<CycleState>,
    probe_timeout: Duration,
}

impl CycleRunner {
    pub fn new(
        store: Arc<dyn TargetStore>,
        prober: Arc<dyn Prober>,
        limiter: ProbeLimiter,
        bus: Arc<EventBus>,
        state: Arc<CycleState>,
        probe_timeout: Duration,
    ) -> Self {
        Self { store, prober, limiter, bus, state, probe_timeout }
    }

    pub fn state(&self) -> &Arc<CycleState> {
        &self.state
    }

    /// Run one cycle
    ///
    /// Probes the target list as it was when the cycle started, publishes one
    /// `url_pinged` per target and, once all of them are done, a single
    /// `interval_status`. Only a failure to list targets aborts the cycle;
    /// individual probes fail independently.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let targets = self.store.list_targets().await.map_err(CycleError::ListTargets)?;

        let started_at = Utc::now();
        self.state.cycle_started(started_at);
        info!(targets = targets.len(), "Starting probe cycle");

        let mut report = CycleReport { targets: targets.len(), ..CycleReport::default() };
        let mut probes = JoinSet::new();
        let mut in_flight: HashMap<task::Id, (Target, Instant)> = HashMap::new();

        for target in targets {
            // Admission happens in list order, so queued probes start FIFO
            let admission = match self.limiter.admit().await {
                Ok(admission) => admission,
                Err(e) => {
                    error!("Probe limiter closed, abandoning rest of cycle: {}", e);
                    break;
                }
            };

            let store = Arc::clone(&self.store);
            let prober = Arc::clone(&self.prober);
            let bus = Arc::clone(&self.bus);
            let timeout = self.probe_timeout;

            let tracked = target.clone();
            let handle = probes.spawn(async move {
                let outcome = prober.probe(target.id, &target.url, timeout).await;
                drop(admission);
                record_outcome(store.as_ref(), &bus, target, outcome).await
            });
            in_flight.insert(handle.id(), (tracked, Instant::now()));
        }

        while let Some(joined) = probes.join_next_with_id().await {
            match joined {
                Ok((id, success)) => {
                    in_flight.remove(&id);
                    if success {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    let Some((target, spawned)) = in_flight.remove(&e.id()) else {
                        error!("Probe task failed to complete: {}", e);
                        continue;
                    };
                    error!(target_id = %target.id, "Probe task failed to complete: {}", e);

                    // Observers still get exactly one result for this target
                    let elapsed_ms =
                        u64::try_from(spawned.elapsed().as_millis()).unwrap_or(u64::MAX);
                    let outcome = ProbeOutcome::failure(
                        target.id,
                        ProbeErrorKind::Other,
                        elapsed_ms,
                        "check aborted unexpectedly",
                    );
                    record_outcome(self.store.as_ref(), &self.bus, target, outcome).await;
                }
            }
        }

        let status = self.state.cycle_completed(Utc::now());
        self.bus.publish(&ServerEvent::interval_status(status));

        info!(
            targets = report.targets,
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
            "Probe cycle finished"
        );

        Ok(report)
    }
}

/// Persist an outcome and announce it. Returns whether the probe succeeded.
async fn record_outcome(
    store: &dyn TargetStore,
    bus: &EventBus,
    mut target: Target,
    outcome: ProbeOutcome,
) -> bool {
    let at = Utc::now();

    let target = match store.upsert_probe_result(&outcome, at).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            debug!(target_id = %target.id, "Target removed during cycle, result not stored");
            target.apply_outcome(&outcome, at);
            target
        }
        Err(e) => {
            error!(target_id = %target.id, "Failed to save probe result: {}", e);
            target.apply_outcome(&outcome, at);
            target
        }
    };

    let success = outcome.success;
    bus.publish(&ServerEvent::url_pinged(target, outcome));
    success
}
