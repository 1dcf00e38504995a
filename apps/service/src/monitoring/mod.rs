/// Probe scheduler core
///
/// - `prober`: one HTTP GET per target with a hard deadline
/// - `limiter`: FIFO cap on concurrently executing probes
/// - `cycle`: one sweep over the target list
/// - `scheduler`: the fixed-cadence timer that triggers sweeps
/// - `state`: scheduling snapshot shared with the event bus and the API
pub mod cycle;
pub mod limiter;
pub mod prober;
pub mod scheduler;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

pub use cycle::{CycleError, CycleReport, CycleRunner};
pub use limiter::{Admission, ProbeLimiter};
pub use prober::{HttpProber, Prober};
pub use scheduler::Scheduler;
pub use state::{CycleSnapshot, CycleState};
pub use types::{ProbeErrorKind, ProbeOutcome};
