//! Admission ceiling for concurrently executing probes.
//!
//! Backed by a tokio semaphore, which hands out permits in the order
//! `acquire` was called, so waiting submissions are admitted FIFO.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounds in-flight probes to a fixed ceiling
#[derive(Debug, Clone)]
pub struct ProbeLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl ProbeLimiter {
    pub fn new(capacity: usize) -> Self {
        // A zero ceiling would never admit anything
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot. The slot is released when the returned
    /// `Admission` is dropped.
    pub async fn admit(&self) -> Result<Admission, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(Admission { _permit: permit, in_flight: self.in_flight.clone() })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of admitted tasks that have not released their slot yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Slot held by one executing probe
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
