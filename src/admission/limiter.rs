//! Global cap on in-flight commands.
//!
//! A permit is taken when a command is admitted and released when its
//! response body finishes or is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Limits concurrently executing commands. A limit of 0 means unlimited.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
    limit: usize,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Take a slot without waiting. `None` when the limit is reached.
    pub fn try_acquire(&self) -> Option<CommandPermit> {
        let permit = match &self.semaphore {
            Some(semaphore) => Some(semaphore.clone().try_acquire_owned().ok()?),
            None => None,
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(CommandPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Commands currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Slot held for the lifetime of one command.
#[derive(Debug)]
pub struct CommandPermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for CommandPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
