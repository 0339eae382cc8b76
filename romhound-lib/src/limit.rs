//! Bounded-concurrency token pool.
//!
//! Each bounded resource (media fetch+decode, per-provider request slots)
//! gets its own `Limiter`, sized independently of the worker count. The
//! permit releases on drop, so a token can't leak on early returns or
//! cancellation — the pool can never be starved permanently.

use std::sync::Arc;

use tokio::sync::{Semaphore, TryAcquireError};

/// A fixed-capacity token pool. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Limiter {
    sem: Arc<Semaphore>,
    capacity: usize,
}

/// A held token. Dropping it returns the token to the pool.
pub struct Permit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Limiter {
    /// Create a pool with `capacity` tokens. Capacities below 1 are clamped
    /// to 1 (a zero-capacity gate would deadlock every caller).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a token. The semaphore is never closed, so the only way out
    /// of the wait is a token (or the caller's own future being dropped).
    pub async fn acquire(&self) -> Permit {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore is never closed");
        Permit { _permit: permit }
    }

    /// Take a token only if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        match self.sem.clone().try_acquire_owned() {
            Ok(permit) => Some(Permit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently free. Primarily for tests and diagnostics.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
