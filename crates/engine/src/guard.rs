//! Exclusive, performance-scoped locking.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::errors::GuardError;

/// Guarantees that at most one run of a given performance id is active.
#[async_trait::async_trait]
pub trait PerformanceGuard: Send + Sync {
    /// Fails with [`GuardError::AlreadyStarted`] while `id` is held.
    async fn acquire_performance(&self, id: &str) -> Result<(), GuardError>;

    async fn release_performance(&self, id: &str) -> Result<(), GuardError>;
}

/// Process-local guard.
#[derive(Debug, Default)]
pub struct InMemoryPerformanceGuard {
    held: Mutex<HashSet<String>>,
    releases: AtomicUsize,
}

impl InMemoryPerformanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_held(&self, id: &str) -> bool {
        self.held.lock().await.contains(id)
    }

    /// Number of successful releases so far.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl PerformanceGuard for InMemoryPerformanceGuard {
    async fn acquire_performance(&self, id: &str) -> Result<(), GuardError> {
        if self.held.lock().await.insert(id.to_string()) {
            Ok(())
        } else {
            Err(GuardError::AlreadyStarted { id: id.to_string() })
        }
    }

    async fn release_performance(&self, id: &str) -> Result<(), GuardError> {
        if self.held.lock().await.remove(id) {
            self.releases.fetch_add(1, Ordering::AcqRel);
            Ok(())
        } else {
            Err(GuardError::NotHeld { id: id.to_string() })
        }
    }
}
