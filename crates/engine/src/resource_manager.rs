// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semaphore-backed admission control bounding concurrent agent runs
//! (§5 "Resource admission", ambient addition generalized from the
//! distilled spec's `ResourceManager`).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A held admission slot; the slot is released when this guard drops.
pub struct ResourceGuard(#[allow(dead_code)] OwnedSemaphorePermit);

#[derive(Debug, Clone, Copy)]
pub struct ResourceManagerStats {
    pub active_sessions: usize,
    pub max_concurrent: usize,
    pub available_slots: usize,
}

/// Caps the number of concurrently in-flight agent runs.
pub struct ResourceManager {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ResourceManager {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Non-blocking acquire; used by call sites that want to fail fast
    /// rather than queue.
    pub fn try_acquire(&self) -> Option<ResourceGuard> {
        self.semaphore.clone().try_acquire_owned().ok().map(ResourceGuard)
    }

    /// Blocking acquire bounded by `timeout`; used by the background
    /// worker so `start_execution` can fail the task with admission-denied
    /// rather than hang forever (§5 "Resource admission").
    pub async fn acquire(&self, timeout: Option<Duration>) -> Option<ResourceGuard> {
        let fut = self.semaphore.clone().acquire_owned();
        match timeout {
            Some(t) => tokio::time::timeout(t, fut).await.ok()?.ok().map(ResourceGuard),
            None => fut.await.ok().map(ResourceGuard),
        }
    }

    pub fn stats(&self) -> ResourceManagerStats {
        ResourceManagerStats {
            active_sessions: self.max_concurrent - self.semaphore.available_permits(),
            max_concurrent: self.max_concurrent,
            available_slots: self.semaphore.available_permits(),
        }
    }
}

#[cfg(test)]
#[path = "resource_manager_tests.rs"]
mod tests;
