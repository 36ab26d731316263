// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The runner pool (§4.D): warm, reusable agent clients split into a
//! session-affine sub-pool (keyed by `agent_session_id`, LRU-ordered) and a
//! generic FIFO sub-pool, with TTL reaping, liveness checks and
//! min-generic replenishment driven by a periodic maintenance task.
//!
//! Per §9's open-question decision, this pool is the single source of
//! truth for runner lifecycle: a runner is either pooled-idle in exactly
//! one sub-pool, or checked out and owned exclusively by one in-flight
//! `EngineAdapter::execute` call. There is no separate registry.

use ab_adapters::{AgentAdapter, AgentAdapterError, AgentSpawnConfig, Runner};
use ab_core::AgentSessionId;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RunnerPoolError {
    #[error("spawn failed: {0}")]
    Spawn(#[from] AgentAdapterError),
}

struct PooledRunner {
    runner: Box<dyn Runner>,
    idle_since: Instant,
}

#[derive(Default)]
struct PoolInner {
    session: IndexMap<AgentSessionId, PooledRunner>,
    generic: VecDeque<PooledRunner>,
}

impl PoolInner {
    fn total(&self) -> usize {
        self.session.len() + self.generic.len()
    }

    /// Remove and return the least-recently-used entry: the oldest session
    /// entry if any exist, else the front of the generic FIFO (§4.D).
    fn pop_lru(&mut self) -> Option<Box<dyn Runner>> {
        if !self.session.is_empty() {
            self.session.shift_remove_index(0).map(|(_, p)| p.runner)
        } else {
            self.generic.pop_front().map(|p| p.runner)
        }
    }
}

/// Snapshot of pool counters (§4.D "Statistics").
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerPoolStats {
    pub session_count: usize,
    pub generic_count: usize,
    pub total: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Warm agent-client pool serving session-affine and generic acquires.
pub struct RunnerPool {
    factory: Arc<dyn AgentAdapter>,
    inner: parking_lot::Mutex<PoolInner>,
    max_size: usize,
    idle_ttl: Duration,
    min_generic: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    maintenance: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RunnerPool {
    pub fn new(factory: Arc<dyn AgentAdapter>, max_size: usize, idle_ttl: Duration, min_generic: usize) -> Arc<Self> {
        Arc::new(Self {
            factory,
            inner: parking_lot::Mutex::new(PoolInner::default()),
            max_size,
            idle_ttl,
            min_generic,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            maintenance: parking_lot::Mutex::new(None),
        })
    }

    fn expired(&self, pooled: &PooledRunner) -> bool {
        pooled.idle_since.elapsed() >= self.idle_ttl
    }

    /// §4.D `acquire(session_id?)`.
    pub async fn acquire(
        &self,
        session_id: Option<&AgentSessionId>,
        spawn_config: AgentSpawnConfig,
    ) -> Result<Box<dyn Runner>, RunnerPoolError> {
        if let Some(sid) = session_id {
            let hit = {
                let mut inner = self.inner.lock();
                match inner.session.get(sid) {
                    Some(pooled) if !self.expired(pooled) && pooled.runner.options_fingerprint() == spawn_config.options_fingerprint => {
                        inner.session.shift_remove(sid).map(|p| p.runner)
                    }
                    _ => None,
                }
            };
            if let Some(runner) = hit {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(runner);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            // A stale/fingerprint-mismatched entry for this session must
            // still be evicted so it doesn't linger forever.
            let stale = {
                let mut inner = self.inner.lock();
                inner.session.shift_remove(sid).map(|p| p.runner)
            };
            if let Some(mut runner) = stale {
                runner.kill().await;
            }
        }

        loop {
            let candidate = {
                let mut inner = self.inner.lock();
                inner.generic.pop_front()
            };
            match candidate {
                None => break,
                Some(pooled) if self.expired(&pooled) => {
                    let mut runner = pooled.runner;
                    runner.kill().await;
                }
                Some(pooled) => return Ok(pooled.runner),
            }
        }

        let evicted = {
            let mut inner = self.inner.lock();
            if inner.total() >= self.max_size {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                inner.pop_lru()
            } else {
                None
            }
        };
        if let Some(mut runner) = evicted {
            runner.kill().await;
        }

        Ok(self.factory.spawn(spawn_config).await?)
    }

    /// §4.D `release(runner, session_id?)`.
    pub async fn release(&self, runner: Box<dyn Runner>, session_id: Option<AgentSessionId>) {
        let mut to_discard: Vec<Box<dyn Runner>> = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.total() >= self.max_size {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                if let Some(r) = inner.pop_lru() {
                    to_discard.push(r);
                }
            }
            match session_id {
                Some(sid) => {
                    if let Some(old) = inner.session.shift_remove(&sid) {
                        if old.runner.runner_id() != runner.runner_id() {
                            to_discard.push(old.runner);
                        }
                    }
                    inner.session.insert(sid, PooledRunner { runner, idle_since: Instant::now() });
                }
                None => {
                    inner.generic.push_back(PooledRunner { runner, idle_since: Instant::now() });
                }
            }
        }
        for mut r in to_discard {
            r.kill().await;
        }
    }

    /// Discard a runner without returning it to the pool (§4.E.6 failure
    /// path; §9 "Resource coupling").
    pub async fn discard(&self, mut runner: Box<dyn Runner>) {
        runner.kill().await;
    }

    /// §4.D `pre_warm(n)`: best-effort, returns the count actually warmed.
    pub async fn pre_warm(&self, n: usize, spawn_config: &AgentSpawnConfig) -> usize {
        let mut warmed = 0;
        for _ in 0..n {
            match self.factory.spawn(spawn_config.clone()).await {
                Ok(runner) => {
                    let evicted = {
                        let mut inner = self.inner.lock();
                        if inner.total() >= self.max_size {
                            self.evictions.fetch_add(1, Ordering::Relaxed);
                            inner.pop_lru()
                        } else {
                            None
                        }
                    };
                    if let Some(mut r) = evicted {
                        r.kill().await;
                    }
                    self.inner.lock().generic.push_back(PooledRunner { runner, idle_since: Instant::now() });
                    warmed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pre-warm: failed to spawn runner, skipping");
                }
            }
        }
        warmed
    }

    /// One pass of the maintenance loop (§4.D "Maintenance loop"): reap
    /// TTL-expired or dead entries, then replenish the generic pool if it
    /// has fallen below `min_generic`.
    pub async fn run_maintenance_once(&self, spawn_config: &AgentSpawnConfig) {
        let (session_entries, generic_entries) = {
            let mut inner = self.inner.lock();
            (std::mem::take(&mut inner.session), std::mem::take(&mut inner.generic))
        };

        let mut kept_session = IndexMap::new();
        for (sid, pooled) in session_entries {
            if self.expired(&pooled) || !pooled.runner.is_cli_alive().await {
                let mut r = pooled.runner;
                r.kill().await;
            } else {
                kept_session.insert(sid, pooled);
            }
        }

        let mut kept_generic = VecDeque::new();
        for pooled in generic_entries {
            if self.expired(&pooled) || !pooled.runner.is_cli_alive().await {
                let mut r = pooled.runner;
                r.kill().await;
            } else {
                kept_generic.push_back(pooled);
            }
        }

        {
            let mut inner = self.inner.lock();
            inner.session = kept_session;
            inner.generic = kept_generic;
        }

        let current_generic = self.inner.lock().generic.len();
        if current_generic < self.min_generic {
            self.pre_warm(self.min_generic - current_generic, spawn_config).await;
        }
    }

    /// Spawn the periodic maintenance task. Only one may be active at a
    /// time; a prior task is aborted first.
    pub fn start_maintenance(self: &Arc<Self>, interval: Duration, spawn_config: AgentSpawnConfig) {
        self.stop_maintenance();
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                pool.run_maintenance_once(&spawn_config).await;
            }
        });
        *self.maintenance.lock() = Some(handle);
    }

    fn stop_maintenance(&self) {
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
    }

    /// §4.D `shutdown()`: cancel maintenance, discard every pooled runner,
    /// return the count of successful disconnects.
    pub async fn shutdown(&self) -> usize {
        self.stop_maintenance();
        let (session_entries, generic_entries) = {
            let mut inner = self.inner.lock();
            (std::mem::take(&mut inner.session), std::mem::take(&mut inner.generic))
        };
        let mut count = 0;
        for (_, pooled) in session_entries {
            let mut r = pooled.runner;
            r.kill().await;
            count += 1;
        }
        for pooled in generic_entries {
            let mut r = pooled.runner;
            r.kill().await;
            count += 1;
        }
        count
    }

    pub fn stats(&self) -> RunnerPoolStats {
        let inner = self.inner.lock();
        RunnerPoolStats {
            session_count: inner.session.len(),
            generic_count: inner.generic.len(),
            total: inner.total(),
            max_size: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RunnerPool {
    fn drop(&mut self) {
        self.stop_maintenance();
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
