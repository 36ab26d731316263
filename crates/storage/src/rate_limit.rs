// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-profile rate-limit utilization tracking with auto-reset and
//! one-shot 95% alerts (§4.C).

use crate::atomic_write;
use ab_core::profile::{RateLimitType, RateLimitWindow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Raw notification as carried by `AgentRawEvent::RateLimit`.
#[derive(Debug, Clone)]
pub struct RateLimitNotification {
    pub rate_limit_type: String,
    pub utilization: Value,
    pub resets_at: Option<DateTime<Utc>>,
}

/// Emitted the first time a window crosses 95% utilization; carries the
/// full snapshot for the `credential_alert` SSE event (§6).
#[derive(Debug, Clone)]
pub struct CredentialAlert {
    pub active_profile: String,
    pub profiles: Vec<Value>,
}

/// Per-`(profile, limit_type)` window state, persisted as a single JSON
/// file (temp-file + rename; a corrupted file starts the tracker empty).
pub struct RateLimitTracker {
    path: PathBuf,
    state: Mutex<HashMap<String, HashMap<String, RateLimitWindow>>>,
}

type Snapshot = HashMap<String, HashMap<String, RateLimitWindow>>;

impl RateLimitTracker {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        let path = root.into().join("_rate_limits.json");
        let state = load(&path).unwrap_or_default();
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn persist(&self, state: &Snapshot) -> Result<(), RateLimitError> {
        let body = serde_json::to_vec_pretty(state)?;
        atomic_write(&self.path, &body)?;
        Ok(())
    }

    /// Consume a raw rate-limit notification. Mutates state only when
    /// `profile` is `Some` and `utilization` is numeric; returns an alert
    /// the first time this window crosses 95% since its last reset.
    pub fn record(&self, profile: Option<&str>, notif: RateLimitNotification) -> Option<CredentialAlert> {
        let profile = profile?;
        let utilization = notif.utilization.as_f64()?;
        let limit_type = RateLimitType::from_str(&notif.rate_limit_type).as_str().to_string();

        let mut state = self.state.lock();
        let windows = state.entry(profile.to_string()).or_default();
        let window = windows.entry(limit_type).or_insert_with(RateLimitWindow::fresh);

        if let Some(resets_at) = window.resets_at {
            if Utc::now() >= resets_at {
                *window = RateLimitWindow::fresh();
            }
        }

        window.utilization = utilization;
        window.resets_at = notif.resets_at;

        let alert = if utilization >= 0.95 && !window.alerted_95 {
            window.alerted_95 = true;
            Some(profile.to_string())
        } else {
            None
        };

        let snapshot = state.clone();
        drop(state);
        let _ = self.persist(&snapshot);

        alert.map(|active_profile| CredentialAlert {
            profiles: profiles_to_json(&snapshot),
            active_profile,
        })
    }

    /// Current status for one profile; known profiles with no record
    /// report `utilization: "unknown"`. Opportunistically auto-resets
    /// expired windows before returning.
    pub fn get_profile_status(&self, profile: &str) -> Value {
        let mut state = self.state.lock();
        self.auto_reset_locked(&mut state);
        profile_to_json(profile, state.get(profile))
    }

    pub fn get_all_profiles_status(&self) -> Value {
        let mut state = self.state.lock();
        self.auto_reset_locked(&mut state);
        Value::Object(
            state
                .iter()
                .map(|(name, _)| (name.clone(), profile_to_json(name, state.get(name))))
                .collect(),
        )
    }

    fn auto_reset_locked(&self, state: &mut Snapshot) {
        let now = Utc::now();
        let mut changed = false;
        for windows in state.values_mut() {
            for window in windows.values_mut() {
                if let Some(resets_at) = window.resets_at {
                    if now >= resets_at {
                        *window = RateLimitWindow::fresh();
                        changed = true;
                    }
                }
            }
        }
        if changed {
            let _ = self.persist(state);
        }
    }
}

fn profiles_to_json(state: &Snapshot) -> Vec<Value> {
    state
        .keys()
        .map(|name| profile_to_json(name, state.get(name)))
        .collect()
}

fn profile_to_json(name: &str, windows: Option<&HashMap<String, RateLimitWindow>>) -> Value {
    let windows_json = match windows {
        Some(w) if !w.is_empty() => serde_json::to_value(w).unwrap_or(Value::Null),
        _ => Value::String("unknown".to_string()),
    };
    serde_json::json!({ "profile": name, "windows": windows_json })
}

fn load(path: &std::path::Path) -> Option<Snapshot> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
