// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence for task records (§4.F, §6 persisted layout).
//!
//! A single JSON file, `{data_dir}/tasks.json`, written atomically.
//! Debouncing the save and the restart-time RUNNING→ERROR fixup are owned
//! by the task manager in `ab-engine`; this type is pure file I/O.

use ab_core::task::PersistedTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct TasksFile {
    tasks: std::collections::HashMap<String, PersistedTask>,
    last_saved: DateTime<Utc>,
}

pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { path: root.into().join("tasks.json") }
    }

    /// Load every persisted task record. A missing file is an empty set;
    /// a corrupted file is reported as an error rather than silently
    /// discarding whatever was on disk (unlike the rate-limit/profile
    /// stores, losing task state silently would hide in-flight work).
    pub fn load(&self) -> Result<Vec<PersistedTask>, TaskStoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let file: TasksFile = serde_json::from_slice(&bytes)?;
        Ok(file.tasks.into_values().collect())
    }

    pub fn save(&self, tasks: &[PersistedTask]) -> Result<(), TaskStoreError> {
        let file = TasksFile {
            tasks: tasks
                .iter()
                .map(|t| (format!("{}:{}", t.client_id, t.request_id), t.clone()))
                .collect(),
            last_saved: Utc::now(),
        };
        let body = serde_json::to_vec_pretty(&file)?;
        crate::atomic_write(&self.path, &body)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_store_tests.rs"]
mod tests;
