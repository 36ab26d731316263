// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable on-disk storage for the agent execution broker: the append-only
//! event log (§4.A), the credential profile store (§4.B), the per-profile
//! rate-limit tracker (§4.C), and task-record persistence (§4.F, persisted
//! layout in §6).

mod credential_store;
mod event_log;
mod rate_limit;
mod task_store;

pub use credential_store::{CredentialError, CredentialStore};
pub use event_log::{EventLog, EventLogError, SessionSummary};
pub use rate_limit::{CredentialAlert, RateLimitNotification, RateLimitTracker};
pub use task_store::{TaskStore, TaskStoreError};

use std::path::{Path, PathBuf};

/// Atomically write `contents` to `path`: write to a sibling temp file,
/// then rename over the destination. Every persistence layer in this crate
/// uses this so a crash mid-write never leaves a partially-written file
/// (§4.B "atomic credential swap", §4.F "temp-file-then-rename").
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp = tmp_path(path);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    path.with_file_name(format!(".{}.tmp", file_name))
}
