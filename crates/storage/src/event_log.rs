// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only per-session event log (§4.A).
//!
//! Records are newline-delimited JSON, one per line, rooted at
//! `{data_dir}/events/<sanitized-client>/<sanitized-request>.jsonl` (§6).
//! IDs are a per-session monotonic counter starting at 1; on first touch
//! of a session the store scans the existing file once to recover the
//! last-assigned id, then caches it alongside the per-session write lock.

use ab_core::{Event, EventRecord};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("invalid session id: {0}")]
    InvalidId(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Metadata about a persisted session, as returned by [`EventLog::list_sessions`].
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub client_id: String,
    pub request_id: String,
    pub event_count: u64,
    pub last_event_type: Option<String>,
}

struct SessionLock {
    last_id: u64,
}

/// Append-only per-session event store with monotonic ids.
pub struct EventLog {
    root: PathBuf,
    sessions: Mutex<HashMap<(String, String), Arc<Mutex<SessionLock>>>>,
}

fn sanitize_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w.\-]").expect("static regex"))
}

/// Sanitize a path component per §4.A: non-`[\w.\-]` becomes `_`, and a
/// result that is exactly `.` or `..` (which would otherwise resolve to a
/// directory traversal once joined onto the root) is rejected outright.
fn sanitize_component(raw: &str) -> Result<String, EventLogError> {
    if raw.is_empty() {
        return Err(EventLogError::InvalidId(raw.to_string()));
    }
    let sanitized = sanitize_re().replace_all(raw, "_").into_owned();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(EventLogError::InvalidId(raw.to_string()));
    }
    Ok(sanitized)
}

impl EventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session_path(&self, client_id: &str, request_id: &str) -> Result<PathBuf, EventLogError> {
        let client = sanitize_component(client_id)?;
        let request = sanitize_component(request_id)?;
        let path = self.root.join("events").join(client).join(format!("{request}.jsonl"));
        // Path safety: the resolved path must remain within the configured
        // root even after sanitization (belt-and-suspenders against any
        // future relaxation of `sanitize_component`).
        if !path.starts_with(&self.root) {
            return Err(EventLogError::InvalidId(format!("{client_id}/{request_id}")));
        }
        Ok(path)
    }

    fn lock_for(&self, client_id: &str, request_id: &str) -> Result<(PathBuf, Arc<Mutex<SessionLock>>), EventLogError> {
        let path = self.session_path(client_id, request_id)?;
        let key = (client_id.to_string(), request_id.to_string());
        let mut sessions = self.sessions.lock();
        if let Some(lock) = sessions.get(&key) {
            return Ok((path, lock.clone()));
        }
        let last_id = recover_last_id(&path)?;
        let lock = Arc::new(Mutex::new(SessionLock { last_id }));
        sessions.insert(key, lock.clone());
        Ok((path, lock))
    }

    /// Allocate the next id, append the record, and return the assigned id.
    pub fn append(&self, client_id: &str, request_id: &str, event: Event) -> Result<u64, EventLogError> {
        let (path, lock) = self.lock_for(client_id, request_id)?;
        let mut guard = lock.lock();
        let id = guard.last_id + 1;
        let record = EventRecord { id, event };
        let line = serde_json::to_string(&record)?;

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        file.flush()?;

        guard.last_id = id;
        Ok(id)
    }

    pub fn read_all(&self, client_id: &str, request_id: &str) -> Result<Vec<EventRecord>, EventLogError> {
        self.read_since(client_id, request_id, 0)
    }

    pub fn read_since(&self, client_id: &str, request_id: &str, after_id: u64) -> Result<Vec<EventRecord>, EventLogError> {
        let path = self.session_path(client_id, request_id)?;
        read_records(&path)
            .map(|records| records.into_iter().filter(|r| r.id > after_id).collect())
    }

    /// Drop the in-memory counter/lock for a session. Does not touch disk.
    pub fn cleanup_session(&self, client_id: &str, request_id: &str) {
        let key = (client_id.to_string(), request_id.to_string());
        self.sessions.lock().remove(&key);
    }

    /// Drop the in-memory state and remove the backing file.
    pub fn delete_session(&self, client_id: &str, request_id: &str) -> Result<(), EventLogError> {
        let path = self.session_path(client_id, request_id)?;
        self.cleanup_session(client_id, request_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate every persisted session under the events root.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, EventLogError> {
        let events_root = self.root.join("events");
        let mut out = Vec::new();
        if !events_root.is_dir() {
            return Ok(out);
        }
        for client_entry in std::fs::read_dir(&events_root)? {
            let client_entry = client_entry?;
            if !client_entry.file_type()?.is_dir() {
                continue;
            }
            let client_id = client_entry.file_name().to_string_lossy().into_owned();
            for file_entry in std::fs::read_dir(client_entry.path())? {
                let file_entry = file_entry?;
                let path = file_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let request_id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let records = read_records(&path)?;
                out.push(SessionSummary {
                    client_id: client_id.clone(),
                    request_id,
                    event_count: records.len() as u64,
                    last_event_type: records.last().map(|r| r.event.type_name().to_string()),
                });
            }
        }
        Ok(out)
    }
}

/// Read every well-formed record from `path` in file order; missing files
/// are treated as empty, corrupted lines are logged and skipped.
fn read_records(path: &Path) -> Result<Vec<EventRecord>, EventLogError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(&line) {
            Ok(record) => out.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping corrupted event record");
            }
        }
    }
    Ok(out)
}

fn recover_last_id(path: &Path) -> Result<u64, EventLogError> {
    Ok(read_records(path)?.into_iter().map(|r| r.id).max().unwrap_or(0))
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
