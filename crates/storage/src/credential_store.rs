// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named credential profiles on disk and the active-profile pointer (§4.B).
//!
//! Layout: `{root}/profiles/<name>.json`, `{root}/_active.txt`. Both the
//! profile blobs and the pointer are written atomically.

use crate::atomic_write;
use ab_core::ProfileMetadata;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid profile name: {0}")]
    InvalidName(String),
    #[error("profile not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("static regex"))
}

fn validate_name(name: &str) -> Result<(), CredentialError> {
    if !name_re().is_match(name) || name.starts_with('_') {
        return Err(CredentialError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Named OAuth credential profiles on disk with exactly one active pointer.
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.json"))
    }

    fn active_pointer_path(&self) -> PathBuf {
        self.root.join("_active.txt")
    }

    pub fn save(&self, name: &str, blob: &Value) -> Result<(), CredentialError> {
        validate_name(name)?;
        let body = serde_json::to_vec_pretty(blob)?;
        atomic_write(&self.profile_path(name), &body)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value, CredentialError> {
        validate_name(name)?;
        let path = self.profile_path(name);
        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CredentialError::NotFound(name.to_string())
            } else {
                CredentialError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn delete(&self, name: &str) -> Result<(), CredentialError> {
        validate_name(name)?;
        match std::fs::remove_file(self.profile_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CredentialError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        if self.get_active()?.as_deref() == Some(name) {
            self.clear_active()?;
        }
        Ok(())
    }

    pub fn set_active(&self, name: &str) -> Result<(), CredentialError> {
        validate_name(name)?;
        if !self.profile_path(name).exists() {
            return Err(CredentialError::NotFound(name.to_string()));
        }
        atomic_write(&self.active_pointer_path(), name.as_bytes())?;
        Ok(())
    }

    fn clear_active(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(self.active_pointer_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the active profile's name, auto-clearing the pointer if it
    /// refers to a profile that no longer exists.
    pub fn get_active(&self) -> Result<Option<String>, CredentialError> {
        let pointer_path = self.active_pointer_path();
        let name = match std::fs::read_to_string(&pointer_path) {
            Ok(s) => s.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if name.is_empty() || !self.profile_path(&name).exists() {
            self.clear_active()?;
            return Ok(None);
        }
        Ok(Some(name))
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileMetadata>, CredentialError> {
        let dir = self.profiles_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let active = self.get_active()?;
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let blob: Value = match std::fs::read(&path).ok().and_then(|b| serde_json::from_slice(&b).ok()) {
                Some(v) => v,
                None => continue,
            };
            let saved_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            out.push(ProfileMetadata {
                is_active: active.as_deref() == Some(name.as_str()),
                name,
                saved_at,
                subscription_type: blob
                    .get("subscriptionType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                rate_limit_tier: blob
                    .get("rateLimitTier")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                expires_at: blob.get("expiresAt").and_then(|v| v.as_str()).map(str::to_string),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Path to the backing OS-level credentials file this store's swap
    /// operations read from / write to (§4.B swapper operations).
    pub fn credentials_file_path(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    fn backup_path(&self) -> PathBuf {
        self.root.join("_backup.json")
    }

    /// Read the current OS-level credentials file and store it as a new
    /// named profile, marking it active.
    pub fn save_current_as(&self, name: &str) -> Result<(), CredentialError> {
        validate_name(name)?;
        let bytes = std::fs::read(self.credentials_file_path())?;
        let blob: Value = serde_json::from_slice(&bytes)?;
        self.save(name, &blob)?;
        self.set_active(name)?;
        Ok(())
    }

    /// Back up the current credentials file then atomically replace it
    /// with profile `name`'s contents. Any failure before the final
    /// rename leaves the credentials file untouched.
    pub fn activate(&self, name: &str) -> Result<(), CredentialError> {
        validate_name(name)?;
        let blob = self.get(name)?;
        let creds_path = self.credentials_file_path();
        if let Ok(current) = std::fs::read(&creds_path) {
            atomic_write(&self.backup_path(), &current)?;
        }
        let body = serde_json::to_vec_pretty(&blob)?;
        atomic_write(&creds_path, &body)?;
        self.set_active(name)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "credential_store_tests.rs"]
mod tests;
