// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide settings resolved once at startup from `AB_*` environment
//! variables (§3 "Config", ambient addition).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a data directory: set AB_DATA_DIR or HOME")]
    NoDataDir,
    #[error("invalid bind address {0:?}: {1}")]
    BadBindAddr(String, std::net::AddrParseError),
}

/// Resolve the root data directory: `AB_DATA_DIR` > `XDG_STATE_HOME/agent-broker`
/// > `~/.local/state/agent-broker`, mirroring the scaffold's `state_dir()`
/// resolution chain.
fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("AB_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("agent-broker"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoDataDir)?;
    Ok(PathBuf::from(home).join(".local/state/agent-broker"))
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_csv(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
}

/// Everything the daemon needs to construct its [`crate::state::AppState`]
/// (§3 "Config", ambient addition).
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub bind_addr: std::net::SocketAddr,
    pub bearer_token: Option<String>,
    pub environment: String,

    pub max_concurrent_sessions: usize,
    pub admission_timeout: Duration,

    pub pool_max_size: usize,
    pub pool_idle_ttl: Duration,
    pub pool_min_generic: usize,
    pub pool_maintenance_interval: Duration,

    pub agent_command: String,
    pub workspace_dir: PathBuf,
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Option<Vec<String>>,
    pub mcp_config_path: Option<PathBuf>,

    pub task_max_age_hours: u64,
    pub task_maintenance_interval: Duration,
}

impl Config {
    /// Load configuration from the environment (§3 "Config").
    ///
    /// `bearer_token` unset + `environment != "production"` is the only
    /// combination that bypasses auth (§6 "Authentication").
    pub fn load() -> Result<Self, ConfigError> {
        let data_dir = data_dir()?;
        let log_dir = std::env::var("AB_LOG_DIR").map(PathBuf::from).unwrap_or_else(|_| data_dir.join("logs"));
        let bind_addr_str = std::env::var("AB_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8900".to_string());
        let bind_addr = bind_addr_str.parse().map_err(|e| ConfigError::BadBindAddr(bind_addr_str.clone(), e))?;
        let workspace_dir = std::env::var("AB_WORKSPACE_DIR").map(PathBuf::from).unwrap_or_else(|_| data_dir.join("workspaces"));

        Ok(Self {
            bearer_token: std::env::var("AB_BEARER_TOKEN").ok().filter(|s| !s.is_empty()),
            environment: std::env::var("AB_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            max_concurrent_sessions: env_usize("AB_MAX_CONCURRENT_SESSIONS", 4),
            admission_timeout: Duration::from_millis(env_u64("AB_ADMISSION_TIMEOUT_MS", 5_000)),
            pool_max_size: env_usize("AB_POOL_MAX_SIZE", 8),
            pool_idle_ttl: Duration::from_secs(env_u64("AB_POOL_IDLE_TTL_SECS", 600)),
            pool_min_generic: env_usize("AB_POOL_MIN_GENERIC", 1),
            pool_maintenance_interval: Duration::from_secs(env_u64("AB_POOL_MAINTENANCE_INTERVAL_SECS", 60)),
            agent_command: std::env::var("AB_AGENT_COMMAND").unwrap_or_else(|_| "agent-cli".to_string()),
            allowed_tools: env_csv("AB_ALLOWED_TOOLS"),
            disallowed_tools: env_csv("AB_DISALLOWED_TOOLS"),
            mcp_config_path: std::env::var("AB_MCP_CONFIG_PATH").ok().map(PathBuf::from),
            task_max_age_hours: env_u64("AB_TASK_MAX_AGE_HOURS", 24),
            task_maintenance_interval: Duration::from_secs(env_u64("AB_TASK_MAINTENANCE_INTERVAL_SECS", 300)),
            log_dir,
            workspace_dir,
            data_dir,
        })
    }

    pub fn auth_required(&self) -> bool {
        self.bearer_token.is_some() || self.environment == "production"
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join("daemon.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
