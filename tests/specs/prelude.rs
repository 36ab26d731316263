//! Test harness for the black-box daemon specifications: spawns the real
//! `abd` binary against a scripted `fake-agent` subprocess and exposes a
//! small HTTP client for the scenarios to drive.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;

pub const SPEC_WAIT_MAX_MS: u64 = 5_000;
pub const SPEC_POLL_INTERVAL_MS: u64 = 20;

/// Poll `condition` until it returns true or `timeout_ms` elapses.
pub fn wait_for<F: FnMut() -> bool>(timeout_ms: u64, mut condition: F) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS));
    }
    false
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port").local_addr().expect("local addr").port()
}

/// One scripted agent turn, matching `fake-agent`'s `FAKE_AGENT_SCRIPT`
/// file shape.
pub struct ScriptedTurn {
    pub events: Vec<Value>,
    pub result: Value,
    pub delay_before_result_ms: u64,
}

impl ScriptedTurn {
    pub fn complete(output: &str) -> Self {
        Self {
            events: Vec::new(),
            result: serde_json::json!({"success": true, "output": output}),
            delay_before_result_ms: 0,
        }
    }

    /// Pause before emitting the result, so a test has a window to act on
    /// the task (e.g. send an intervention) while it is still running.
    pub fn with_delay_before_result(mut self, ms: u64) -> Self {
        self.delay_before_result_ms = ms;
        self
    }
}

fn write_script(dir: &std::path::Path, turns: Vec<ScriptedTurn>) -> PathBuf {
    let body = serde_json::json!({
        "turns": turns.into_iter().map(|t| serde_json::json!({
            "events": t.events,
            "result": t.result,
            "delay_before_result_ms": t.delay_before_result_ms,
        })).collect::<Vec<_>>(),
    });
    let path = dir.join("fake-agent-script.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
    path
}

/// A running `abd` instance for one test, torn down on drop.
pub struct Daemon {
    child: Child,
    pub base_url: String,
    _data_dir: tempfile::TempDir,
    _script_dir: tempfile::TempDir,
}

pub struct DaemonBuilder {
    bearer_token: Option<String>,
    turns: Vec<ScriptedTurn>,
    pool_max_size: Option<usize>,
    pool_min_generic: Option<usize>,
    session_id: Option<String>,
    admission_timeout_ms: Option<u64>,
}

impl DaemonBuilder {
    fn new() -> Self {
        Self {
            bearer_token: None,
            turns: vec![ScriptedTurn::complete("done")],
            pool_max_size: None,
            pool_min_generic: None,
            session_id: None,
            admission_timeout_ms: None,
        }
    }

    pub fn bearer_token(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }

    pub fn turns(mut self, turns: Vec<ScriptedTurn>) -> Self {
        self.turns = turns;
        self
    }

    pub fn pool_max_size(mut self, n: usize) -> Self {
        self.pool_max_size = Some(n);
        self
    }

    pub fn pool_min_generic(mut self, n: usize) -> Self {
        self.pool_min_generic = Some(n);
        self
    }

    /// Pin the scripted agent's session id so a test can address it via
    /// `/sessions/{id}/intervene` before the run completes.
    pub fn session_id(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }

    pub fn admission_timeout_ms(mut self, ms: u64) -> Self {
        self.admission_timeout_ms = Some(ms);
        self
    }

    pub fn spawn(self) -> Daemon {
        let data_dir = tempfile::tempdir().unwrap();
        let script_dir = tempfile::tempdir().unwrap();
        let script_path = write_script(script_dir.path(), self.turns);

        let port = free_port();
        let bind_addr = format!("127.0.0.1:{port}");
        let fake_agent = assert_cmd::cargo::cargo_bin("fake-agent");
        let abd = assert_cmd::cargo::cargo_bin("abd");

        let mut cmd = Command::new(abd);
        cmd.env("AB_DATA_DIR", data_dir.path())
            .env("AB_BIND_ADDR", &bind_addr)
            .env("AB_ENVIRONMENT", "test")
            .env("AB_AGENT_COMMAND", fake_agent.to_string_lossy().to_string())
            .env("FAKE_AGENT_SCRIPT", &script_path)
            .env("AB_POOL_MAINTENANCE_INTERVAL_SECS", "3600")
            .env("AB_ADMISSION_TIMEOUT_MS", self.admission_timeout_ms.unwrap_or(500).to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(token) = &self.bearer_token {
            cmd.env("AB_BEARER_TOKEN", token);
        }
        if let Some(n) = self.pool_max_size {
            cmd.env("AB_POOL_MAX_SIZE", n.to_string());
        }
        if let Some(n) = self.pool_min_generic {
            cmd.env("AB_POOL_MIN_GENERIC", n.to_string());
        }
        if let Some(id) = &self.session_id {
            cmd.env("FAKE_AGENT_SESSION_ID", id);
        }

        let mut child = cmd.spawn().expect("spawn abd");

        let stdout = child.stdout.take().expect("piped stdout");
        let mut reader = BufReader::new(stdout);
        let ready = wait_for(SPEC_WAIT_MAX_MS, || {
            let mut line = String::new();
            matches!(reader.read_line(&mut line), Ok(n) if n > 0 && line.trim() == "READY")
        });
        assert!(ready, "abd did not print READY within {SPEC_WAIT_MAX_MS}ms");

        Daemon {
            child,
            base_url: format!("http://{bind_addr}"),
            _data_dir: data_dir,
            _script_dir: script_dir,
        }
    }
}

impl Daemon {
    pub fn builder() -> DaemonBuilder {
        DaemonBuilder::new()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Parse one SSE frame body (`event: x\ndata: {...}\n\n`) into `(event, json)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, Value)> {
    parse_sse_with_ids(body).into_iter().map(|(_, event, data)| (event, data)).collect()
}

/// Same as [`parse_sse`] but keeps each frame's `id:` line, when present, so
/// a scenario can pick a `Last-Event-ID` cutoff partway through a run.
pub fn parse_sse_with_ids(body: &str) -> Vec<(Option<u64>, String, Value)> {
    let mut out = Vec::new();
    for frame in body.split("\n\n") {
        let mut id = None;
        let mut event = None;
        let mut data = None;
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("id: ") {
                id = rest.parse::<u64>().ok();
            } else if let Some(rest) = line.strip_prefix("event: ") {
                event = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("data: ") {
                data = Some(rest.to_string());
            }
        }
        if let (Some(event), Some(data)) = (event, data) {
            if let Ok(value) = serde_json::from_str::<Value>(&data) {
                out.push((id, event, value));
            }
        }
    }
    out
}
