// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable stand-in for the real agent CLI, used only by the
//! workspace's black-box end-to-end tests. Speaks the same
//! newline-delimited JSON protocol on stdin/stdout that
//! `SubprocessRunner` expects: it reads one `user` turn per line from
//! stdin and replies with a scripted sequence of raw agent messages
//! followed by a terminal `result` message.
//!
//! The script is read from the file named by `FAKE_AGENT_SCRIPT`. Its
//! shape is:
//!
//! ```json
//! {
//!   "turns": [
//!     {
//!       "events": [ { "type": "assistant", "content": [...] } ],
//!       "result": { "success": true, "output": "done" },
//!       "crash": false,
//!       "stderr": ""
//!     }
//!   ]
//! }
//! ```
//!
//! Turns beyond the scripted list fall back to a trivial successful
//! result so a pooled runner can be reused across multiple `execute()`
//! calls (interventions, follow-up prompts) without extra scripting.
//! With no `FAKE_AGENT_SCRIPT` set at all, the binary emits a minimal
//! session/assistant/result sequence so it still works as a smoke-test
//! default.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use serde_json::{json, Value};

struct Turn {
    events: Vec<Value>,
    result: Value,
    crash: bool,
    stderr: String,
    /// Pause before emitting `result`, giving a test a window to act on the
    /// task while it is still running (e.g. send an intervention).
    delay_before_result_ms: u64,
}

fn default_session_id() -> String {
    std::env::var("FAKE_AGENT_SESSION_ID").unwrap_or_else(|_| format!("fake-session-{}", std::process::id()))
}

fn load_script() -> Vec<Turn> {
    let Ok(path) = std::env::var("FAKE_AGENT_SCRIPT") else {
        return vec![default_turn()];
    };
    let contents = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fake-agent: cannot read script {path}: {e}"));
    let parsed: Value = serde_json::from_str(&contents).unwrap_or_else(|e| panic!("fake-agent: invalid script json: {e}"));
    let turns = parsed.get("turns").and_then(Value::as_array).cloned().unwrap_or_default();
    if turns.is_empty() {
        return vec![default_turn()];
    }
    turns
        .into_iter()
        .map(|t| Turn {
            events: t.get("events").and_then(Value::as_array).cloned().unwrap_or_default(),
            result: t.get("result").cloned().unwrap_or_else(|| json!({"success": true, "output": ""})),
            crash: t.get("crash").and_then(Value::as_bool).unwrap_or(false),
            stderr: t.get("stderr").and_then(Value::as_str).unwrap_or_default().to_string(),
            delay_before_result_ms: t.get("delay_before_result_ms").and_then(Value::as_u64).unwrap_or(0),
        })
        .collect()
}

fn default_turn() -> Turn {
    Turn {
        events: vec![json!({
            "type": "assistant",
            "content": [{"block_type": "text", "text": "working on it"}],
        })],
        result: json!({"success": true, "output": "done"}),
        crash: false,
        stderr: String::new(),
        delay_before_result_ms: 0,
    }
}

fn fallback_turn(session_id: &str) -> Turn {
    Turn {
        events: Vec::new(),
        result: json!({"success": true, "output": "ok", "session_id": session_id}),
        crash: false,
        stderr: String::new(),
        delay_before_result_ms: 0,
    }
}

fn main() -> ExitCode {
    let turns = load_script();
    let session_id = default_session_id();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut emit = |value: &Value| {
        let _ = writeln!(out, "{value}");
        let _ = out.flush();
    };

    emit(&json!({"type": "system", "session_id": session_id, "subtype": Value::Null}));

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut turn_index = 0usize;

    while let Some(Ok(_)) = lines.next() {
        let turn: Turn = match turns.get(turn_index) {
            Some(t) => Turn {
                events: t.events.clone(),
                result: t.result.clone(),
                crash: t.crash,
                stderr: t.stderr.clone(),
                delay_before_result_ms: t.delay_before_result_ms,
            },
            None => fallback_turn(&session_id),
        };

        for event in &turn.events {
            emit(event);
        }

        if turn.crash {
            if !turn.stderr.is_empty() {
                eprintln!("{}", turn.stderr);
            }
            return ExitCode::FAILURE;
        }

        if turn.delay_before_result_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(turn.delay_before_result_ms));
        }

        let mut result = turn.result.clone();
        if let Value::Object(map) = &mut result {
            map.entry("type").or_insert_with(|| json!("result"));
            map.entry("session_id").or_insert_with(|| json!(session_id));
        }
        emit(&result);

        turn_index += 1;
    }

    ExitCode::SUCCESS
}
