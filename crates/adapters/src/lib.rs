// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for the one external collaborator the core treats as a
//! black box: the agent subprocess (§4.G). `Runner` is the pool-held
//! handle to a connected agent; `AgentAdapter` is the factory that
//! spawns one and speaks its newline-JSON duplex protocol.

mod agent;

pub use agent::{
    AgentAdapter, AgentAdapterError, AgentSpawnConfig, InterventionSource, Runner,
    SubprocessAgentAdapter,
};

#[cfg(any(test, feature = "test-support"))]
pub use agent::{FakeAgentAdapter, FakeRunner, ScriptedRun};
