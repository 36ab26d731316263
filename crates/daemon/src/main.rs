// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point: `--version`/`--help`, config load, lock acquisition,
//! logging setup, router startup, signal-driven graceful shutdown —
//! the same shape as the scaffold's own daemon `main.rs`.

use std::sync::Arc;

use ab_adapters::SubprocessAgentAdapter;
use ab_daemon::config::Config;
use ab_daemon::http::build_router;
use ab_daemon::logging::setup_logging;
use ab_daemon::state::AppState;
use fs2::FileExt;
use tracing::{error, info};

fn print_help() {
    println!("abd {}", env!("CARGO_PKG_VERSION"));
    println!("Agent execution broker daemon.");
    println!();
    println!("USAGE:");
    println!("    abd [--version] [--help]");
    println!();
    println!("Configuration is read entirely from AB_* environment variables.");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("abd {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let lock_file = match acquire_lock(&config) {
        Ok(f) => f,
        Err(LockError::AlreadyRunning) => {
            eprintln!("abd is already running (lock held at {})", config.lock_path().display());
            std::process::exit(1);
        }
        Err(LockError::Io(e)) => {
            eprintln!("failed to acquire daemon lock: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = match setup_logging(&config) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("failed to set up logging: {e}");
            std::process::exit(1);
        }
    };

    info!(bind_addr = %config.bind_addr, environment = %config.environment, "starting abd");

    let state = match AppState::build(config.clone(), Arc::new(SubprocessAgentAdapter)) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to build application state: {e}");
            std::process::exit(1);
        }
    };
    state.start_background_tasks();

    let app = build_router(state.clone());
    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %config.bind_addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    println!("READY");
    info!(addr = %config.bind_addr, "listening");

    let shutdown_state = state.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal());
    if let Err(e) = server.await {
        error!("server error: {e}");
    }

    info!("shutting down");
    shutdown_state.shutdown().await;
    drop(lock_file);
    info!("shutdown complete");
}

enum LockError {
    AlreadyRunning,
    Io(std::io::Error),
}

impl From<std::io::Error> for LockError {
    fn from(e: std::io::Error) -> Self {
        LockError::Io(e)
    }
}

fn acquire_lock(config: &Config) -> Result<std::fs::File, LockError> {
    if let Some(parent) = config.lock_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(config.lock_path())?;
    if file.try_lock_exclusive().is_err() {
        return Err(LockError::AlreadyRunning);
    }
    use std::io::Write;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Wait for SIGTERM or SIGINT (ctrl-c), whichever comes first.
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
    }
}
