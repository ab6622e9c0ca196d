mod actor;
mod attendance;
mod backup;
mod db;
mod grading;
mod ipc;
mod models;
mod records;
mod transcript;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries only IPC responses.
fn init_tracing() {
    let filter = std::env::var("CAMPUSD_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "campusd starting");

    let mut state = ipc::AppState::default();
    if let Some(ws) = std::env::var_os("CAMPUSD_WORKSPACE").filter(|v| !v.is_empty()) {
        if let Err(e) = ipc::open_workspace(&mut state, PathBuf::from(ws)) {
            error!(error = %format!("{e:#}"), "failed to open CAMPUSD_WORKSPACE");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No usable id to echo back.
            Err(e) => ipc::err("", "bad_json", e.to_string(), None),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, exiting");
}
