mod hub;
mod ipc_server;
mod orchestrator;
mod registry;
mod session;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agentboard_core::config::{pid_path, socket_path, Settings};
use agentboard_core::worktree::WorktreeManager;

use hub::ClientHub;
use ipc_server::AppState;
use orchestrator::TaskOrchestrator;
use registry::SessionRegistry;

fn check_pid_file(pid_file: &PathBuf) -> Result<(), String> {
    if pid_file.exists() {
        let content = fs::read_to_string(pid_file).unwrap_or_default();
        if let Ok(pid) = content.trim().parse::<i32>() {
            // Check if the process is alive
            unsafe {
                if libc::kill(pid, 0) == 0 {
                    return Err(format!("Daemon already running (PID {pid})"));
                }
            }
        }
        // Stale PID file — clean up
        let _ = fs::remove_file(pid_file);
        let _ = fs::remove_file(socket_path());
    }
    Ok(())
}

fn write_pid_file(pid_file: &PathBuf) -> Result<(), String> {
    if let Some(parent) = pid_file.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create dir: {e}"))?;
    }
    fs::write(pid_file, format!("{}", process::id()))
        .map_err(|e| format!("Failed to write PID file: {e}"))
}

fn cleanup_files(pid_file: &PathBuf, socket_file: &PathBuf) {
    let _ = fs::remove_file(pid_file);
    let _ = fs::remove_file(socket_file);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("agentboardd: {e}");
            process::exit(1);
        }
    };

    let pid_file = pid_path();
    let socket_file = socket_path();

    if let Err(e) = check_pid_file(&pid_file) {
        error!("agentboardd: {e}");
        process::exit(1);
    }
    if let Err(e) = write_pid_file(&pid_file) {
        error!("agentboardd: {e}");
        process::exit(1);
    }

    // Clean up any stale socket
    let _ = fs::remove_file(&socket_file);

    let project_root = settings.project_root();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let state = AppState {
        registry: Arc::new(SessionRegistry::new(settings.clone())),
        orchestrator: Arc::new(TaskOrchestrator::new(WorktreeManager::new(
            project_root,
            settings.main_branch.clone(),
        ))),
        hub: Arc::new(Mutex::new(ClientHub::new())),
        shutdown_tx,
    };

    let server_state = state.clone();
    let server_socket = socket_file.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::run_server(server_socket, server_state).await {
            error!("IPC server error: {e}");
        }
    });

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register SIGTERM handler: {e}");
            process::exit(1);
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register SIGINT handler: {e}");
            process::exit(1);
        }
    };

    info!(
        pid = process::id(),
        socket = %socket_file.display(),
        "agentboardd started"
    );

    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("shutdown requested by client");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        }
    }

    info!("stopping sessions");
    state.registry.shutdown_all().await;

    server_handle.abort();
    cleanup_files(&pid_file, &socket_file);
    info!("agentboardd stopped");
}
