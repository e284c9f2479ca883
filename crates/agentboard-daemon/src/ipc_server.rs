//! Unix socket server.
//!
//! One tokio task per client: a read loop that handles requests in order
//! and a write loop that drains the client's event channel to the socket.
//! Clients are independent, so one client waiting out a session warm-up
//! never stalls another.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use agentboard_core::ipc::MAX_FRAME_SIZE;
use agentboard_core::protocol::{ClientRequest, DaemonEvent};
use agentboard_core::task::TaskStatus;

use crate::hub::ClientHub;
use crate::orchestrator::TaskOrchestrator;
use crate::registry::SessionRegistry;

/// Everything a client handler needs, shared across connections.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub hub: Arc<Mutex<ClientHub>>,
    pub shutdown_tx: mpsc::Sender<()>,
}

impl AppState {
    fn broadcast(&self, event: &DaemonEvent) {
        if let Ok(mut hub) = self.hub.lock() {
            hub.broadcast(event);
        }
    }
}

/// Read a length-delimited frame asynchronously.
async fn read_frame_async(
    reader: &mut (impl AsyncReadExt + Unpin),
) -> Result<Vec<u8>, std::io::Error> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: {len}"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write a length-delimited frame asynchronously.
async fn write_frame_async(
    writer: &mut (impl AsyncWriteExt + Unpin),
    payload: &[u8],
) -> Result<(), std::io::Error> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Accept connections forever; each client gets its own handler task.
pub async fn run_server(
    socket_path: PathBuf,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "IPC server listening");

    let mut next_client_id: usize = 1;
    loop {
        let (stream, _addr) = listener.accept().await?;
        let client_id = next_client_id;
        next_client_id += 1;
        let state = state.clone();
        tokio::spawn(async move {
            handle_client(stream, client_id, state).await;
        });
    }
}

async fn handle_client(stream: UnixStream, client_id: usize, state: AppState) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(1024);
    if let Ok(mut hub) = state.hub.lock() {
        hub.add_client(client_id, event_tx.clone());
    }

    let write_loop = async {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_vec(&event) {
                Ok(j) => j,
                Err(e) => {
                    warn!(client_id, error = %e, "failed to serialize event");
                    continue;
                }
            };
            if write_frame_async(&mut writer, &json).await.is_err() {
                break;
            }
        }
    };

    let read_loop = async {
        loop {
            let payload = match read_frame_async(&mut reader).await {
                Ok(p) => p,
                Err(_) => break,
            };
            let request: ClientRequest = match serde_json::from_slice(&payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!(client_id, error = %e, "invalid request from client");
                    continue;
                }
            };
            let is_shutdown = matches!(request, ClientRequest::Shutdown);
            let response = handle_request(&state, client_id, &event_tx, request).await;
            if event_tx.send(response).await.is_err() {
                break;
            }
            if is_shutdown {
                break;
            }
        }
    };

    tokio::select! {
        _ = write_loop => {},
        _ = read_loop => {},
    }

    state.registry.drop_client(client_id);
    if let Ok(mut hub) = state.hub.lock() {
        hub.remove_client(client_id);
    }
}

/// Handle one request, returning the direct response event. Broadcasts and
/// session subscriptions ride on the client's event channel separately.
pub async fn handle_request(
    state: &AppState,
    client_id: usize,
    event_tx: &mpsc::Sender<DaemonEvent>,
    request: ClientRequest,
) -> DaemonEvent {
    match request {
        ClientRequest::Ping => DaemonEvent::Pong,
        ClientRequest::Shutdown => {
            let _ = state.shutdown_tx.send(()).await;
            DaemonEvent::ShuttingDown
        }
        ClientRequest::CreateSession {
            session_id,
            task_id,
            cwd,
        } => match state.registry.create(session_id, task_id, cwd).await {
            Ok(session) => DaemonEvent::SessionCreated { session },
            Err(message) => DaemonEvent::Error { message },
        },
        ClientRequest::SendInput { session_id, text } => match state.registry.get(&session_id) {
            Some(session) => match session.send_text(&text) {
                Ok(()) => DaemonEvent::Ack { ok: true, detail: None },
                Err(message) => DaemonEvent::Error { message },
            },
            None => unknown_session(&session_id),
        },
        ClientRequest::SendKey { session_id, key } => match state.registry.get(&session_id) {
            Some(session) => match session.send_key(&key) {
                Ok(()) => DaemonEvent::Ack { ok: true, detail: None },
                Err(message) => DaemonEvent::Error { message },
            },
            None => unknown_session(&session_id),
        },
        ClientRequest::StopSession { session_id } => {
            if state.registry.stop(&session_id).await {
                DaemonEvent::Ack { ok: true, detail: None }
            } else {
                unknown_session(&session_id)
            }
        }
        ClientRequest::RemoveSession { session_id } => {
            if state.registry.remove(&session_id).await {
                DaemonEvent::Ack { ok: true, detail: None }
            } else {
                unknown_session(&session_id)
            }
        }
        ClientRequest::ListSessions => DaemonEvent::SessionList {
            sessions: state.registry.list(),
        },
        ClientRequest::ListActiveSessions => DaemonEvent::SessionList {
            sessions: state.registry.list_active(),
        },
        ClientRequest::DrainMessages { session_id } => match state.registry.get(&session_id) {
            Some(session) => DaemonEvent::Messages {
                session_id,
                messages: session.drain(),
            },
            None => unknown_session(&session_id),
        },
        ClientRequest::AttachSession { session_id } => match state.registry.get(&session_id) {
            Some(session) => {
                session.subscribe(client_id, event_tx.clone());
                DaemonEvent::Subscribed { session_id }
            }
            None => unknown_session(&session_id),
        },
        ClientRequest::DetachSession { session_id } => match state.registry.get(&session_id) {
            Some(session) => {
                session.unsubscribe(client_id);
                DaemonEvent::Unsubscribed { session_id }
            }
            None => unknown_session(&session_id),
        },
        ClientRequest::AddTask {
            task_type,
            title,
            description,
        } => DaemonEvent::TaskCreated {
            task: state.orchestrator.add_task(&task_type, &title, &description),
        },
        ClientRequest::GetTask { task_id } => match state.orchestrator.get_task(&task_id) {
            Some(task) => DaemonEvent::Task { task },
            None => DaemonEvent::Error {
                message: format!("Unknown task: {task_id}"),
            },
        },
        ClientRequest::ListTasks => DaemonEvent::TaskList {
            tasks: state.orchestrator.list_tasks(),
        },
        ClientRequest::UpdateTaskStatus {
            task_id,
            status,
            comment,
        } => {
            if let Some(ref comment) = comment {
                info!(task_id, comment, "status change comment");
            }
            match state.orchestrator.update_status(&task_id, &status).await {
                Ok(report) => {
                    if report.applied && report.task.status == TaskStatus::Done {
                        // Reaching Done this way finishes the task too, so
                        // its sessions go down with it.
                        for session_id in state.registry.ids_for_task(&report.task.id) {
                            state.registry.remove(&session_id).await;
                        }
                        state.broadcast(&DaemonEvent::TaskDone {
                            task_id: report.task.id.clone(),
                        });
                    }
                    DaemonEvent::TaskUpdated { report }
                }
                Err(message) => DaemonEvent::Error { message },
            }
        }
        ClientRequest::CompleteTask { task_id, create_pr } => {
            match state.orchestrator.complete_task(&task_id, create_pr).await {
                Ok((task, report)) => {
                    // Tear down any sessions that were opened for this task.
                    for session_id in state.registry.ids_for_task(&task.id) {
                        state.registry.remove(&session_id).await;
                    }
                    state.broadcast(&DaemonEvent::TaskDone {
                        task_id: task.id.clone(),
                    });
                    DaemonEvent::TaskCompleted { task, report }
                }
                Err(message) => DaemonEvent::Error { message },
            }
        }
    }
}

fn unknown_session(session_id: &str) -> DaemonEvent {
    DaemonEvent::Error {
        message: format!("Unknown session: {session_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentboard_core::config::Settings;
    use agentboard_core::worktree::WorktreeManager;
    use std::path::Path;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .expect("run git");
        assert!(status.success(), "git {args:?} failed in {dir:?}");
    }

    fn test_state() -> (tempfile::TempDir, AppState, mpsc::Receiver<()>) {
        let tmp = tempfile::tempdir().expect("temp dir");
        let repo = tmp.path().join("project");
        std::fs::create_dir(&repo).unwrap();
        git(&repo, &["init"]);
        git(&repo, &["config", "user.email", "test@test"]);
        git(&repo, &["config", "user.name", "test"]);
        std::fs::write(repo.join("file.txt"), "base\n").unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-m", "init"]);
        git(&repo, &["branch", "-M", "main"]);

        let mut settings = Settings::default();
        settings.agent_command = "cat".to_string();
        settings.skip_permissions = false;
        settings.warmup_secs = 0;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let state = AppState {
            registry: Arc::new(SessionRegistry::new(settings)),
            orchestrator: Arc::new(TaskOrchestrator::new(WorktreeManager::new(&repo, "main"))),
            hub: Arc::new(Mutex::new(ClientHub::new())),
            shutdown_tx,
        };
        (tmp, state, shutdown_rx)
    }

    #[tokio::test]
    async fn ping_pong() {
        let (_tmp, state, _shutdown) = test_state();
        let (tx, _rx) = mpsc::channel(16);
        let response = handle_request(&state, 1, &tx, ClientRequest::Ping).await;
        assert!(matches!(response, DaemonEvent::Pong));
    }

    #[tokio::test]
    async fn shutdown_signals_main_loop() {
        let (_tmp, state, mut shutdown_rx) = test_state();
        let (tx, _rx) = mpsc::channel(16);
        let response = handle_request(&state, 1, &tx, ClientRequest::Shutdown).await;
        assert!(matches!(response, DaemonEvent::ShuttingDown));
        assert!(shutdown_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn session_round_trip_over_requests() {
        let (_tmp, state, _shutdown) = test_state();
        let (tx, mut rx) = mpsc::channel(64);

        let created = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::CreateSession {
                session_id: Some("work".to_string()),
                task_id: None,
                cwd: None,
            },
        )
        .await;
        assert!(matches!(created, DaemonEvent::SessionCreated { .. }));

        let attached = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::AttachSession {
                session_id: "work".to_string(),
            },
        )
        .await;
        assert!(matches!(attached, DaemonEvent::Subscribed { .. }));

        let acked = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::SendInput {
                session_id: "work".to_string(),
                text: "hello".to_string(),
            },
        )
        .await;
        assert!(matches!(acked, DaemonEvent::Ack { ok: true, .. }));

        // The attached client sees the echoed line as a live message event.
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        match event {
            DaemonEvent::Message { session_id, message } => {
                assert_eq!(session_id, "work");
                assert_eq!(message.content, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let removed = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::RemoveSession {
                session_id: "work".to_string(),
            },
        )
        .await;
        assert!(matches!(removed, DaemonEvent::Ack { ok: true, .. }));
        assert!(state.registry.list().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_requests_error() {
        let (_tmp, state, _shutdown) = test_state();
        let (tx, _rx) = mpsc::channel(16);
        for request in [
            ClientRequest::SendInput {
                session_id: "ghost".to_string(),
                text: "x".to_string(),
            },
            ClientRequest::StopSession {
                session_id: "ghost".to_string(),
            },
            ClientRequest::DrainMessages {
                session_id: "ghost".to_string(),
            },
            ClientRequest::AttachSession {
                session_id: "ghost".to_string(),
            },
        ] {
            let response = handle_request(&state, 1, &tx, request).await;
            assert!(matches!(response, DaemonEvent::Error { .. }));
        }
    }

    #[tokio::test]
    async fn task_lifecycle_broadcasts_done() {
        let (_tmp, state, _shutdown) = test_state();
        let (tx, _rx) = mpsc::channel(16);

        // A second client only listens for broadcasts.
        let (listener_tx, mut listener_rx) = mpsc::channel(16);
        state.hub.lock().unwrap().add_client(2, listener_tx);

        let created = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::AddTask {
                task_type: "docs".to_string(),
                title: "Write guide".to_string(),
                description: String::new(),
            },
        )
        .await;
        let task_id = match created {
            DaemonEvent::TaskCreated { task } => task.id,
            other => panic!("unexpected: {other:?}"),
        };

        let completed = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::CompleteTask {
                task_id: task_id.clone(),
                create_pr: false,
            },
        )
        .await;
        assert!(matches!(completed, DaemonEvent::TaskCompleted { .. }));

        match listener_rx.try_recv() {
            Ok(DaemonEvent::TaskDone { task_id: done }) => assert_eq!(done, task_id),
            other => panic!("expected broadcast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completing_a_task_removes_its_sessions() {
        let (_tmp, state, _shutdown) = test_state();
        let (tx, _rx) = mpsc::channel(64);

        let created = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::AddTask {
                task_type: "docs".to_string(),
                title: "Write guide".to_string(),
                description: String::new(),
            },
        )
        .await;
        let task_id = match created {
            DaemonEvent::TaskCreated { task } => task.id,
            other => panic!("unexpected: {other:?}"),
        };

        let session = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::CreateSession {
                session_id: None,
                task_id: Some(task_id.clone()),
                cwd: None,
            },
        )
        .await;
        assert!(matches!(session, DaemonEvent::SessionCreated { .. }));
        assert_eq!(state.registry.ids_for_task(&task_id).len(), 1);

        let completed = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::CompleteTask {
                task_id: task_id.clone(),
                create_pr: false,
            },
        )
        .await;
        assert!(matches!(completed, DaemonEvent::TaskCompleted { .. }));
        assert!(state.registry.list().is_empty());
    }

    #[tokio::test]
    async fn done_status_update_removes_task_sessions() {
        let (_tmp, state, _shutdown) = test_state();
        let (tx, _rx) = mpsc::channel(64);

        let created = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::AddTask {
                task_type: "docs".to_string(),
                title: "Write guide".to_string(),
                description: String::new(),
            },
        )
        .await;
        let task_id = match created {
            DaemonEvent::TaskCreated { task } => task.id,
            other => panic!("unexpected: {other:?}"),
        };

        let session = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::CreateSession {
                session_id: None,
                task_id: Some(task_id.clone()),
                cwd: None,
            },
        )
        .await;
        assert!(matches!(session, DaemonEvent::SessionCreated { .. }));

        let updated = handle_request(
            &state,
            1,
            &tx,
            ClientRequest::UpdateTaskStatus {
                task_id: task_id.clone(),
                status: "done".to_string(),
                comment: None,
            },
        )
        .await;
        match updated {
            DaemonEvent::TaskUpdated { report } => {
                assert!(report.applied);
                assert_eq!(report.task.status, TaskStatus::Done);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(state.registry.list().is_empty());
    }
}
