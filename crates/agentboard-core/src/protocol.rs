//! Request/event types exchanged between the CLI and the daemon.
//!
//! Every frame is a JSON object with a `type` tag. Requests always get at
//! least one event in response; attached clients additionally receive
//! `message` events as sessions produce output and `task_done` broadcasts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::message::Message;
use crate::task::{Task, TaskStatus};
use crate::worktree::{CompletionReport, SyncStatus};

/// Lifecycle of a managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// PTY spawned, warm-up delay still running.
    Starting,
    /// Agent process up and accepting input.
    Running,
    /// Agent process stopped; history and queue retained.
    Stopped,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
        }
    }
}

/// Snapshot of one session for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub state: SessionState,
    pub created_at: String,
    pub history_len: usize,
    pub queued: usize,
    pub subscribers: usize,
}

/// What a status transition did, beyond moving the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateReport {
    pub task: Task,
    pub previous_status: TaskStatus,
    /// False when a merge conflict blocked the transition.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Ping,
    Shutdown,
    CreateSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    SendInput {
        session_id: String,
        text: String,
    },
    SendKey {
        session_id: String,
        key: String,
    },
    StopSession {
        session_id: String,
    },
    RemoveSession {
        session_id: String,
    },
    ListSessions,
    ListActiveSessions,
    DrainMessages {
        session_id: String,
    },
    AttachSession {
        session_id: String,
    },
    DetachSession {
        session_id: String,
    },
    AddTask {
        task_type: String,
        title: String,
        description: String,
    },
    GetTask {
        task_id: String,
    },
    ListTasks,
    UpdateTaskStatus {
        task_id: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    CompleteTask {
        task_id: String,
        #[serde(default)]
        create_pr: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    Pong,
    ShuttingDown,
    Error {
        message: String,
    },
    Ack {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    SessionCreated {
        session: SessionInfo,
    },
    SessionList {
        sessions: Vec<SessionInfo>,
    },
    /// Response to a drain: the queued messages, now consumed.
    Messages {
        session_id: String,
        messages: Vec<Message>,
    },
    /// Live fan-out to attached clients.
    Message {
        session_id: String,
        message: Message,
    },
    Subscribed {
        session_id: String,
    },
    Unsubscribed {
        session_id: String,
    },
    TaskCreated {
        task: Task,
    },
    Task {
        task: Task,
    },
    TaskList {
        tasks: Vec<Task>,
    },
    TaskUpdated {
        report: StatusUpdateReport,
    },
    TaskCompleted {
        task: Task,
        report: CompletionReport,
    },
    /// Broadcast to every connected client when a task reaches Done.
    TaskDone {
        task_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tag_is_snake_case() {
        let req = ClientRequest::CreateSession {
            session_id: Some("s1".to_string()),
            task_id: None,
            cwd: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"type\":\"create_session\""), "{json}");
        assert!(!json.contains("cwd"), "{json}");
    }

    #[test]
    fn request_roundtrip() {
        let req = ClientRequest::UpdateTaskStatus {
            task_id: "42".to_string(),
            status: "in_progress".to_string(),
            comment: Some("picking this up".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: ClientRequest = serde_json::from_str(&json).unwrap();
        match back {
            ClientRequest::UpdateTaskStatus { task_id, status, comment } => {
                assert_eq!(task_id, "42");
                assert_eq!(status, "in_progress");
                assert_eq!(comment.as_deref(), Some("picking this up"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn complete_task_defaults_create_pr() {
        let req: ClientRequest =
            serde_json::from_str(r#"{"type":"complete_task","task_id":"1"}"#).unwrap();
        match req {
            ClientRequest::CompleteTask { create_pr, .. } => assert!(!create_pr),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn event_roundtrip() {
        let event = DaemonEvent::TaskDone {
            task_id: "7".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"task_done\""), "{json}");
        let back: DaemonEvent = serde_json::from_str(&json).unwrap();
        match back {
            DaemonEvent::TaskDone { task_id } => assert_eq!(task_id, "7"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn session_state_labels() {
        assert_eq!(SessionState::Starting.label(), "starting");
        assert_eq!(SessionState::Running.label(), "running");
        assert_eq!(SessionState::Stopped.label(), "stopped");
    }
}
