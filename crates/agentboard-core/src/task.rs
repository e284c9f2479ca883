//! Task model and the status workflow the orchestrator advances.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Workflow statuses in their fixed linear order, plus the `Blocked`
/// side-state reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Analysis,
    Ready,
    InProgress,
    Testing,
    CodeReview,
    Pr,
    Done,
    Blocked,
}

/// The linear workflow, excluding `Blocked`.
pub const WORKFLOW: &[TaskStatus] = &[
    TaskStatus::Backlog,
    TaskStatus::Analysis,
    TaskStatus::Ready,
    TaskStatus::InProgress,
    TaskStatus::Testing,
    TaskStatus::CodeReview,
    TaskStatus::Pr,
    TaskStatus::Done,
];

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Analysis => "analysis",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Testing => "testing",
            TaskStatus::CodeReview => "code_review",
            TaskStatus::Pr => "pr",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "backlog" => Some(TaskStatus::Backlog),
            "analysis" => Some(TaskStatus::Analysis),
            "ready" => Some(TaskStatus::Ready),
            "in_progress" => Some(TaskStatus::InProgress),
            "testing" => Some(TaskStatus::Testing),
            "code_review" => Some(TaskStatus::CodeReview),
            "pr" => Some(TaskStatus::Pr),
            "done" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }

    /// `Done` accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }

    /// Statuses whose entry requires a worktree synced with main.
    pub fn needs_workspace_sync(&self) -> bool {
        matches!(
            self,
            TaskStatus::InProgress | TaskStatus::Testing | TaskStatus::CodeReview
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    /// Status the task held before entering `Blocked`; unblocking returns
    /// here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_from: Option<TaskStatus>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            task_type: task_type.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Backlog,
            assigned_agent: None,
            git_branch: None,
            worktree_path: None,
            blocked_from: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Whether this task may move from its current status to `to`.
    /// Transitions are externally driven, so any forward/backward move along
    /// the workflow is allowed, with three exceptions: nothing leaves `Done`,
    /// `Blocked` is only entered from non-terminal statuses, and leaving
    /// `Blocked` must return to the status recorded when the task was
    /// blocked.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match (self.status, to) {
            (from, to) if from == to => false,
            (TaskStatus::Blocked, to) => self.blocked_from == Some(to),
            (_, TaskStatus::Blocked) => true,
            _ => true,
        }
    }
}

/// Task lookup/update API the orchestrator depends on. Persistence itself is
/// an external collaborator; the daemon ships an in-memory implementation.
pub trait TaskStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Task>;
    fn insert(&self, task: Task);
    /// Replace the stored task by id. Returns false if unknown.
    fn update(&self, task: &Task) -> bool;
    fn list(&self) -> Vec<Task>;
}

/// Map-backed store used by the daemon and tests.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().ok()?.get(id).cloned()
    }

    fn insert(&self, task: Task) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(task.id.clone(), task);
        }
    }

    fn update(&self, task: &Task) -> bool {
        match self.tasks.lock() {
            Ok(mut tasks) => match tasks.get_mut(&task.id) {
                Some(slot) => {
                    *slot = task.clone();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    fn list(&self) -> Vec<Task> {
        let mut all: Vec<Task> = self
            .tasks
            .lock()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
