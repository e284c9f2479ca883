//! Task workflow orchestration.
//!
//! Validates status transitions, provisions git worktrees when tasks move
//! into implementation, and recommends agents per status. Git runs on the
//! blocking pool; the task store only changes after the workspace work
//! succeeds, so a failed git step never leaves a half-moved task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use agentboard_core::agent::recommend_agent;
use agentboard_core::protocol::StatusUpdateReport;
use agentboard_core::task::{InMemoryTaskStore, Task, TaskStatus, TaskStore};
use agentboard_core::worktree::{CompletionReport, SyncStatus, WorktreeManager};

pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    worktrees: Arc<WorktreeManager>,
    next_id: AtomicU64,
}

impl TaskOrchestrator {
    pub fn new(worktrees: WorktreeManager) -> Self {
        Self::with_store(Arc::new(InMemoryTaskStore::new()), worktrees)
    }

    /// Build against an externally owned store, e.g. a persistent one.
    pub fn with_store(store: Arc<dyn TaskStore>, worktrees: WorktreeManager) -> Self {
        Self {
            store,
            worktrees: Arc::new(worktrees),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add_task(&self, task_type: &str, title: &str, description: &str) -> Task {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut task = Task::new(id.to_string(), task_type, title);
        task.description = description.to_string();
        self.store.insert(task.clone());
        info!(task = %task.id, title = %task.title, "task added");
        task
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.store.get(task_id)
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.list()
    }

    /// Move a task to a new status, doing the workspace work the transition
    /// implies. A merge conflict during sync leaves the task where it was
    /// and comes back as `applied: false` rather than an error.
    pub async fn update_status(
        &self,
        task_id: &str,
        status_label: &str,
    ) -> Result<StatusUpdateReport, String> {
        let to = TaskStatus::parse(status_label)
            .ok_or_else(|| format!("Unknown status: {status_label}"))?;
        let mut task = self
            .store
            .get(task_id)
            .ok_or_else(|| format!("Unknown task: {task_id}"))?;
        let previous = task.status;

        if to == previous {
            return Ok(StatusUpdateReport {
                task,
                previous_status: previous,
                applied: true,
                sync: None,
                branch_created: None,
                recommended_agent: None,
            });
        }
        if !task.can_transition_to(to) {
            return Err(format!(
                "Cannot move task {task_id} from {} to {}",
                previous.label(),
                to.label()
            ));
        }

        // Entering Done is a completion: the same merge-and-teardown path
        // as complete_task, without opening a PR.
        if to == TaskStatus::Done {
            let (task, report) = self.finish(task, false).await?;
            if !report.errors.is_empty() {
                warn!(task = %task.id, errors = ?report.errors, "teardown finished with errors");
            }
            return Ok(StatusUpdateReport {
                task,
                previous_status: previous,
                applied: true,
                sync: None,
                branch_created: None,
                recommended_agent: None,
            });
        }

        let mut sync = None;
        let mut branch_created = None;
        if to == TaskStatus::InProgress && task.worktree_path.is_none() {
            let worktrees = self.worktrees.clone();
            let id = task.id.clone();
            let (branch, path) = tokio::task::spawn_blocking(move || worktrees.create(&id))
                .await
                .map_err(|e| format!("Worktree task failed: {e}"))??;
            info!(task = %task.id, branch = %branch, "worktree created");
            task.git_branch = Some(branch.clone());
            task.worktree_path = Some(path.to_string_lossy().into_owned());
            branch_created = Some(branch);
        } else if to.needs_workspace_sync() && task.worktree_path.is_some() {
            let worktrees = self.worktrees.clone();
            let id = task.id.clone();
            let status = tokio::task::spawn_blocking(move || worktrees.sync(&id))
                .await
                .map_err(|e| format!("Worktree task failed: {e}"))??;
            if status == SyncStatus::Conflict {
                info!(task = %task.id, "sync conflict, transition blocked");
                return Ok(StatusUpdateReport {
                    task,
                    previous_status: previous,
                    applied: false,
                    sync: Some(SyncStatus::Conflict),
                    branch_created: None,
                    recommended_agent: None,
                });
            }
            sync = Some(status);
        }

        if to == TaskStatus::Blocked {
            task.blocked_from = Some(previous);
        }
        if previous == TaskStatus::Blocked {
            task.blocked_from = None;
        }

        // Testing is a hard stop for automation: no agent holds the task
        // there, a human decides when it moves on. Blocked keeps whatever
        // agent the task already had.
        let recommended = if to == TaskStatus::Blocked {
            None
        } else {
            let recommended = recommend_agent(&task, to);
            task.assigned_agent = recommended.clone();
            recommended
        };

        task.status = to;
        task.touch();
        self.store.update(&task);
        info!(
            task = %task.id,
            from = previous.label(),
            to = to.label(),
            "task status updated"
        );
        Ok(StatusUpdateReport {
            task,
            previous_status: previous,
            applied: true,
            sync,
            branch_created,
            recommended_agent: recommended,
        })
    }

    /// Finish a task: merge or publish its branch, tear down the workspace,
    /// and mark it Done. Workspace cleanup failures are reported, not fatal.
    pub async fn complete_task(
        &self,
        task_id: &str,
        create_pr: bool,
    ) -> Result<(Task, CompletionReport), String> {
        let task = self
            .store
            .get(task_id)
            .ok_or_else(|| format!("Unknown task: {task_id}"))?;
        if task.status.is_terminal() {
            return Err(format!("Task {task_id} is already done"));
        }
        self.finish(task, create_pr).await
    }

    /// Shared tail of both paths into Done: run the workspace completion,
    /// clear what it cleaned up, and store the task as Done.
    async fn finish(
        &self,
        mut task: Task,
        create_pr: bool,
    ) -> Result<(Task, CompletionReport), String> {
        let report = if task.worktree_path.is_some() {
            let worktrees = self.worktrees.clone();
            let id = task.id.clone();
            tokio::task::spawn_blocking(move || worktrees.complete(&id, create_pr))
                .await
                .map_err(|e| format!("Worktree task failed: {e}"))?
        } else {
            CompletionReport::default()
        };

        if report.worktree_removed {
            task.worktree_path = None;
        }
        if report.branch_deleted {
            task.git_branch = None;
        }
        task.status = TaskStatus::Done;
        task.assigned_agent = None;
        task.blocked_from = None;
        task.touch();
        self.store.update(&task);
        info!(task = %task.id, errors = report.errors.len(), "task completed");
        Ok((task, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
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

    fn make_temp_repo() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let repo = tmp.path().join("project");
        fs::create_dir(&repo).unwrap();
        git(&repo, &["init"]);
        git(&repo, &["config", "user.email", "test@test"]);
        git(&repo, &["config", "user.name", "test"]);
        fs::write(repo.join("file.txt"), "base\n").unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-m", "init"]);
        git(&repo, &["branch", "-M", "main"]);
        (tmp, repo)
    }

    fn make_cloned_repo() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let (tmp, origin) = make_temp_repo();
        let clone = tmp.path().join("clone");
        let status = Command::new("git")
            .args(["clone", &origin.to_string_lossy(), &clone.to_string_lossy()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .expect("git clone");
        assert!(status.success());
        git(&clone, &["config", "user.email", "test@test"]);
        git(&clone, &["config", "user.name", "test"]);
        (tmp, origin, clone)
    }

    fn commit_file(repo: &Path, name: &str, content: &str, message: &str) {
        fs::write(repo.join(name), content).unwrap();
        git(repo, &["add", "."]);
        git(repo, &["commit", "-m", message]);
    }

    fn orchestrator_for(repo: &Path) -> TaskOrchestrator {
        TaskOrchestrator::new(WorktreeManager::new(repo, "main"))
    }

    #[tokio::test]
    async fn add_assigns_incrementing_ids() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let first = orch.add_task("feature", "First", "");
        let second = orch.add_task("bug", "Second", "");
        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");
        assert_eq!(orch.list_tasks().len(), 2);
        assert_eq!(first.status, TaskStatus::Backlog);
    }

    #[tokio::test]
    async fn analysis_assigns_architect_for_features() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Add login", "");

        let report = orch.update_status(&task.id, "analysis").await.expect("update");
        assert!(report.applied);
        assert_eq!(report.previous_status, TaskStatus::Backlog);
        assert_eq!(
            report.task.assigned_agent.as_deref(),
            Some("system-architect")
        );
        assert!(report.task.worktree_path.is_none());
    }

    #[tokio::test]
    async fn in_progress_provisions_worktree() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Add login", "");
        orch.update_status(&task.id, "analysis").await.expect("analysis");
        orch.update_status(&task.id, "ready").await.expect("ready");

        let report = orch
            .update_status(&task.id, "in_progress")
            .await
            .expect("in_progress");
        assert_eq!(report.branch_created.as_deref(), Some("feature/task-1"));
        assert_eq!(report.task.git_branch.as_deref(), Some("feature/task-1"));
        let wt = report.task.worktree_path.clone().expect("worktree path");
        assert!(Path::new(&wt).is_dir());
        assert!(wt.ends_with("worktrees/task-1"));
    }

    #[tokio::test]
    async fn testing_clears_assigned_agent() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Add login", "");
        orch.update_status(&task.id, "in_progress").await.expect("start");

        let report = orch.update_status(&task.id, "testing").await.expect("testing");
        assert!(report.applied);
        assert!(report.task.assigned_agent.is_none());
        assert!(report.recommended_agent.is_none());
    }

    #[tokio::test]
    async fn same_status_is_noop_success() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Add login", "");

        let report = orch.update_status(&task.id, "backlog").await.expect("noop");
        assert!(report.applied);
        assert!(report.branch_created.is_none());
        assert!(report.recommended_agent.is_none());
    }

    #[tokio::test]
    async fn blocked_round_trip() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("bug", "Fix crash", "");
        orch.update_status(&task.id, "analysis").await.expect("analysis");

        let blocked = orch.update_status(&task.id, "blocked").await.expect("block");
        assert_eq!(blocked.task.blocked_from, Some(TaskStatus::Analysis));

        // Only way out of Blocked is back where it came from.
        assert!(orch.update_status(&task.id, "ready").await.is_err());
        let back = orch.update_status(&task.id, "analysis").await.expect("unblock");
        assert!(back.task.blocked_from.is_none());
        assert_eq!(back.task.status, TaskStatus::Analysis);
    }

    #[tokio::test]
    async fn unknown_status_and_task_are_errors() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "X", "");
        assert!(orch.update_status(&task.id, "bogus").await.is_err());
        assert!(orch.update_status("999", "analysis").await.is_err());
    }

    #[tokio::test]
    async fn sync_conflict_blocks_transition() {
        let (_tmp, origin, clone) = make_cloned_repo();
        let orch = orchestrator_for(&clone);
        let task = orch.add_task("feature", "Diverge", "");
        let report = orch
            .update_status(&task.id, "in_progress")
            .await
            .expect("start");
        let wt = PathBuf::from(report.task.worktree_path.clone().expect("worktree"));

        commit_file(&wt, "file.txt", "branch change\n", "branch edit");
        commit_file(&origin, "file.txt", "main change\n", "main edit");

        let blocked = orch.update_status(&task.id, "testing").await.expect("report");
        assert!(!blocked.applied);
        assert_eq!(blocked.sync, Some(SyncStatus::Conflict));
        assert_eq!(
            orch.get_task(&task.id).expect("task").status,
            TaskStatus::InProgress
        );
    }

    #[tokio::test]
    async fn complete_merges_and_marks_done() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Ship it", "");
        let report = orch
            .update_status(&task.id, "in_progress")
            .await
            .expect("start");
        let wt = PathBuf::from(report.task.worktree_path.clone().expect("worktree"));
        commit_file(&wt, "feature.txt", "done\n", "add feature");

        let (task, completion) = orch.complete_task(&task.id, false).await.expect("complete");
        assert_eq!(task.status, TaskStatus::Done);
        assert!(completion.merged, "errors: {:?}", completion.errors);
        assert!(completion.worktree_removed);
        assert!(completion.branch_deleted);
        assert!(task.worktree_path.is_none());
        assert!(task.git_branch.is_none());
        assert!(repo.join("feature.txt").is_file());

        // Done is terminal both for transitions and a second completion.
        assert!(orch.update_status(&task.id, "backlog").await.is_err());
        assert!(orch.complete_task(&task.id, false).await.is_err());
    }

    #[tokio::test]
    async fn done_status_update_tears_down_workspace() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Ship it", "");
        let report = orch
            .update_status(&task.id, "in_progress")
            .await
            .expect("start");
        let wt = PathBuf::from(report.task.worktree_path.clone().expect("worktree"));
        commit_file(&wt, "feature.txt", "done\n", "add feature");

        let done = orch.update_status(&task.id, "done").await.expect("done");
        assert!(done.applied);
        assert_eq!(done.task.status, TaskStatus::Done);
        assert!(done.task.worktree_path.is_none());
        assert!(done.task.git_branch.is_none());
        assert!(done.task.assigned_agent.is_none());
        assert!(done.recommended_agent.is_none());
        assert!(!wt.exists());
        assert!(repo.join("feature.txt").is_file());
    }

    #[tokio::test]
    async fn blocked_keeps_assigned_agent() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("feature", "Add login", "");
        let analysed = orch.update_status(&task.id, "analysis").await.expect("analysis");
        let agent = analysed.task.assigned_agent.clone();
        assert!(agent.is_some());

        let blocked = orch.update_status(&task.id, "blocked").await.expect("block");
        assert_eq!(blocked.task.assigned_agent, agent);
        assert!(blocked.recommended_agent.is_none());
    }

    #[tokio::test]
    async fn store_is_shared_with_the_caller() {
        let (_tmp, repo) = make_temp_repo();
        let store = Arc::new(InMemoryTaskStore::new());
        let orch =
            TaskOrchestrator::with_store(store.clone(), WorktreeManager::new(&repo, "main"));

        let task = orch.add_task("feature", "X", "");
        assert_eq!(store.get(&task.id).expect("stored task").title, "X");
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn complete_without_worktree_still_finishes() {
        let (_tmp, repo) = make_temp_repo();
        let orch = orchestrator_for(&repo);
        let task = orch.add_task("docs", "Write guide", "");

        let (task, completion) = orch.complete_task(&task.id, false).await.expect("complete");
        assert_eq!(task.status, TaskStatus::Done);
        assert!(!completion.merged);
        assert!(completion.errors.is_empty());
    }
}
