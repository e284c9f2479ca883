//! Git worktree lifecycle for tasks.
//!
//! Each task gets one worktree at `<project>/worktrees/task-<id>` on branch
//! `feature/task-<id>`. Sync and create temporarily switch the primary
//! checkout's branch and must restore it even when a step fails; merge
//! conflicts are a distinct outcome rather than an error, so callers can
//! block a transition and hand the worktree to a human.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

/// Outcome of syncing a task's worktree with main.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Main refreshed and merged into the worktree branch (or nothing to do).
    Synced,
    /// No remote configured; local-only repositories are valid.
    SkippedNoRemote,
    /// The merge hit conflict markers; manual resolution required.
    Conflict,
}

impl SyncStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::SkippedNoRemote => "skipped_no_remote",
            SyncStatus::Conflict => "conflict",
        }
    }
}

/// What happened during task completion. Cleanup steps are independent;
/// their failures accumulate in `errors` instead of masking each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionReport {
    pub merged: bool,
    pub worktree_removed: bool,
    pub branch_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Run git in `dir`, returning trimmed stdout. On non-zero exit the
/// diagnostic output is surfaced verbatim (stderr, falling back to stdout).
fn run_git(dir: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| format!("Failed to run git {}: {e}", args.join(" ")))?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(if stderr.is_empty() { stdout } else { stderr })
    }
}

/// Git operations scoped to one project checkout.
pub struct WorktreeManager {
    root: PathBuf,
    main_branch: String,
}

impl WorktreeManager {
    pub fn new(root: impl Into<PathBuf>, main_branch: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            main_branch: main_branch.into(),
        }
    }

    pub fn branch_for(task_id: &str) -> String {
        format!("feature/task-{task_id}")
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.root.join("worktrees").join(format!("task-{task_id}"))
    }

    fn has_remote(&self) -> bool {
        run_git(&self.root, &["remote"])
            .map(|out| !out.is_empty())
            .unwrap_or(false)
    }

    fn current_branch(&self) -> Result<String, String> {
        run_git(&self.root, &["branch", "--show-current"])
    }

    /// Fetch and fast-forward main in the primary checkout, restoring the
    /// previously checked-out branch afterwards even when a step fails.
    fn refresh_main(&self) -> Result<(), String> {
        let prev = self.current_branch()?;
        let result = (|| {
            run_git(&self.root, &["fetch", "origin"])?;
            run_git(&self.root, &["checkout", &self.main_branch])?;
            run_git(&self.root, &["pull", "origin", &self.main_branch])?;
            Ok(())
        })();
        if !prev.is_empty() && prev != self.main_branch {
            let restore = run_git(&self.root, &["checkout", &prev]);
            if result.is_ok() {
                restore?;
            }
        }
        result
    }

    /// Sync the task's worktree branch with `origin/<main>`. A no-op success
    /// when no remote is configured. A merge that reports conflict markers
    /// yields [`SyncStatus::Conflict`] with the worktree left mid-merge for
    /// manual resolution.
    pub fn sync(&self, task_id: &str) -> Result<SyncStatus, String> {
        if !self.has_remote() {
            return Ok(SyncStatus::SkippedNoRemote);
        }
        self.refresh_main()?;

        let wt_path = self.path_for(task_id);
        if !wt_path.is_dir() {
            // No worktree yet; refreshing main was all there was to do.
            return Ok(SyncStatus::Synced);
        }

        let branch = Self::branch_for(task_id);
        let message = format!("Sync {} into {branch}", self.main_branch);
        let upstream = format!("origin/{}", self.main_branch);
        let output = Command::new("git")
            .arg("-C")
            .arg(&wt_path)
            .args(["merge", &upstream, "--no-edit", "-m", &message])
            .output()
            .map_err(|e| format!("Failed to run git merge: {e}"))?;
        if output.status.success() {
            return Ok(SyncStatus::Synced);
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stdout.contains("CONFLICT")
            || stderr.contains("CONFLICT")
            || stdout.contains("Automatic merge failed")
        {
            Ok(SyncStatus::Conflict)
        } else {
            let stderr = stderr.trim().to_string();
            Err(if stderr.is_empty() {
                stdout.trim().to_string()
            } else {
                stderr
            })
        }
    }

    /// Create the task's worktree on a fresh `feature/task-<id>` branch,
    /// syncing main first. An already-registered worktree is reused.
    pub fn create(&self, task_id: &str) -> Result<(String, PathBuf), String> {
        if self.has_remote() {
            self.refresh_main()?;
        }

        let branch = Self::branch_for(task_id);
        let wt_path = self.path_for(task_id);
        if self.worktree_registered(&wt_path) {
            return Ok((branch, wt_path));
        }

        if let Some(parent) = wt_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create worktrees directory: {e}"))?;
        }
        run_git(
            &self.root,
            &["worktree", "add", &wt_path.to_string_lossy(), "-b", &branch],
        )?;
        Ok((branch, wt_path))
    }

    /// Check whether a path is a registered worktree of this repo.
    fn worktree_registered(&self, wt_path: &Path) -> bool {
        if !wt_path.is_dir() {
            return false;
        }
        let Ok(listing) = run_git(&self.root, &["worktree", "list", "--porcelain"]) else {
            return false;
        };
        let canonical = wt_path.canonicalize().ok();
        for line in listing.lines() {
            if let Some(listed) = line.strip_prefix("worktree ") {
                let listed_path = Path::new(listed);
                if listed_path == wt_path {
                    return true;
                }
                if let (Some(canon), Ok(listed_canon)) = (&canonical, listed_path.canonicalize()) {
                    if listed_canon == *canon {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Finish a task's workspace: merge the feature branch into main and
    /// tear the worktree and branch down, or (PR path) publish the branch
    /// and leave the worktree intact for review.
    pub fn complete(&self, task_id: &str, create_pr: bool) -> CompletionReport {
        let branch = Self::branch_for(task_id);
        let wt_path = self.path_for(task_id);
        let mut report = CompletionReport::default();

        if create_pr {
            if self.has_remote() {
                match run_git(&self.root, &["push", "-u", "origin", &branch]) {
                    Ok(_) => report.pr_url = Some(format!("origin/{branch}")),
                    Err(e) => report.errors.push(format!("push {branch}: {e}")),
                }
            } else {
                report
                    .errors
                    .push("cannot create pull request: no remote configured".to_string());
            }
            return report;
        }

        let prev = self.current_branch().unwrap_or_default();
        let merge_result = (|| {
            run_git(&self.root, &["checkout", &self.main_branch])?;
            let message = format!("Merge {branch}");
            run_git(&self.root, &["merge", &branch, "--no-edit", "-m", &message])?;
            Ok::<(), String>(())
        })();
        match merge_result {
            Ok(()) => report.merged = true,
            Err(e) => {
                report.errors.push(format!("merge {branch}: {e}"));
                let _ = run_git(&self.root, &["merge", "--abort"]);
            }
        }
        if !prev.is_empty() && prev != self.main_branch {
            if let Err(e) = run_git(&self.root, &["checkout", &prev]) {
                report.errors.push(format!("restore branch {prev}: {e}"));
            }
        }

        // A failed merge keeps the worktree and branch; removing them would
        // lose the unmerged work.
        if report.merged {
            match run_git(
                &self.root,
                &["worktree", "remove", &wt_path.to_string_lossy()],
            ) {
                Ok(_) => report.worktree_removed = true,
                Err(e) => report.errors.push(format!("worktree remove: {e}")),
            }
            match run_git(&self.root, &["branch", "-d", &branch]) {
                Ok(_) => report.branch_deleted = true,
                Err(e) => report.errors.push(format!("branch delete: {e}")),
            }
        }
        report
    }
}
