//! Agent selection for a task at a given workflow status.
//!
//! Two layers: an explicit (task type, status) assignment table consulted
//! first, then an ordered keyword rule list scanned over the task's title
//! and description. The rule order is a priority list; reordering it changes
//! recommendations.

use crate::task::{Task, TaskStatus};

/// Fallback when nothing matches.
pub const DEFAULT_AGENT: &str = "backend-developer";

/// Explicit (task type, status) assignments, consulted before any keyword
/// scan.
const ASSIGNMENTS: &[(&str, TaskStatus, &str)] = &[
    ("feature", TaskStatus::Analysis, "system-architect"),
    ("feature", TaskStatus::CodeReview, "code-reviewer"),
    ("bug", TaskStatus::Analysis, "debugger"),
    ("bug", TaskStatus::CodeReview, "code-reviewer"),
    ("refactor", TaskStatus::InProgress, "code-reviewer"),
    ("docs", TaskStatus::InProgress, "documentation-writer"),
];

/// Ordered keyword rules, first match wins. Single-word keywords match whole
/// tokens; multi-word keywords match as substrings.
const KEYWORD_RULES: &[(&[&str], &str)] = &[
    (&["ai", "ml", "llm", "machine learning", "model"], "ai-engineer"),
    (&["api", "endpoint", "rest", "graphql"], "api-designer"),
    (&["mobile", "ios", "android"], "mobile-developer"),
    (&["e2e", "browser", "playwright", "end to end"], "e2e-test-engineer"),
    (&["ux", "ui", "usability", "accessibility"], "ux-designer"),
    (&["test", "tests", "testing", "coverage", "qa"], "test-engineer"),
    (&["doc", "docs", "documentation", "readme"], "documentation-writer"),
    (&["review", "refactor", "refactoring", "cleanup"], "code-reviewer"),
    (&["context", "memory", "rag", "retrieval"], "context-engineer"),
    (&["data", "database", "schema", "migration", "sql"], "data-engineer"),
    (&["devops", "deploy", "deployment", "docker", "ci", "pipeline"], "devops-engineer"),
    (&["mcp", "protocol"], "mcp-developer"),
    (&["frontend", "react", "component", "css"], "frontend-developer"),
];

/// Recommend an agent for the task at `status`. Returns `None` for
/// `Testing`: that status is a hard stop for automation and only a human may
/// advance past it.
pub fn recommend_agent(task: &Task, status: TaskStatus) -> Option<String> {
    if status == TaskStatus::Testing {
        return None;
    }

    for (task_type, assign_status, agent) in ASSIGNMENTS {
        if *assign_status == status && task.task_type.eq_ignore_ascii_case(task_type) {
            return Some((*agent).to_string());
        }
    }

    let haystack = format!("{} {}", task.title, task.description).to_lowercase();
    let tokens: Vec<&str> = haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    for (keywords, agent) in KEYWORD_RULES {
        let hit = keywords.iter().any(|kw| {
            if kw.contains(' ') {
                haystack.contains(kw)
            } else {
                tokens.iter().any(|t| t == kw)
            }
        });
        if hit {
            return Some((*agent).to_string());
        }
    }

    Some(DEFAULT_AGENT.to_string())
}
