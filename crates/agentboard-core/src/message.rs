//! Structured session output: the `Message` record plus the line
//! classification and deduplication rules applied by the session reader.
//!
//! A line carries two representations: the original text (control sequences
//! intact, subscribers need the formatting) and a comparison form with ANSI
//! sequences stripped, used only for the ignore list, classification, and
//! the dedup window.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// How many recent comparison forms are remembered per session. A sliding
/// window rather than a full-history set keeps memory bounded; repeats that
/// are further apart than this are delivered again.
pub const DEDUP_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    System,
    User,
    Agent,
    Error,
    Tool,
    Status,
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::System => "system",
            MessageKind::User => "user",
            MessageKind::Agent => "agent",
            MessageKind::Error => "error",
            MessageKind::Tool => "tool",
            MessageKind::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSubtype {
    Init,
    Complete,
    ToolUse,
    ToolResult,
    Error,
    Prompt,
    Response,
}

/// One classified, timestamped unit of session output or input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<MessageSubtype>,
    pub content: String,
    /// ISO-8601 timestamp assigned at creation.
    pub timestamp: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(session_id: impl Into<String>, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            subtype: None,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            session_id: session_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_subtype(mut self, subtype: MessageSubtype) -> Self {
        self.subtype = Some(subtype);
        self
    }
}

/// ANSI-stripped, right-trimmed form of a line, used for the ignore list,
/// classification, and dedup. Never shown to subscribers.
pub fn comparison_form(line: &str) -> String {
    let stripped = strip_ansi_escapes::strip(line.as_bytes());
    String::from_utf8_lossy(&stripped).trim_end().to_string()
}

/// Placeholder lines the wrapped CLI prints while it works; never worth
/// forwarding.
const IGNORED_LINES: &[&str] = &["thinking…", "thinking...", "✻ thinking…"];

/// True if a comparison-form line should be dropped before classification.
pub fn should_ignore(form: &str) -> bool {
    let trimmed = form.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lower = trimmed.to_lowercase();
    IGNORED_LINES.iter().any(|ig| lower == *ig)
}

const TOOL_KEYWORDS: &[&str] = &[
    "executing",
    "running",
    "creating",
    "writing",
    "reading",
    "editing",
];

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "exception", "traceback"];

/// Classify a comparison-form line by content. Heuristics are applied in a
/// fixed order: tool keywords, error keywords, system prefix, otherwise
/// agent prose.
pub fn classify_line(form: &str) -> MessageKind {
    let lower = form.to_lowercase();
    if TOOL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return MessageKind::Tool;
    }
    if ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return MessageKind::Error;
    }
    let trimmed = form.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with("System:") {
        return MessageKind::System;
    }
    MessageKind::Agent
}

/// Sliding window over the last [`DEDUP_WINDOW`] comparison forms.
#[derive(Debug)]
pub struct DedupWindow {
    recent: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a comparison form. Returns `false` if it matched one of the
    /// last `capacity` forms (a duplicate to be dropped), `true` if it is
    /// fresh and was admitted to the window.
    pub fn admit(&mut self, form: &str) -> bool {
        if self.recent.iter().any(|seen| seen == form) {
            return false;
        }
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(form.to_string());
        true
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── comparison_form ──

    #[test]
    fn comparison_strips_csi_sequences() {
        assert_eq!(comparison_form("\x1b[32mHello\x1b[0m"), "Hello");
        assert_eq!(comparison_form("\x1b[1;31mred bold\x1b[0m"), "red bold");
    }

    #[test]
    fn comparison_trims_trailing_whitespace_only() {
        assert_eq!(comparison_form("  indented   \t"), "  indented");
    }

    #[test]
    fn comparison_plain_text_unchanged() {
        assert_eq!(comparison_form("plain line"), "plain line");
    }

    // ── should_ignore ──

    #[test]
    fn ignores_empty_and_whitespace() {
        assert!(should_ignore(""));
        assert!(should_ignore("   "));
    }

    #[test]
    fn ignores_thinking_placeholder() {
        assert!(should_ignore("Thinking..."));
        assert!(should_ignore("thinking…"));
    }

    #[test]
    fn keeps_real_content() {
        assert!(!should_ignore("I am thinking about the fix"));
        assert!(!should_ignore("done"));
    }

    // ── classify_line ──

    #[test]
    fn classify_tool_keywords() {
        assert_eq!(classify_line("Running tests in src/"), MessageKind::Tool);
        assert_eq!(classify_line("Creating file main.rs"), MessageKind::Tool);
        assert_eq!(classify_line("Writing output"), MessageKind::Tool);
    }

    #[test]
    fn classify_error_keywords() {
        assert_eq!(classify_line("Error: no such file"), MessageKind::Error);
        assert_eq!(classify_line("Traceback (most recent call last)"), MessageKind::Error);
        assert_eq!(classify_line("compilation failed"), MessageKind::Error);
    }

    #[test]
    fn classify_system_prefixes() {
        assert_eq!(classify_line("[init] session started"), MessageKind::System);
        assert_eq!(classify_line("System: ready"), MessageKind::System);
    }

    #[test]
    fn classify_defaults_to_agent() {
        assert_eq!(classify_line("Here is the plan"), MessageKind::Agent);
    }

    #[test]
    fn classify_tool_wins_over_system_prefix() {
        // Heuristic order is fixed: keyword checks run before the prefix check.
        assert_eq!(classify_line("[tool] running cargo"), MessageKind::Tool);
    }

    // ── DedupWindow ──

    #[test]
    fn dedup_drops_immediate_repeat() {
        let mut w = DedupWindow::new();
        assert!(w.admit("same line"));
        assert!(!w.admit("same line"));
        assert!(!w.admit("same line"));
    }

    #[test]
    fn dedup_run_with_interleaved_lines() {
        // A run of identical lines interleaved with at most 4 distinct lines
        // emits exactly one copy of each.
        let mut w = DedupWindow::new();
        assert!(w.admit("repeat"));
        assert!(w.admit("a"));
        assert!(w.admit("b"));
        assert!(w.admit("c"));
        assert!(w.admit("d"));
        // "repeat" is still within the window of 5
        assert!(!w.admit("repeat"));
    }

    #[test]
    fn dedup_forgets_beyond_window() {
        let mut w = DedupWindow::new();
        assert!(w.admit("old"));
        for line in ["1", "2", "3", "4", "5"] {
            assert!(w.admit(line));
        }
        // "old" was pushed out of the 5-entry window
        assert!(w.admit("old"));
    }

    #[test]
    fn dedup_distinct_lines_all_admitted() {
        let mut w = DedupWindow::new();
        for i in 0..20 {
            assert!(w.admit(&format!("line {i}")));
        }
    }

    // ── Message ──

    #[test]
    fn message_carries_original_content() {
        let raw = "\x1b[32mgreen\x1b[0m";
        let m = Message::new("s1", MessageKind::Agent, raw);
        assert_eq!(m.content, raw);
        assert_eq!(m.session_id, "s1");
        assert!(m.subtype.is_none());
        assert!(m.metadata.is_empty());
    }

    #[test]
    fn message_subtype_builder() {
        let m = Message::new("s1", MessageKind::User, "hi").with_subtype(MessageSubtype::Prompt);
        assert_eq!(m.subtype, Some(MessageSubtype::Prompt));
    }

    #[test]
    fn message_serializes_snake_case() {
        let m = Message::new("s1", MessageKind::Tool, "x").with_subtype(MessageSubtype::ToolUse);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"kind\":\"tool\""));
        assert!(json.contains("\"subtype\":\"tool_use\""));
    }
}
