//! Sync-state inference from recent container output.
//!
//! This is a heuristic. The worker never reports its state; we search the
//! last few log lines for a completion marker and a handful of progress
//! keywords. A marker that has scrolled out of the window is missed, so a
//! finished run can read as `idle`.

use serde::Serialize;

/// Printed by the worker once a sync pass has finished.
pub const COMPLETION_MARKER: &str = "SYNC COMPLETED";

pub const PROGRESS_KEYWORDS: &[&str] = &["downloading", "syncing", "processing", "fetching"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Stopped,
    Completed,
    Syncing,
    Idle,
    Unknown,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Syncing => "syncing",
            Self::Idle => "idle",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies the log tail of a running container.
pub trait LogMatcher: Send + Sync {
    fn classify(&self, log_tail: &str) -> SyncStatus;
}

/// Substring matcher over the last `window_lines` lines.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    pub completion_marker: String,
    pub progress_keywords: Vec<String>,
    pub window_lines: usize,
}

impl KeywordMatcher {
    pub fn new(window_lines: usize) -> Self {
        Self {
            completion_marker: COMPLETION_MARKER.to_string(),
            progress_keywords: PROGRESS_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            window_lines,
        }
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(200)
    }
}

impl LogMatcher for KeywordMatcher {
    fn classify(&self, log_tail: &str) -> SyncStatus {
        let lines: Vec<&str> = log_tail.lines().collect();
        let window = &lines[lines.len().saturating_sub(self.window_lines)..];

        if window.iter().any(|line| line.contains(&self.completion_marker)) {
            return SyncStatus::Completed;
        }
        let syncing = window.iter().any(|line| {
            let line = line.to_lowercase();
            self.progress_keywords
                .iter()
                .any(|keyword| line.contains(&keyword.to_lowercase()))
        });
        if syncing {
            SyncStatus::Syncing
        } else {
            SyncStatus::Idle
        }
    }
}

/// `log_tail` is `None` when the logs could not be fetched.
pub fn infer_sync_status(running: bool, log_tail: Option<&str>, matcher: &dyn LogMatcher) -> SyncStatus {
    if !running {
        return SyncStatus::Stopped;
    }
    match log_tail {
        Some(tail) => matcher.classify(tail),
        None => SyncStatus::Unknown,
    }
}
