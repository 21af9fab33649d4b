use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::{Component, Path, PathBuf};

// ============================================================================
// Task Models
// ============================================================================

/// TaskRecord is a registered repository with its scheduling policy.
///
/// Records are owned by the task registry; the path is the natural key and
/// re-registering a path replaces the record under a fresh ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TaskRecord {
    pub id: i64,
    pub path: String,
    /// Interval string, e.g. `5m` or `1h30m`
    pub every: String,
    pub auto_add: bool,
    pub auto_push: bool,
    /// Static fallback commit message, empty when not configured
    pub static_msg: String,
    /// Comma-separated glob patterns excluded from auto-staging
    pub exclude_patterns: String,
}

impl TaskRecord {
    /// Static message, if one is configured
    pub fn static_message(&self) -> Option<&str> {
        if self.static_msg.trim().is_empty() {
            None
        } else {
            Some(&self.static_msg)
        }
    }

    /// Exclude patterns, trimmed, with empty entries dropped
    pub fn excludes(&self) -> Vec<String> {
        split_patterns(&self.exclude_patterns)
    }
}

/// NewTask is the registration payload for an upsert-by-path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub path: String,
    pub every: String,
    pub auto_add: bool,
    pub auto_push: bool,
    pub static_msg: String,
    pub exclude_patterns: String,
}

/// Split a comma-separated pattern list into trimmed, non-empty patterns
pub fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lexically clean a repository path
///
/// Drops `.` components and trailing separators and folds `..` into its
/// parent, without touching the filesystem. Every spelling of one directory
/// maps to the same registry key.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// [`normalize_path`] for paths stored as strings
pub fn normalize_path_str(path: &str) -> String {
    normalize_path(Path::new(path)).to_string_lossy().into_owned()
}

// ============================================================================
// Execution Models
// ============================================================================

/// ExecutionContext is an immutable snapshot of a task taken at dispatch time.
///
/// Registry edits made while a run is in flight never reach the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub task_id: i64,
    pub path: PathBuf,
    pub auto_add: bool,
    pub auto_push: bool,
    pub static_message: Option<String>,
    pub excludes: Vec<String>,
}

impl From<&TaskRecord> for ExecutionContext {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id,
            path: normalize_path(Path::new(&record.path)),
            auto_add: record.auto_add,
            auto_push: record.auto_push,
            static_message: record.static_message().map(str::to_string),
            excludes: record.excludes(),
        }
    }
}

/// Pipeline step at which a run was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Open,
    ChangeDetection,
    Staging,
    Diff,
    Message,
    Commit,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Open => "open",
            PipelineStage::ChangeDetection => "change_detection",
            PipelineStage::Staging => "staging",
            PipelineStage::Diff => "diff",
            PipelineStage::Message => "message",
            PipelineStage::Commit => "commit",
        }
    }
}

/// Result of the push step of a run that produced a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Auto-push is not enabled for the task
    Disabled,
    Pushed,
    Failed(String),
}

/// Terminal outcome of a single execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Working tree is clean
    NoChanges,
    /// Auto-stage disabled and nothing was staged by hand
    NoStagedChanges,
    /// Nothing staged at commit time
    NothingToCommit,
    Committed { message: String, push: PushOutcome },
    Aborted { stage: PipelineStage, reason: String },
}

impl RunOutcome {
    pub fn committed(&self) -> bool {
        matches!(self, RunOutcome::Committed { .. })
    }

    pub fn pushed(&self) -> bool {
        matches!(
            self,
            RunOutcome::Committed {
                push: PushOutcome::Pushed,
                ..
            }
        )
    }

    /// Label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::NoChanges => "no_changes",
            RunOutcome::NoStagedChanges => "no_staged_changes",
            RunOutcome::NothingToCommit => "nothing_to_commit",
            RunOutcome::Committed {
                push: PushOutcome::Failed(_),
                ..
            } => "push_failed",
            RunOutcome::Committed { .. } => "committed",
            RunOutcome::Aborted { .. } => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord {
            id: 7,
            path: "/srv/notes".to_string(),
            every: "5m".to_string(),
            auto_add: true,
            auto_push: false,
            static_msg: "  ".to_string(),
            exclude_patterns: " *.log, ,target/**,".to_string(),
        }
    }

    #[test]
    fn test_blank_static_message_is_none() {
        assert_eq!(record().static_message(), None);
    }

    #[test]
    fn test_static_message_is_kept_verbatim() {
        let mut rec = record();
        rec.static_msg = "  wip  ".to_string();
        assert_eq!(rec.static_message(), Some("  wip  "));
        assert_eq!(
            ExecutionContext::from(&rec).static_message.as_deref(),
            Some("  wip  ")
        );
    }

    #[test]
    fn test_excludes_are_trimmed_and_filtered() {
        assert_eq!(record().excludes(), vec!["*.log", "target/**"]);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/srv/repo/")), PathBuf::from("/srv/repo"));
        assert_eq!(normalize_path(Path::new("/srv/x/../repo")), PathBuf::from("/srv/repo"));
        assert_eq!(normalize_path(Path::new("/srv/./repo/.")), PathBuf::from("/srv/repo"));
        assert_eq!(normalize_path(Path::new("/../srv")), PathBuf::from("/srv"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
        assert_eq!(normalize_path_str("/srv/repo/"), normalize_path_str("/srv/repo"));
    }

    #[test]
    fn test_execution_context_is_a_snapshot() {
        let mut rec = record();
        let ctx = ExecutionContext::from(&rec);
        rec.auto_push = true;
        rec.static_msg = "later edit".to_string();

        assert_eq!(ctx.task_id, 7);
        assert!(!ctx.auto_push);
        assert_eq!(ctx.static_message, None);
        assert_eq!(ctx.path, PathBuf::from("/srv/notes"));
    }

    #[test]
    fn test_run_outcome_flags() {
        let pushed = RunOutcome::Committed {
            message: "chore: x".to_string(),
            push: PushOutcome::Pushed,
        };
        assert!(pushed.committed());
        assert!(pushed.pushed());

        let push_failed = RunOutcome::Committed {
            message: "chore: x".to_string(),
            push: PushOutcome::Failed("rejected".to_string()),
        };
        assert!(push_failed.committed());
        assert!(!push_failed.pushed());
        assert_eq!(push_failed.label(), "push_failed");

        assert!(!RunOutcome::NothingToCommit.committed());
    }
}
