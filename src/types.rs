//! Shared types passed between pipeline components.
//!
//! A [`Task`] is produced by discovery, filtered by the incremental check,
//! executed by the worker pool into a [`TaskResult`], and folded into a
//! [`DirectoryReport`]. Reports serialize to JSON for the `--report` flag;
//! durations are written as fractional seconds.

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One source-file-to-artifact compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Source document.
    pub input_path: PathBuf,
    /// Final artifact, e.g. `output/md_notes/sub/intro.pdf`.
    pub output_path: PathBuf,
    /// Directory containing `output_path`. Created before the command runs.
    pub output_dir: PathBuf,
    /// Extra compiler arguments attached per format from config.
    pub extra_args: Vec<String>,
}

impl Task {
    /// The source file name, used as the task's display identity.
    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }

    /// The source file stem (`intro` for `intro.md`).
    pub fn stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Timing of each half of a two-stage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDurations {
    #[serde(serialize_with = "as_secs")]
    pub convert: Duration,
    #[serde(serialize_with = "as_secs")]
    pub compile: Duration,
}

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The output directory could not be prepared.
    Setup,
    /// The compiler process could not be started (usually a missing executable).
    Launch,
    /// The compiler exited unsuccessfully. `None` when killed by a signal.
    ExitStatus(Option<i32>),
    /// Stage 1 of a two-stage pipeline failed; stage 2 never ran.
    Stage1,
    /// The worker panicked while building or running the command.
    Worker,
}

/// Outcome of executing one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success {
        #[serde(serialize_with = "as_secs")]
        duration: Duration,
        #[serde(skip_serializing_if = "Option::is_none")]
        stages: Option<StageDurations>,
    },
    Failure {
        kind: FailureKind,
        /// Compiler stderr (stdout if stderr was empty), or the launch error.
        message: String,
        #[serde(serialize_with = "as_secs")]
        partial_duration: Duration,
    },
}

/// Result of one executed task. Created exactly once per executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub file_name: String,
    pub source: PathBuf,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn success(task: &Task, duration: Duration, stages: Option<StageDurations>) -> Self {
        Self {
            file_name: task.file_name(),
            source: task.input_path.clone(),
            outcome: TaskOutcome::Success { duration, stages },
        }
    }

    pub fn failure(
        task: &Task,
        kind: FailureKind,
        message: impl Into<String>,
        partial_duration: Duration,
    ) -> Self {
        Self {
            file_name: task.file_name(),
            source: task.input_path.clone(),
            outcome: TaskOutcome::Failure {
                kind,
                message: message.into(),
                partial_duration,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success { .. })
    }

    /// Wall time spent on the task, partial for failures.
    pub fn duration(&self) -> Duration {
        match &self.outcome {
            TaskOutcome::Success { duration, .. } => *duration,
            TaskOutcome::Failure {
                partial_duration, ..
            } => *partial_duration,
        }
    }

    /// Human-readable log text for the task.
    pub fn log_text(&self) -> String {
        match &self.outcome {
            TaskOutcome::Success { .. } => format!("compiled '{}'", self.file_name),
            TaskOutcome::Failure { message, .. } => message.clone(),
        }
    }
}

/// Aggregate of one format over one source directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryReport {
    pub format_name: String,
    pub source_dir: PathBuf,
    /// Directory-specific output root (`output_root/<source_dir_name>`).
    pub output_dir: PathBuf,
    pub success_count: usize,
    pub failure_count: usize,
    /// Tasks skipped because their artifact was fresh.
    pub skipped_count: usize,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    /// Sources whose stale artifact was deleted and re-queued.
    pub updated_sources: Vec<PathBuf>,
    pub failed_files: Vec<String>,
}

impl DirectoryReport {
    pub fn new(format_name: &str, source_dir: &Path, output_dir: &Path) -> Self {
        Self {
            format_name: format_name.to_string(),
            source_dir: source_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            ..Default::default()
        }
    }

    /// Fold one task result into the counts.
    pub fn record(&mut self, result: &TaskResult) {
        match &result.outcome {
            TaskOutcome::Success { .. } => self.success_count += 1,
            TaskOutcome::Failure { .. } => {
                self.failure_count += 1;
                self.failed_files.push(result.file_name.clone());
            }
        }
    }

    /// Number of tasks that actually ran.
    pub fn executed(&self) -> usize {
        self.success_count + self.failure_count
    }
}

pub(crate) fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
