//! Modification-time based incremental builds.
//!
//! There is no cache manifest: the artifact tree itself is the cache. A task
//! is skipped when its artifact exists and is strictly newer than its source.
//!
//! # Algorithm
//!
//! 1. Walk the directory-specific output root once and record the mtime of
//!    every artifact ([`ArtifactIndex::scan`]).
//! 2. For each task ([`filter`]):
//!    - no artifact → run
//!    - artifact newer than source → skip
//!    - otherwise → delete the stale artifact, run, and report the source as
//!      updated
//!
//! The stale artifact is deleted *before* recompilation: a failed rebuild
//! leaves no PDF behind.
//!
//! I/O errors never abort the batch: an unreadable source mtime or a failed
//! deletion is logged and the task is queued anyway.

use crate::types::Task;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Modification times of the artifacts already on disk.
#[derive(Debug, Default)]
pub struct ArtifactIndex {
    mtimes: HashMap<PathBuf, SystemTime>,
}

impl ArtifactIndex {
    /// Record every `*.{extension}` file under `root`.
    ///
    /// A missing root yields an empty index. Entries that vanish or cannot
    /// be read mid-walk are left out.
    pub fn scan(root: &Path, extension: &str) -> Self {
        let mut mtimes = HashMap::new();
        if !root.is_dir() {
            return Self { mtimes };
        }
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file()
                || entry.path().extension().is_none_or(|e| e != extension)
            {
                continue;
            }
            match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(mtime)) => {
                    mtimes.insert(entry.into_path(), mtime);
                }
                _ => debug!(path = %entry.path().display(), "artifact vanished during scan"),
            }
        }
        Self { mtimes }
    }

    pub fn get(&self, artifact: &Path) -> Option<SystemTime> {
        self.mtimes.get(artifact).copied()
    }

    pub fn len(&self) -> usize {
        self.mtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mtimes.is_empty()
    }
}

/// Result of partitioning a directory's tasks.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Tasks that must run, in discovery order.
    pub queued: Vec<Task>,
    /// Tasks whose artifact is up to date.
    pub skipped: usize,
    /// Sources whose stale artifact was deleted.
    pub updated_sources: Vec<PathBuf>,
}

impl FilterOutcome {
    /// Every task runs; nothing is skipped or reported as updated.
    pub fn run_all(tasks: Vec<Task>) -> Self {
        Self {
            queued: tasks,
            ..Default::default()
        }
    }
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let updated = self.updated_sources.len();
        let new = self.queued.len() - updated;
        if self.skipped > 0 || updated > 0 {
            write!(
                f,
                "{} up to date, {} updated, {} new",
                self.skipped, updated, new
            )
        } else {
            write!(f, "{} new", new)
        }
    }
}

/// Fresh iff the artifact is strictly newer than the source.
pub fn is_fresh(source_mtime: SystemTime, artifact_mtime: SystemTime) -> bool {
    artifact_mtime > source_mtime
}

/// Partition `tasks` against the artifacts recorded in `index`.
pub fn filter(tasks: Vec<Task>, index: &ArtifactIndex) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for task in tasks {
        let Some(artifact_mtime) = index.get(&task.output_path) else {
            outcome.queued.push(task);
            continue;
        };

        let source_mtime = match std::fs::metadata(&task.input_path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(
                    source = %task.input_path.display(),
                    error = %e,
                    "cannot read source mtime, recompiling"
                );
                outcome.queued.push(task);
                continue;
            }
        };

        if is_fresh(source_mtime, artifact_mtime) {
            outcome.skipped += 1;
            continue;
        }

        debug!(source = %task.input_path.display(), "source changed, removing stale artifact");
        if let Err(e) = std::fs::remove_file(&task.output_path) {
            warn!(
                artifact = %task.output_path.display(),
                error = %e,
                "failed to delete stale artifact, compiler will overwrite it"
            );
        }
        outcome.updated_sources.push(task.input_path.clone());
        outcome.queued.push(task);
    }

    outcome
}
