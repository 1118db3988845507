//! Directory compilation: discover → filter → execute → post-hook.
//!
//! [`compile_directory`] is the unit the dispatcher and the benchmark runner
//! build on. It compiles one source directory with one toolchain into
//! `output_root/<source_dir_name>/` and returns a [`DirectoryReport`].
//!
//! ```text
//! discover(source)            all *.ext files → tasks
//!   │
//!   ├─ incremental: filter    drop fresh tasks, delete stale artifacts
//!   │
//! executor.run(tasks)         parallel subprocesses, results as they finish
//!   │
//! post_hook(output dir)       once, only if something ran
//! ```
//!
//! Progress is reported through an optional [`CompileEvent`] channel so the
//! CLI can print while workers are still running.

use crate::adapter::Toolchain;
use crate::discover::{self, DiscoverError};
use crate::executor::Executor;
use crate::format::ARTIFACT_EXTENSION;
use crate::incremental::{self, ArtifactIndex, FilterOutcome};
use crate::types::{DirectoryReport, TaskResult};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoverError),
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A directory-scoped step run after all of the directory's tasks finished.
pub type PostHook = fn(&Path);

/// What to compile.
pub struct DirectoryJob<'a> {
    /// Format name used in reports (`"Markdown"`, `"pandoc"`, ...).
    pub label: &'a str,
    pub source_dir: &'a Path,
    pub output_root: &'a Path,
    /// Source extension without the dot.
    pub extension: &'a str,
    pub toolchain: &'a Toolchain,
    pub post_hook: Option<PostHook>,
}

/// How to compile it.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub workers: usize,
    /// Skip tasks whose artifact is fresh.
    pub incremental: bool,
    /// Appended to every task's command.
    pub extra_args: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            incremental: true,
            extra_args: Vec::new(),
        }
    }
}

/// Progress events emitted while compiling.
#[derive(Debug, Clone)]
pub enum CompileEvent {
    DirectoryStarted {
        label: String,
        source_dir: PathBuf,
        output_dir: PathBuf,
        workers: usize,
        queued: usize,
        skipped: usize,
    },
    TaskFinished(TaskResult),
}

/// Compile every matching file under `job.source_dir`.
///
/// Task-level failures are counted in the report, never returned as errors.
/// Only a missing/unreadable source directory or a pool that cannot start
/// abort the directory.
pub fn compile_directory(
    job: &DirectoryJob<'_>,
    options: &CompileOptions,
    events: Option<&Sender<CompileEvent>>,
) -> Result<DirectoryReport, CompileError> {
    let started = Instant::now();
    let output_dir = discover::output_root_for(job.source_dir, job.output_root)?;
    let mut report = DirectoryReport::new(job.label, job.source_dir, &output_dir);

    let mut tasks = discover::discover(
        job.source_dir,
        job.output_root,
        job.extension,
        ARTIFACT_EXTENSION,
    )?;
    for task in &mut tasks {
        task.extra_args.clone_from(&options.extra_args);
    }

    let filtered = if options.incremental {
        let index = ArtifactIndex::scan(&output_dir, ARTIFACT_EXTENSION);
        debug!(artifacts = index.len(), dir = %output_dir.display(), "scanned existing artifacts");
        incremental::filter(tasks, &index)
    } else {
        FilterOutcome::run_all(tasks)
    };
    debug!(label = job.label, "{filtered}");

    report.skipped_count = filtered.skipped;
    report.updated_sources = filtered.updated_sources;

    let executor = Executor::new(options.workers)?;
    emit(
        events,
        CompileEvent::DirectoryStarted {
            label: job.label.to_string(),
            source_dir: job.source_dir.to_path_buf(),
            output_dir: output_dir.clone(),
            workers: executor.workers(),
            queued: filtered.queued.len(),
            skipped: filtered.skipped,
        },
    );

    executor.run(&filtered.queued, job.toolchain, |result| {
        report.record(&result);
        emit(events, CompileEvent::TaskFinished(result));
    });

    if report.executed() > 0
        && let Some(hook) = job.post_hook
    {
        hook(&output_dir);
    }

    report.duration = started.elapsed();
    Ok(report)
}

fn emit(events: Option<&Sender<CompileEvent>>, event: CompileEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening.
        let _ = tx.send(event);
    }
}

/// Extensions of the auxiliary files a TeX run leaves next to its PDF.
pub const TEX_AUXILIARY_EXTENSIONS: &[&str] = &["aux", "log", "out"];

/// Remove TeX auxiliary files under `dir`. Returns how many were removed.
pub fn remove_auxiliary_files(dir: &Path) -> usize {
    let mut removed = 0;
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        let is_auxiliary = entry.file_type().is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| TEX_AUXILIARY_EXTENSIONS.contains(&e));
        if !is_auxiliary {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed auxiliary file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove auxiliary file"),
        }
    }
    removed
}

/// Post-hook for TeX directories.
pub fn cleanup_tex_auxiliary(dir: &Path) {
    let removed = remove_auxiliary_files(dir);
    info!(dir = %dir.display(), removed, "cleaned TeX auxiliary files");
}
