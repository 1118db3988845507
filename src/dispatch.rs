//! Auto dispatch: compile every format folder under a parent directory.
//!
//! Each immediate subfolder is matched to a [`Format`] by the token before
//! its first `_` (see [`Format::from_folder_name`]), then compiled with that
//! format's toolchain into `output_root/<folder>/`.
//!
//! ```text
//! content/
//! ├── latex_thesis/   → TeX       → output/latex_thesis/
//! ├── md_notes/       → Markdown  → output/md_notes/
//! ├── md_blog/        → Markdown  → output/md_blog/
//! ├── rst_api/        → RST (not in compile_types: skipped)
//! └── assets/         → no match: ignored
//! ```
//!
//! Folders are visited in name order. A folder that fails at directory level
//! is recorded in the summary and the run moves on; only an unreadable
//! parent directory aborts the whole run.

use crate::adapter::Toolchain;
use crate::compile::{self, CompileEvent, CompileOptions, DirectoryJob, PostHook};
use crate::config::CompileConfig;
use crate::format::Format;
use crate::types::{DirectoryReport, as_secs};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Cannot read source directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A subfolder that will be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFolder {
    pub name: String,
    pub path: PathBuf,
    pub format: Format,
}

/// A subfolder whose format is not in the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFolder {
    pub name: String,
    pub format: Format,
}

/// A subfolder whose compilation failed before any task ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFolder {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub folders: Vec<PlannedFolder>,
    pub skipped: Vec<SkippedFolder>,
}

/// Per-format totals over every folder of that format.
#[derive(Debug, Clone, Serialize)]
pub struct FormatSummary {
    pub format: Format,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    pub updated: usize,
    pub directories: Vec<DirectoryReport>,
}

impl FormatSummary {
    fn new(format: Format) -> Self {
        Self {
            format,
            duration: Duration::ZERO,
            success: 0,
            failure: 0,
            skipped: 0,
            updated: 0,
            directories: Vec::new(),
        }
    }

    fn add(&mut self, report: DirectoryReport) {
        self.duration += report.duration;
        self.success += report.success_count;
        self.failure += report.failure_count;
        self.skipped += report.skipped_count;
        self.updated += report.updated_sources.len();
        self.directories.push(report);
    }

    /// Tasks that actually ran.
    pub fn executed(&self) -> usize {
        self.success + self.failure
    }

    /// Mean wall-clock time per executed file, if any ran.
    pub fn average_per_file(&self) -> Option<Duration> {
        let executed = u32::try_from(self.executed()).ok().filter(|n| *n > 0)?;
        Some(self.duration / executed)
    }
}

/// Outcome of a whole dispatch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// In the order each format was first encountered.
    pub formats: Vec<FormatSummary>,
    pub skipped_folders: Vec<SkippedFolder>,
    pub failed_dirs: Vec<FailedFolder>,
}

impl RunSummary {
    fn entry(&mut self, format: Format) -> &mut FormatSummary {
        match self.formats.iter().position(|s| s.format == format) {
            Some(i) => &mut self.formats[i],
            None => {
                self.formats.push(FormatSummary::new(format));
                let last = self.formats.len() - 1;
                &mut self.formats[last]
            }
        }
    }

    /// Failed tasks plus failed folders.
    pub fn total_failures(&self) -> usize {
        self.formats.iter().map(|f| f.failure).sum::<usize>() + self.failed_dirs.len()
    }

    pub fn format(&self, format: Format) -> Option<&FormatSummary> {
        self.formats.iter().find(|s| s.format == format)
    }
}

/// Classify the immediate subfolders of `parent`, in name order.
pub fn plan(parent: &Path, allowed: &[Format]) -> Result<Plan, DispatchError> {
    let read_err = |source| DispatchError::ReadDir {
        path: parent.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in fs::read_dir(parent).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    dirs.sort();

    let mut plan = Plan::default();
    for (name, path) in dirs {
        let Some(format) = Format::from_folder_name(&name) else {
            debug!(folder = %name, "no format keyword, ignoring");
            continue;
        };
        if !allowed.contains(&format) {
            info!(folder = %name, format = %format, "format not enabled, skipping");
            plan.skipped.push(SkippedFolder { name, format });
            continue;
        }
        plan.folders.push(PlannedFolder { name, path, format });
    }
    Ok(plan)
}

/// The subfolders of `parent` belonging to `format`, in name order.
///
/// Folders of other formats are left out silently.
pub fn folders_of(parent: &Path, format: Format) -> Result<Vec<PlannedFolder>, DispatchError> {
    let mut folders = plan(parent, &Format::ALL)?.folders;
    folders.retain(|f| f.format == format);
    Ok(folders)
}

/// The directory hook for a format.
pub fn post_hook_for(format: Format) -> Option<PostHook> {
    match format {
        Format::Tex => Some(compile::cleanup_tex_auxiliary),
        _ => None,
    }
}

/// Compile every enabled format folder under `parent` with the configured
/// toolchains.
pub fn run(
    parent: &Path,
    output_root: &Path,
    config: &CompileConfig,
    workers: usize,
    events: Option<&Sender<CompileEvent>>,
) -> Result<RunSummary, DispatchError> {
    run_with(parent, output_root, config, workers, events, |format| {
        Toolchain::for_format(format, config)
    })
}

/// [`run`] with a caller-supplied toolchain per format.
pub fn run_with<F>(
    parent: &Path,
    output_root: &Path,
    config: &CompileConfig,
    workers: usize,
    events: Option<&Sender<CompileEvent>>,
    toolchain_for: F,
) -> Result<RunSummary, DispatchError>
where
    F: Fn(Format) -> Toolchain,
{
    let plan = plan(parent, &config.allowed_formats())?;
    let mut summary = RunSummary {
        skipped_folders: plan.skipped,
        ..Default::default()
    };

    for folder in &plan.folders {
        let toolchain = toolchain_for(folder.format);
        debug!(folder = %folder.name, toolchain = toolchain.name(), "compiling folder");
        let job = DirectoryJob {
            label: folder.format.name(),
            source_dir: &folder.path,
            output_root,
            extension: folder.format.extension(),
            toolchain: &toolchain,
            post_hook: post_hook_for(folder.format),
        };
        let options = CompileOptions {
            workers,
            incremental: config.incremental,
            extra_args: config.extra_args_for(folder.format),
        };
        match compile::compile_directory(&job, &options, events) {
            Ok(report) => summary.entry(folder.format).add(report),
            Err(e) => {
                warn!(folder = %folder.name, error = %e, "folder failed");
                summary.failed_dirs.push(FailedFolder {
                    name: folder.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(summary)
}
