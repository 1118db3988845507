//! Toolchain benchmark: time alternative toolchains over the same sources.
//!
//! For each loop and each alternative, the alternative's namespace
//! (`output_root/<alternative>/`) is wiped and the source directory is
//! compiled from scratch into it. Every pass is a full, non-incremental
//! compile, so the timings are comparable.
//!
//! ```text
//! loop 1: pandoc  typst
//! loop 2: pandoc  typst
//! loop 3: pandoc  typst      → 6 timed runs → per-alternative totals → winner
//! ```
//!
//! [`summarize`] is pure; it only folds recorded runs.

use crate::adapter::Toolchain;
use crate::compile::{self, CompileError, CompileEvent, CompileOptions, DirectoryJob};
use crate::config::MarkdownCompiler;
use crate::types::as_secs;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("Failed to clear {path}: {source}")]
    Clean { path: PathBuf, source: io::Error },
}

/// One candidate toolchain.
#[derive(Debug)]
pub struct Alternative {
    /// Used as the output namespace and in reports.
    pub name: String,
    pub toolchain: Toolchain,
}

impl Alternative {
    pub fn new(name: &str, toolchain: Toolchain) -> Self {
        Self {
            name: name.to_string(),
            toolchain,
        }
    }

    /// A Markdown toolchain, named after its compiler.
    pub fn markdown(compiler: MarkdownCompiler, font: &str) -> Self {
        Self::new(compiler.name(), Toolchain::for_markdown(compiler, font))
    }
}

/// What to benchmark.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkJob<'a> {
    pub source_dir: &'a Path,
    pub output_root: &'a Path,
    /// Source extension without the dot.
    pub extension: &'a str,
}

/// One timed full compilation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRun {
    /// 1-based.
    pub loop_index: u32,
    pub alternative: String,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    pub success: usize,
    pub failure: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternativeStats {
    pub name: String,
    #[serde(serialize_with = "as_secs")]
    pub total: Duration,
    #[serde(serialize_with = "as_secs")]
    pub average: Duration,
    pub runs: u32,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub runs: Vec<BenchmarkRun>,
    /// In the order alternatives were first run.
    pub alternatives: Vec<AlternativeStats>,
    /// Alternative with the lowest total time.
    pub winner: Option<String>,
}

/// Run `loops` passes of every alternative over `job.source_dir`.
pub fn run_benchmark(
    job: &BenchmarkJob<'_>,
    alternatives: &[Alternative],
    loops: u32,
    options: &CompileOptions,
    events: Option<&Sender<CompileEvent>>,
) -> Result<BenchmarkReport, BenchmarkError> {
    let options = CompileOptions {
        incremental: false,
        ..options.clone()
    };
    let mut runs = Vec::new();

    for loop_index in 1..=loops {
        for alternative in alternatives {
            let namespace = job.output_root.join(&alternative.name);
            clear(&namespace)?;

            let directory = DirectoryJob {
                label: &alternative.name,
                source_dir: job.source_dir,
                output_root: &namespace,
                extension: job.extension,
                toolchain: &alternative.toolchain,
                post_hook: None,
            };
            let started = Instant::now();
            let report = compile::compile_directory(&directory, &options, events)?;
            let duration = started.elapsed();

            info!(
                loop_index,
                alternative = %alternative.name,
                secs = duration.as_secs_f64(),
                failures = report.failure_count,
                "benchmark run finished"
            );
            runs.push(BenchmarkRun {
                loop_index,
                alternative: alternative.name.clone(),
                duration,
                success: report.success_count,
                failure: report.failure_count,
            });
        }
    }

    Ok(summarize(runs))
}

fn clear(dir: &Path) -> Result<(), BenchmarkError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "cleared benchmark output");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BenchmarkError::Clean {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Fold runs into per-alternative totals and pick the winner.
pub fn summarize(runs: Vec<BenchmarkRun>) -> BenchmarkReport {
    let mut alternatives: Vec<AlternativeStats> = Vec::new();
    for run in &runs {
        let stats = match alternatives.iter().position(|s| s.name == run.alternative) {
            Some(i) => &mut alternatives[i],
            None => {
                alternatives.push(AlternativeStats {
                    name: run.alternative.clone(),
                    total: Duration::ZERO,
                    average: Duration::ZERO,
                    runs: 0,
                    failures: 0,
                });
                let last = alternatives.len() - 1;
                &mut alternatives[last]
            }
        };
        stats.total += run.duration;
        stats.runs += 1;
        stats.failures += run.failure;
    }
    for stats in &mut alternatives {
        stats.average = stats.total / stats.runs.max(1);
    }

    let winner = alternatives
        .iter()
        .min_by_key(|s| s.total)
        .map(|s| s.name.clone());

    BenchmarkReport {
        runs,
        alternatives,
        winner,
    }
}
