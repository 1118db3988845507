//! CLI output formatting for compile progress, run summaries and benchmarks.
//!
//! # Output Format
//!
//! ## Progress
//!
//! One header per directory, then one line per task as it finishes
//! (completion order). Failures carry the compiler log in a delimited block.
//!
//! ```text
//! Markdown: content/md_notes → output/md_notes (2 to compile, 1 up to date, 8 workers)
//!     ✓ intro.md (1.20s)
//!     ✗ broken.md: exit status 43 (0.31s)
//!         ---- compiler log ----
//!         Error producing PDF.
//!         ----------------------
//! ```
//!
//! ## Run summary
//!
//! ```text
//! Summary
//! Format         Total  Avg/file    OK  Failed  Skipped  Updated
//! TeX           12.30s     6.15s     2       0        1        0
//! Markdown       3.10s     1.03s     2       1        0        1
//!
//! Skipped folders
//!     rst_api (RST)
//!
//! Total: 4 compiled, 1 failed, 1 up to date
//! ```
//!
//! ## Benchmark
//!
//! ```text
//! Benchmark: content/md_notes (3 loops)
//!     #1 pandoc: 1.20s
//!     #1 typst: 0.80s
//!     ...
//! Results
//!     pandoc: total 3.60s, avg 1.20s over 3 runs
//!     typst: total 2.40s, avg 0.80s over 3 runs
//! Winner: typst
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::benchmark::BenchmarkReport;
use crate::compile::CompileEvent;
use crate::dispatch::{FormatSummary, RunSummary};
use crate::types::{DirectoryReport, FailureKind, TaskOutcome, TaskResult};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Seconds with two decimals: `1.23s`.
pub fn format_secs(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// Whole-run wall time as `HH:MM:SS`.
pub fn format_duration_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn failure_reason(kind: &FailureKind) -> String {
    match kind {
        FailureKind::Setup => "output directory setup failed".to_string(),
        FailureKind::Launch => "compiler could not be started".to_string(),
        FailureKind::ExitStatus(Some(code)) => format!("exit status {code}"),
        FailureKind::ExitStatus(None) => "killed by signal".to_string(),
        FailureKind::Stage1 => "conversion failed".to_string(),
        FailureKind::Worker => "worker panicked".to_string(),
    }
}

const LOG_OPEN: &str = "---- compiler log ----";
const LOG_CLOSE: &str = "----------------------";

// ============================================================================
// Progress
// ============================================================================

/// Format one task result.
///
/// ```text
///     ✓ intro.md (1.20s)
///     ✓ notes.md (0.90s: convert 0.20s, compile 0.70s)
///     ✗ broken.md: exit status 1 (0.05s)
/// ```
pub fn format_task_result(result: &TaskResult) -> Vec<String> {
    match &result.outcome {
        TaskOutcome::Success {
            duration,
            stages: None,
        } => vec![format!(
            "{}✓ {} ({})",
            indent(1),
            result.file_name,
            format_secs(*duration)
        )],
        TaskOutcome::Success {
            duration,
            stages: Some(stages),
        } => vec![format!(
            "{}✓ {} ({}: convert {}, compile {})",
            indent(1),
            result.file_name,
            format_secs(*duration),
            format_secs(stages.convert),
            format_secs(stages.compile)
        )],
        TaskOutcome::Failure {
            kind,
            message,
            partial_duration,
        } => {
            let mut lines = vec![format!(
                "{}✗ {}: {} ({})",
                indent(1),
                result.file_name,
                failure_reason(kind),
                format_secs(*partial_duration)
            )];
            if !message.trim().is_empty() {
                lines.push(format!("{}{}", indent(2), LOG_OPEN));
                lines.extend(
                    message
                        .trim_end()
                        .lines()
                        .map(|l| format!("{}{}", indent(2), l)),
                );
                lines.push(format!("{}{}", indent(2), LOG_CLOSE));
            }
            lines
        }
    }
}

/// Format a single progress event as display lines.
pub fn format_compile_event(event: &CompileEvent) -> Vec<String> {
    match event {
        CompileEvent::DirectoryStarted {
            label,
            source_dir,
            output_dir,
            workers,
            queued,
            skipped,
        } => vec![format!(
            "{}: {} \u{2192} {} ({} to compile, {} up to date, {} workers)",
            label,
            source_dir.display(),
            output_dir.display(),
            queued,
            skipped,
            workers
        )],
        CompileEvent::TaskFinished(result) => format_task_result(result),
    }
}

pub fn print_compile_event(event: &CompileEvent) {
    for line in format_compile_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// Directory report
// ============================================================================

/// Format the result of a single-directory compile.
pub fn format_directory_report(report: &DirectoryReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} \u{2192} {}",
        report.format_name,
        report.source_dir.display(),
        report.output_dir.display()
    )];
    lines.push(format!(
        "{}{} compiled, {} failed, {} up to date ({})",
        indent(1),
        report.success_count,
        report.failure_count,
        report.skipped_count,
        format_secs(report.duration)
    ));
    for source in &report.updated_sources {
        lines.push(format!("{}Updated: {}", indent(1), source.display()));
    }
    for file in &report.failed_files {
        lines.push(format!("{}Failed: {}", indent(1), file));
    }
    lines
}

pub fn print_directory_report(report: &DirectoryReport) {
    for line in format_directory_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Run summary
// ============================================================================

fn summary_row(format: &str, total: &str, average: &str, counts: [String; 4]) -> String {
    let [ok, failed, skipped, updated] = counts;
    format!("{format:<10}{total:>10}{average:>10}{ok:>6}{failed:>8}{skipped:>9}{updated:>9}")
}

fn format_summary_row(summary: &FormatSummary) -> String {
    summary_row(
        summary.format.name(),
        &format_secs(summary.duration),
        &summary
            .average_per_file()
            .map(format_secs)
            .unwrap_or_else(|| "-".to_string()),
        [
            summary.success.to_string(),
            summary.failure.to_string(),
            summary.skipped.to_string(),
            summary.updated.to_string(),
        ],
    )
}

/// Format the per-format table printed after an auto run.
pub fn format_run_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec!["Summary".to_string()];
    if summary.formats.is_empty() {
        lines.push(format!("{}No format folders compiled", indent(1)));
    } else {
        lines.push(summary_row(
            "Format",
            "Total",
            "Avg/file",
            [
                "OK".to_string(),
                "Failed".to_string(),
                "Skipped".to_string(),
                "Updated".to_string(),
            ],
        ));
        lines.extend(summary.formats.iter().map(format_summary_row));
    }

    if !summary.skipped_folders.is_empty() {
        lines.push(String::new());
        lines.push("Skipped folders".to_string());
        for folder in &summary.skipped_folders {
            lines.push(format!("{}{} ({})", indent(1), folder.name, folder.format));
        }
    }

    if !summary.failed_dirs.is_empty() {
        lines.push(String::new());
        lines.push("Failed folders".to_string());
        for folder in &summary.failed_dirs {
            lines.push(format!("{}{}: {}", indent(1), folder.name, folder.error));
        }
    }

    let (compiled, failed, skipped) = summary
        .formats
        .iter()
        .fold((0, 0, 0), |(c, f, s), fs| (c + fs.success, f + fs.failure, s + fs.skipped));
    lines.push(String::new());
    lines.push(format!(
        "Total: {} compiled, {} failed, {} up to date",
        compiled, failed, skipped
    ));
    lines
}

pub fn print_run_summary(summary: &RunSummary) {
    for line in format_run_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Benchmark
// ============================================================================

/// Format a benchmark report for one source directory.
pub fn format_benchmark_report(source_dir: &Path, report: &BenchmarkReport) -> Vec<String> {
    let loops = report.runs.iter().map(|r| r.loop_index).max().unwrap_or(0);
    let mut lines = vec![format!(
        "Benchmark: {} ({} loops)",
        source_dir.display(),
        loops
    )];
    for run in &report.runs {
        let mut line = format!(
            "{}#{} {}: {}",
            indent(1),
            run.loop_index,
            run.alternative,
            format_secs(run.duration)
        );
        if run.failure > 0 {
            line.push_str(&format!(" ({} failed)", run.failure));
        }
        lines.push(line);
    }

    if report.alternatives.is_empty() {
        lines.push(format!("{}No runs", indent(1)));
        return lines;
    }

    lines.push("Results".to_string());
    for stats in &report.alternatives {
        let mut line = format!(
            "{}{}: total {}, avg {} over {} runs",
            indent(1),
            stats.name,
            format_secs(stats.total),
            format_secs(stats.average),
            stats.runs
        );
        if stats.failures > 0 {
            line.push_str(&format!(", {} failures", stats.failures));
        }
        lines.push(line);
    }
    if let Some(winner) = &report.winner {
        let failures = report
            .alternatives
            .iter()
            .find(|s| &s.name == winner)
            .map_or(0, |s| s.failures);
        if failures > 0 {
            lines.push(format!(
                "Winner: {} (had {} failures, timings may not be comparable)",
                winner, failures
            ));
        } else {
            lines.push(format!("Winner: {}", winner));
        }
    }
    lines
}

pub fn print_benchmark_report(source_dir: &Path, report: &BenchmarkReport) {
    for line in format_benchmark_report(source_dir, report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
