//! # docbatch
//!
//! Parallel, incremental batch compilation of document sources (TeX,
//! Markdown, RST, Typst) into PDFs by driving external compilers.
//!
//! # Architecture: Directory Pipeline
//!
//! Every directory is compiled through the same four steps:
//!
//! ```text
//! 1. Discover   source/**/*.ext        →  tasks          (one per source file)
//! 2. Filter     tasks + existing PDFs  →  queued tasks   (skip fresh artifacts)
//! 3. Execute    queued tasks           →  task results   (parallel subprocesses)
//! 4. Post-hook  output directory       →  cleaned tree   (once, if anything ran)
//! ```
//!
//! The [`dispatch`] module runs this pipeline for every format folder under a
//! parent directory. The [`benchmark`] module runs it repeatedly with
//! alternative toolchains and compares wall-clock times.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`format`] | Supported formats, folder-keyword table |
//! | [`adapter`] | Per-format command builders (`xelatex`, `pandoc`, `typst`) and toolchains |
//! | [`discover`] | Walks a source directory into tasks with mirrored output paths |
//! | [`incremental`] | Artifact mtime index and the fresh/stale filter |
//! | [`executor`] | Fixed-size worker pool running one subprocess per task |
//! | [`compile`] | One directory end to end; progress events; TeX aux cleanup |
//! | [`dispatch`] | Auto mode over format folders; per-format run summary |
//! | [`benchmark`] | Timed toolchain comparison |
//! | [`config`] | `docbatch.toml` loading and validation |
//! | [`types`] | Tasks, results and reports shared by all stages |
//! | [`output`] | CLI output formatting for progress and reports |
//!
//! # Design Decisions
//!
//! ## One Subprocess per Task
//!
//! Workers are threads, but each one only launches a compiler and waits for
//! it. The compilers themselves are separate OS processes, so a crashing
//! compiler takes down nothing but its own task. A panic inside a worker is
//! caught and reported as a failed task.
//!
//! ## Freshness by Modification Time
//!
//! A task is skipped when its PDF is strictly newer than its source. Equal
//! timestamps count as stale. Content hashes are not tracked.
//!
//! ## Configuration Is a Value
//!
//! The choice of Markdown toolchain, the font and the per-format extra
//! arguments live in an immutable [`config::CompileConfig`] passed down to
//! every call. There is no process-wide "current compiler".
//!
//! ## Intermediates Are Per Task
//!
//! The Markdown → Typst → PDF pipeline writes its intermediate to a uniquely
//! named temp file next to the artifact. It is deleted when the task ends,
//! whether it succeeded, failed or panicked.

pub mod adapter;
pub mod benchmark;
pub mod compile;
pub mod config;
pub mod discover;
pub mod dispatch;
pub mod executor;
pub mod format;
pub mod incremental;
pub mod output;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
