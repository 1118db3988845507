//! Parallel task execution.
//!
//! The [`Executor`] owns a fixed-size rayon pool. Each worker takes one task,
//! builds its command through the directory's [`Toolchain`] and runs it as a
//! separate OS process, blocking only that worker until the compiler exits.
//! Compilers never share address space with each other or with us.
//!
//! ## Failure containment
//!
//! Nothing a single task does can abort the batch:
//!
//! - output directory creation failure → [`FailureKind::Setup`]
//! - executable missing or not startable → [`FailureKind::Launch`]
//! - non-zero exit → [`FailureKind::ExitStatus`] with the compiler's log
//! - a panic while building or running the command → [`FailureKind::Worker`]
//!
//! ## Two-stage tasks
//!
//! The intermediate file is a uniquely named temp file in the task's output
//! directory (`<stem>.<random>.<ext>`), held as a [`TempPath`]. Sibling tasks
//! in the same directory therefore never share it, and it is removed when the
//! task returns or unwinds. Stage 2 only runs after stage 1 succeeded.
//!
//! Results are delivered in completion order, not submission order.

use crate::adapter::{CommandLine, CompilerAdapter, Toolchain, TwoStageAdapter};
use crate::types::{FailureKind, StageDurations, Task, TaskResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::process::Output;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::debug;

/// Fixed-size worker pool.
pub struct Executor {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Executor {
    /// Build a pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("docbatch-worker-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task to completion.
    ///
    /// All tasks are submitted up front. `on_result` is called on the
    /// calling thread once per task, as each finishes.
    pub fn run<F>(&self, tasks: &[Task], toolchain: &Toolchain, mut on_result: F)
    where
        F: FnMut(TaskResult),
    {
        if tasks.is_empty() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        self.pool.in_place_scope(|scope| {
            for task in tasks {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // The receiver outlives every sender in this scope.
                    let _ = tx.send(run_guarded(task, toolchain));
                });
            }
            drop(tx);
            for result in rx {
                on_result(result);
            }
        });
    }

    /// Run every task and collect the results.
    pub fn run_all(&self, tasks: &[Task], toolchain: &Toolchain) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(tasks.len());
        self.run(tasks, toolchain, |r| results.push(r));
        results
    }
}

/// Run one task, converting a panic into a failed result.
pub fn run_guarded(task: &Task, toolchain: &Toolchain) -> TaskResult {
    let started = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(|| run_task(task, toolchain))) {
        Ok(result) => result,
        Err(payload) => TaskResult::failure(
            task,
            FailureKind::Worker,
            format!("worker panicked: {}", panic_message(payload.as_ref())),
            started.elapsed(),
        ),
    }
}

fn run_task(task: &Task, toolchain: &Toolchain) -> TaskResult {
    if let Err(e) = std::fs::create_dir_all(&task.output_dir) {
        return TaskResult::failure(
            task,
            FailureKind::Setup,
            format!(
                "cannot create output directory '{}': {e}",
                task.output_dir.display()
            ),
            Duration::ZERO,
        );
    }
    match toolchain {
        Toolchain::Single(adapter) => run_single(task, adapter.as_ref()),
        Toolchain::TwoStage(adapter) => run_two_stage(task, adapter.as_ref()),
    }
}

fn run_single(task: &Task, adapter: &dyn CompilerAdapter) -> TaskResult {
    let command = adapter.build(task);
    let (elapsed, outcome) = run_step(&command);
    match outcome {
        Ok(()) => TaskResult::success(task, elapsed, None),
        Err(e) => TaskResult::failure(task, e.kind(), e.describe(&command), elapsed),
    }
}

fn run_two_stage(task: &Task, adapter: &dyn TwoStageAdapter) -> TaskResult {
    let intermediate = match intermediate_path(task, adapter.intermediate_extension()) {
        Ok(path) => path,
        Err(e) => {
            return TaskResult::failure(
                task,
                FailureKind::Setup,
                format!(
                    "cannot create intermediate file in '{}': {e}",
                    task.output_dir.display()
                ),
                Duration::ZERO,
            );
        }
    };

    let stage1 = adapter.build_stage1(task, &intermediate);
    let (convert, outcome) = run_step(&stage1);
    if let Err(e) = outcome {
        return TaskResult::failure(
            task,
            FailureKind::Stage1,
            format!("stage 1/2 (convert) failed: {}", e.describe(&stage1)),
            convert,
        );
    }

    let stage2 = adapter.build_stage2(task, &intermediate);
    let (compile, outcome) = run_step(&stage2);
    match outcome {
        Ok(()) => TaskResult::success(
            task,
            convert + compile,
            Some(StageDurations { convert, compile }),
        ),
        Err(e) => TaskResult::failure(
            task,
            e.kind(),
            format!("stage 2/2 (compile) failed: {}", e.describe(&stage2)),
            convert + compile,
        ),
    }
    // `intermediate` is deleted here
}

/// A fresh, empty, uniquely named file next to the task's artifact.
fn intermediate_path(task: &Task, extension: &str) -> std::io::Result<TempPath> {
    let prefix = format!("{}.", task.stem());
    let suffix = format!(".{extension}");
    let file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile_in(&task.output_dir)?;
    Ok(file.into_temp_path())
}

enum StepError {
    Launch(std::io::Error),
    Exit { code: Option<i32>, log: String },
}

impl StepError {
    fn kind(&self) -> FailureKind {
        match self {
            StepError::Launch(_) => FailureKind::Launch,
            StepError::Exit { code, .. } => FailureKind::ExitStatus(*code),
        }
    }

    fn describe(&self, command: &CommandLine) -> String {
        match self {
            StepError::Launch(e) => format!(
                "failed to launch '{}': {e}",
                command.program.to_string_lossy()
            ),
            StepError::Exit { log, .. } => log.clone(),
        }
    }
}

fn run_step(command: &CommandLine) -> (Duration, Result<(), StepError>) {
    debug!(%command, "running");
    let started = Instant::now();
    let output = command.to_command().output();
    let elapsed = started.elapsed();
    let outcome = match output {
        Err(e) => Err(StepError::Launch(e)),
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(StepError::Exit {
            code: out.status.code(),
            log: compiler_log(&out),
        }),
    };
    (elapsed, outcome)
}

/// Compiler diagnostics: stderr, or stdout when stderr is empty
/// (xelatex reports errors on stdout).
fn compiler_log(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).trim_end().to_string()
    } else {
        stderr.trim_end().to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::tests::{
        CopyAdapter, MissingProgram, PanicInStage2, PanickingAdapter, SlowCopy, TwoStageCopy,
    };
    use crate::discover::discover;
    use crate::test_helpers::{files_with_extension, write_file};
    use crate::types::TaskOutcome;
    use tempfile::TempDir;

    fn tasks_for(tmp: &TempDir, files: &[(&str, &str)]) -> Vec<Task> {
        let source = tmp.path().join("md_src");
        for (rel, contents) in files {
            write_file(&source, rel, contents);
        }
        discover(&source, &tmp.path().join("out"), "md", "pdf").unwrap()
    }

    fn result_for<'a>(results: &'a [TaskResult], name: &str) -> &'a TaskResult {
        results.iter().find(|r| r.file_name == name).unwrap()
    }

    #[test]
    fn zero_workers_means_one() {
        assert_eq!(Executor::new(0).unwrap().workers(), 1);
        assert_eq!(Executor::new(3).unwrap().workers(), 3);
    }

    #[test]
    fn single_stage_success_writes_artifact() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("deep/nested/a.md", "hello")]);
        let results = Executor::new(2)
            .unwrap()
            .run_all(&tasks, &Toolchain::single(CopyAdapter));

        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(
            std::fs::read_to_string(&tasks[0].output_path).unwrap(),
            "hello"
        );
    }

    #[test]
    fn failure_does_not_affect_siblings() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("a.md", "FAIL"), ("b.md", "ok"), ("c.md", "ok")]);
        let results = Executor::new(2)
            .unwrap()
            .run_all(&tasks, &Toolchain::single(CopyAdapter));

        assert_eq!(results.len(), 3);
        let a = result_for(&results, "a.md");
        match &a.outcome {
            TaskOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, FailureKind::ExitStatus(Some(1)));
                assert!(message.contains("forced failure"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(result_for(&results, "b.md").is_success());
        assert!(result_for(&results, "c.md").is_success());
        assert!(!tasks[0].output_path.exists());
        assert!(tasks[1].output_path.exists());
    }

    #[test]
    fn missing_executable_is_launch_failure() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("a.md", "")]);
        let results = Executor::new(1)
            .unwrap()
            .run_all(&tasks, &Toolchain::single(MissingProgram));

        match &results[0].outcome {
            TaskOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, FailureKind::Launch);
                assert!(message.contains("docbatch-no-such-compiler"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn stage2_panic_removes_intermediate() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("boom.md", "x"), ("fine.md", "ok")]);
        let results = Executor::new(2)
            .unwrap()
            .run_all(&tasks, &Toolchain::two_stage(PanicInStage2));

        match &result_for(&results, "boom.md").outcome {
            TaskOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, FailureKind::Worker);
                assert!(message.contains("intermediate written: true"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(result_for(&results, "fine.md").is_success());

        let out = tmp.path().join("out");
        assert!(files_with_extension(&out, "mid").is_empty());
        assert!(!out.join("md_src/boom.pdf").exists());
    }

    #[test]
    fn panic_becomes_worker_failure() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("boom.md", ""), ("fine.md", "ok")]);
        let executor = Executor::new(2).unwrap();
        let results = executor.run_all(&tasks, &Toolchain::single(PanickingAdapter));

        assert_eq!(results.len(), 2);
        match &result_for(&results, "boom.md").outcome {
            TaskOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, FailureKind::Worker);
                assert!(message.contains("cannot build command for boom.md"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(result_for(&results, "fine.md").is_success());

        // The pool is still usable afterwards.
        let again = executor.run_all(&tasks[1..], &Toolchain::single(CopyAdapter));
        assert!(again[0].is_success());
    }

    #[test]
    fn setup_failure_when_output_dir_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("a.md", "")]);
        // Occupy the output directory path with a regular file.
        write_file(tmp.path(), "out/md_src", "not a dir");
        let results = Executor::new(1)
            .unwrap()
            .run_all(&tasks, &Toolchain::single(CopyAdapter));

        assert!(matches!(
            results[0].outcome,
            TaskOutcome::Failure {
                kind: FailureKind::Setup,
                ..
            }
        ));
    }

    #[test]
    fn two_stage_success_leaves_no_intermediate() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("a.md", "one"), ("b.md", "two"), ("a/a.md", "three")]);
        let results = Executor::new(3)
            .unwrap()
            .run_all(&tasks, &Toolchain::two_stage(TwoStageCopy));

        assert!(results.iter().all(TaskResult::is_success));
        for r in &results {
            match &r.outcome {
                TaskOutcome::Success { stages, duration } => {
                    let stages = stages.expect("two-stage timing");
                    assert_eq!(*duration, stages.convert + stages.compile);
                }
                other => panic!("expected success, got {other:?}"),
            }
        }
        for task in &tasks {
            assert!(task.output_path.exists());
        }
        assert!(files_with_extension(&tmp.path().join("out"), "mid").is_empty());
    }

    #[test]
    fn two_stage_failure_leaves_no_intermediate() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(&tmp, &[("s1.md", "FAIL1"), ("s2.md", "FAIL2"), ("ok.md", "ok")]);
        let results = Executor::new(3)
            .unwrap()
            .run_all(&tasks, &Toolchain::two_stage(TwoStageCopy));

        match &result_for(&results, "s1.md").outcome {
            TaskOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, FailureKind::Stage1);
                assert!(message.starts_with("stage 1/2"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        match &result_for(&results, "s2.md").outcome {
            TaskOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, FailureKind::ExitStatus(Some(3)));
                assert!(message.starts_with("stage 2/2"));
                assert!(message.contains("FAIL2 hit"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(result_for(&results, "ok.md").is_success());

        let out = tmp.path().join("out");
        assert!(files_with_extension(&out, "mid").is_empty());
        assert!(!out.join("md_src/s1.pdf").exists());
        assert!(!out.join("md_src/s2.pdf").exists());
    }

    #[test]
    fn workers_run_concurrently() {
        let tmp = TempDir::new().unwrap();
        let tasks = tasks_for(
            &tmp,
            &[("a.md", ""), ("b.md", ""), ("c.md", ""), ("d.md", "")],
        );
        let started = Instant::now();
        let results = Executor::new(4)
            .unwrap()
            .run_all(&tasks, &Toolchain::single(SlowCopy { seconds: 0.4 }));

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(TaskResult::is_success));
        // Sequential execution would take at least 1.6s.
        assert!(started.elapsed() < Duration::from_millis(1400));
    }

    #[test]
    fn compiler_log_falls_back_to_stdout() {
        let out = std::process::Command::new("sh")
            .args(["-c", "echo 'Undefined control sequence'; exit 1"])
            .output()
            .unwrap();
        assert_eq!(compiler_log(&out), "Undefined control sequence");
    }

    #[test]
    fn panic_message_from_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_message(payload.as_ref()), "bad");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
