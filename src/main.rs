use clap::{Parser, Subcommand};
use docbatch::adapter::Toolchain;
use docbatch::benchmark::{self, Alternative, BenchmarkJob, BenchmarkReport};
use docbatch::compile::{self, CompileEvent, CompileOptions, DirectoryJob};
use docbatch::config::{self, CompileConfig};
use docbatch::dispatch;
use docbatch::format::Format;
use docbatch::output;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "docbatch")]
#[command(about = "Parallel, incremental batch compiler for TeX, Markdown, RST and Typst")]
#[command(long_about = "\
Parallel, incremental batch compiler for TeX, Markdown, RST and Typst

Each folder under the source directory is compiled with the toolchain
matching the word before its first underscore. Sources are compiled in
parallel; a source is skipped when its PDF is newer than the source.

Content structure:

  content/
  ├── latex_thesis/          # latex_* / tex_*    → xelatex
  │   └── main.tex           #   → output/latex_thesis/main.pdf
  ├── md_notes/              # markdown_* / md_*  → pandoc (or pandoc + typst)
  │   ├── intro.md           #   → output/md_notes/intro.pdf
  │   └── ch1/part.md        #   → output/md_notes/ch1/part.pdf
  ├── rst_api/               # rst_* / rest_*     → pandoc
  ├── typst_slides/          # typst_* / typ_*    → typst compile
  └── assets/                # no keyword: ignored

Run 'docbatch gen-config' to generate a documented docbatch.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Parent directory of the format folders [config: source_dir]
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output directory [config: output_dir]
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Parallel compiler processes [config: processing.max_processes]
    #[arg(long, short = 'j', global = true)]
    jobs: Option<usize>,

    /// Recompile everything, even sources with a fresh PDF
    #[arg(long, global = true)]
    no_incremental: bool,

    /// Delete the output directory before compiling
    #[arg(long, global = true)]
    clean: bool,

    /// Main/CJK font for pandoc and typst [config: font]
    #[arg(long, global = true)]
    font: Option<String>,

    /// Write the run result as JSON
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile every format folder under the source directory
    Auto,
    /// Compile a single directory with one format's toolchain
    Compile {
        /// Source directory
        dir: PathBuf,
        /// Format name or keyword (tex, md, rst, typ, ...)
        #[arg(long, value_parser = parse_format)]
        format: Format,
    },
    /// Time the configured markdown compilers against each other
    Bench,
    /// Print a stock docbatch.toml with all options documented
    GenConfig,
}

fn parse_format(name: &str) -> Result<Format, String> {
    Format::from_name(name).ok_or_else(|| format!("unknown format '{name}'"))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    init_tracing(cli.verbose);

    let config = apply_overrides(config::load_config(&cli.config)?, &cli);
    config.validate()?;
    let workers = cli
        .jobs
        .unwrap_or_else(|| config::effective_threads(&config.processing));
    let source = PathBuf::from(&config.source_dir);
    let output_root = PathBuf::from(&config.output_dir);

    if cli.clean && output_root.exists() {
        info!(dir = %output_root.display(), "cleaning output directory");
        std::fs::remove_dir_all(&output_root)?;
    }

    let started = Instant::now();
    let failures = match &cli.command {
        Command::Auto => {
            let summary = with_printer(|tx| {
                dispatch::run(&source, &output_root, &config, workers, Some(tx))
            })??;
            println!();
            output::print_run_summary(&summary);
            write_report(cli.report.as_deref(), &summary)?;
            summary.total_failures()
        }
        Command::Compile { dir, format } => {
            let toolchain = Toolchain::for_format(*format, &config);
            let job = DirectoryJob {
                label: format.name(),
                source_dir: dir,
                output_root: &output_root,
                extension: format.extension(),
                toolchain: &toolchain,
                post_hook: dispatch::post_hook_for(*format),
            };
            let options = CompileOptions {
                workers,
                incremental: config.incremental,
                extra_args: config.extra_args_for(*format),
            };
            let report = with_printer(|tx| compile::compile_directory(&job, &options, Some(tx)))??;
            println!();
            output::print_directory_report(&report);
            write_report(cli.report.as_deref(), &report)?;
            report.failure_count
        }
        Command::Bench => {
            let reports = run_bench(&source, &output_root, &config, workers, cli.verbose)?;
            write_report(cli.report.as_deref(), &reports)?;
            reports
                .iter()
                .flat_map(|r| &r.report.alternatives)
                .map(|s| s.failures)
                .sum()
        }
        Command::GenConfig => 0,
    };

    println!();
    println!(
        "Total time: {}",
        output::format_duration_hms(started.elapsed())
    );

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "docbatch=debug"
    } else {
        "docbatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Fold command-line flags into the loaded config. The result is never
/// mutated again.
fn apply_overrides(mut config: CompileConfig, cli: &Cli) -> CompileConfig {
    if let Some(source) = &cli.source {
        config.source_dir = source.to_string_lossy().into_owned();
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.to_string_lossy().into_owned();
    }
    if let Some(font) = &cli.font {
        config.font = font.clone();
    }
    if cli.no_incremental {
        config.incremental = false;
    }
    config
}

/// Run `f` while a printer thread writes its progress events to stdout.
fn with_printer<T>(f: impl FnOnce(&Sender<CompileEvent>) -> T) -> Result<T, Box<dyn Error>> {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_compile_event(&event);
        }
    });
    let result = f(&tx);
    drop(tx);
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    Ok(result)
}

#[derive(Serialize)]
struct FolderBenchmark {
    folder: PathBuf,
    report: BenchmarkReport,
}

/// Benchmark every Markdown folder under `source`.
fn run_bench(
    source: &Path,
    output_root: &Path,
    config: &CompileConfig,
    workers: usize,
    verbose: bool,
) -> Result<Vec<FolderBenchmark>, Box<dyn Error>> {
    let folders = dispatch::folders_of(source, Format::Markdown)?;
    let alternatives: Vec<Alternative> = config
        .benchmark
        .compilers
        .iter()
        .map(|compiler| Alternative::markdown(*compiler, &config.font))
        .collect();
    let options = CompileOptions {
        workers,
        incremental: false,
        extra_args: config.extra_args_for(Format::Markdown),
    };

    let mut reports = Vec::new();
    for folder in &folders {
        let job = BenchmarkJob {
            source_dir: &folder.path,
            output_root,
            extension: Format::Markdown.extension(),
        };
        let report = if verbose {
            with_printer(|tx| {
                benchmark::run_benchmark(
                    &job,
                    &alternatives,
                    config.benchmark.loops,
                    &options,
                    Some(tx),
                )
            })??
        } else {
            benchmark::run_benchmark(&job, &alternatives, config.benchmark.loops, &options, None)?
        };
        output::print_benchmark_report(&folder.path, &report);
        reports.push(FolderBenchmark {
            folder: folder.path.clone(),
            report,
        });
    }
    if reports.is_empty() {
        println!("No markdown folders under {}", source.display());
    }
    Ok(reports)
}

fn write_report(path: Option<&Path>, value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "wrote report");
    Ok(())
}
