//! Compiler adapters: map a [`Task`] to an external-process invocation.
//!
//! Every adapter is a pure function of its inputs (the task plus the
//! adapter's own immutable settings), so one instance is shared by all
//! workers of a directory. Adapters never run anything; the
//! [`executor`](crate::executor) does.
//!
//! | Adapter | Format | Program |
//! |---|---|---|
//! | [`XeLatex`] | TeX | `xelatex` |
//! | [`Pandoc`] | Markdown, RST | `pandoc` (xelatex PDF engine) |
//! | [`TypstCompile`] | Typst | `typst compile` |
//! | [`MarkdownViaTypst`] | Markdown | `pandoc -t typst`, then `typst compile` |
//!
//! A directory is compiled with exactly one [`Toolchain`], chosen once from
//! config by [`Toolchain::for_format`].

use crate::config::{CompileConfig, MarkdownCompiler};
use crate::format::Format;
use crate::types::Task;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A fully built external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Convert into a [`Command`] with stdin closed and output captured.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Single-stage adapter: source → artifact in one command.
pub trait CompilerAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, task: &Task) -> CommandLine;
}

/// Two-stage adapter: source → intermediate markup → artifact.
///
/// The intermediate path is owned by the executor: a unique temp file in
/// the task's output directory, removed when the task ends.
pub trait TwoStageAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Extension of the intermediate file, without the dot.
    fn intermediate_extension(&self) -> &str;

    fn build_stage1(&self, task: &Task, intermediate: &Path) -> CommandLine;

    fn build_stage2(&self, task: &Task, intermediate: &Path) -> CommandLine;
}

/// The compilation strategy for one directory.
pub enum Toolchain {
    Single(Box<dyn CompilerAdapter>),
    TwoStage(Box<dyn TwoStageAdapter>),
}

impl Toolchain {
    pub fn single(adapter: impl CompilerAdapter + 'static) -> Self {
        Toolchain::Single(Box::new(adapter))
    }

    pub fn two_stage(adapter: impl TwoStageAdapter + 'static) -> Self {
        Toolchain::TwoStage(Box::new(adapter))
    }

    pub fn name(&self) -> &str {
        match self {
            Toolchain::Single(a) => a.name(),
            Toolchain::TwoStage(a) => a.name(),
        }
    }

    /// The toolchain configured for `format`.
    pub fn for_format(format: Format, config: &CompileConfig) -> Toolchain {
        match format {
            Format::Tex => Toolchain::single(XeLatex),
            Format::Markdown => Toolchain::for_markdown(config.markdown.compiler, &config.font),
            Format::Rst => Toolchain::single(Pandoc::new("rst", &config.font)),
            Format::Typst => Toolchain::single(TypstCompile),
        }
    }

    /// One of the alternative Markdown toolchains.
    pub fn for_markdown(compiler: MarkdownCompiler, font: &str) -> Toolchain {
        match compiler {
            MarkdownCompiler::Pandoc => Toolchain::single(Pandoc::new("gfm", font)),
            MarkdownCompiler::Typst => Toolchain::two_stage(MarkdownViaTypst::new(font)),
        }
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toolchain::Single(a) => write!(f, "Single({})", a.name()),
            Toolchain::TwoStage(a) => write!(f, "TwoStage({})", a.name()),
        }
    }
}

/// `xelatex` writing into the task's output directory.
///
/// Auxiliary `.aux`/`.log`/`.out` files land next to the PDF; the TeX
/// post-hook removes them once the directory is done.
#[derive(Debug, Clone, Copy, Default)]
pub struct XeLatex;

impl CompilerAdapter for XeLatex {
    fn name(&self) -> &str {
        "xelatex"
    }

    fn build(&self, task: &Task) -> CommandLine {
        let mut output_dir = OsString::from("-output-directory=");
        output_dir.push(&task.output_dir);
        CommandLine::new("xelatex")
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg(output_dir)
            .arg(format!("-jobname={}", task.stem()))
            .args(&task.extra_args)
            .arg(&task.input_path)
    }
}

/// `pandoc` straight to PDF through the xelatex engine.
#[derive(Debug, Clone)]
pub struct Pandoc {
    /// Pandoc reader name (`gfm`, `rst`).
    pub from: String,
    /// CJK main font handed to the LaTeX template.
    pub font: String,
}

impl Pandoc {
    pub fn new(from: &str, font: &str) -> Self {
        Self {
            from: from.to_string(),
            font: font.to_string(),
        }
    }
}

impl CompilerAdapter for Pandoc {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn build(&self, task: &Task) -> CommandLine {
        let mut resource_path = OsString::from("--resource-path=");
        if let Some(parent) = task.input_path.parent() {
            resource_path.push(parent);
        }
        CommandLine::new("pandoc")
            .arg(&task.input_path)
            .args(["-f", self.from.as_str(), "-o"])
            .arg(&task.output_path)
            .arg("--pdf-engine=xelatex")
            .arg(resource_path)
            .arg("-V")
            .arg(format!("CJKmainfont={}", self.font))
            .args(&task.extra_args)
    }
}

/// `typst compile <input> <output>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypstCompile;

impl CompilerAdapter for TypstCompile {
    fn name(&self) -> &str {
        "typst"
    }

    fn build(&self, task: &Task) -> CommandLine {
        CommandLine::new("typst")
            .arg("compile")
            .args(&task.extra_args)
            .arg(&task.input_path)
            .arg(&task.output_path)
    }
}

/// Markdown → Typst markup (pandoc) → PDF (typst).
#[derive(Debug, Clone)]
pub struct MarkdownViaTypst {
    pub font: String,
}

impl MarkdownViaTypst {
    pub fn new(font: &str) -> Self {
        Self {
            font: font.to_string(),
        }
    }
}

impl TwoStageAdapter for MarkdownViaTypst {
    fn name(&self) -> &str {
        "pandoc+typst"
    }

    fn intermediate_extension(&self) -> &str {
        "typ"
    }

    fn build_stage1(&self, task: &Task, intermediate: &Path) -> CommandLine {
        CommandLine::new("pandoc")
            .arg(&task.input_path)
            .args(["-f", "gfm", "-t", "typst", "-s", "-V"])
            .arg(format!("mainfont={}", self.font))
            .arg("-o")
            .arg(intermediate)
    }

    fn build_stage2(&self, task: &Task, intermediate: &Path) -> CommandLine {
        CommandLine::new("typst")
            .arg("compile")
            .args(&task.extra_args)
            .arg(intermediate)
            .arg(&task.output_path)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Shell-backed stand-in for a real compiler.
    ///
    /// Copies the source to the artifact. A source containing `FAIL` makes
    /// the command exit 1 with `forced failure` on stderr.
    #[derive(Debug, Default)]
    pub struct CopyAdapter;

    const COPY_SCRIPT: &str =
        r#"if grep -q FAIL "$0"; then echo "forced failure" >&2; exit 1; fi; cp "$0" "$1""#;

    impl CompilerAdapter for CopyAdapter {
        fn name(&self) -> &str {
            "copy"
        }

        fn build(&self, task: &Task) -> CommandLine {
            CommandLine::new("sh")
                .args(["-c", COPY_SCRIPT])
                .arg(&task.input_path)
                .arg(&task.output_path)
        }
    }

    /// Copy through an intermediate file.
    ///
    /// Stage 1 fails when the source contains `FAIL1`, stage 2 when the
    /// intermediate (a copy of the source) contains `FAIL2`.
    #[derive(Debug, Default)]
    pub struct TwoStageCopy;

    fn copy_unless(marker: &str, from: &Path, to: &Path) -> CommandLine {
        let script = format!(
            r#"if grep -q {marker} "$0"; then echo "{marker} hit" >&2; exit 3; fi; cp "$0" "$1""#
        );
        CommandLine::new("sh").arg("-c").arg(script).arg(from).arg(to)
    }

    impl TwoStageAdapter for TwoStageCopy {
        fn name(&self) -> &str {
            "two-stage-copy"
        }

        fn intermediate_extension(&self) -> &str {
            "mid"
        }

        fn build_stage1(&self, task: &Task, intermediate: &Path) -> CommandLine {
            copy_unless("FAIL1", &task.input_path, intermediate)
        }

        fn build_stage2(&self, task: &Task, intermediate: &Path) -> CommandLine {
            copy_unless("FAIL2", intermediate, &task.output_path)
        }
    }

    /// Like [`TwoStageCopy`], but panics while building stage 2 for files
    /// named `boom*`, after stage 1 has written the intermediate.
    #[derive(Debug, Default)]
    pub struct PanicInStage2;

    impl TwoStageAdapter for PanicInStage2 {
        fn name(&self) -> &str {
            "panic-in-stage2"
        }

        fn intermediate_extension(&self) -> &str {
            TwoStageCopy.intermediate_extension()
        }

        fn build_stage1(&self, task: &Task, intermediate: &Path) -> CommandLine {
            TwoStageCopy.build_stage1(task, intermediate)
        }

        fn build_stage2(&self, task: &Task, intermediate: &Path) -> CommandLine {
            if task.file_name().starts_with("boom") {
                panic!(
                    "stage 2 for {} (intermediate written: {})",
                    task.file_name(),
                    intermediate.exists()
                );
            }
            TwoStageCopy.build_stage2(task, intermediate)
        }
    }

    /// Panics while building the command for files named `boom*`, copies
    /// everything else.
    #[derive(Debug, Default)]
    pub struct PanickingAdapter;

    impl CompilerAdapter for PanickingAdapter {
        fn name(&self) -> &str {
            "panics"
        }

        fn build(&self, task: &Task) -> CommandLine {
            if task.file_name().starts_with("boom") {
                panic!("cannot build command for {}", task.file_name());
            }
            CopyAdapter.build(task)
        }
    }

    /// Sleeps before copying; used for timing-sensitive tests.
    #[derive(Debug)]
    pub struct SlowCopy {
        pub seconds: f32,
    }

    impl CompilerAdapter for SlowCopy {
        fn name(&self) -> &str {
            "slow-copy"
        }

        fn build(&self, task: &Task) -> CommandLine {
            CommandLine::new("sh")
                .arg("-c")
                .arg(format!(r#"sleep {}; cp "$0" "$1""#, self.seconds))
                .arg(&task.input_path)
                .arg(&task.output_path)
        }
    }

    /// Refers to an executable that does not exist.
    #[derive(Debug, Default)]
    pub struct MissingProgram;

    impl CompilerAdapter for MissingProgram {
        fn name(&self) -> &str {
            "missing"
        }

        fn build(&self, task: &Task) -> CommandLine {
            CommandLine::new("docbatch-no-such-compiler").arg(&task.input_path)
        }
    }

    fn task() -> Task {
        Task {
            input_path: PathBuf::from("/src/md_notes/sub/intro.md"),
            output_path: PathBuf::from("/out/md_notes/sub/intro.pdf"),
            output_dir: PathBuf::from("/out/md_notes/sub"),
            extra_args: Vec::new(),
        }
    }

    fn strings(cmd: &CommandLine) -> Vec<String> {
        cmd.argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn xelatex_writes_into_output_dir_with_stem_jobname() {
        let argv = strings(&XeLatex.build(&task()));
        assert_eq!(
            argv,
            vec![
                "xelatex",
                "-interaction=nonstopmode",
                "-halt-on-error",
                "-output-directory=/out/md_notes/sub",
                "-jobname=intro",
                "/src/md_notes/sub/intro.md",
            ]
        );
    }

    #[test]
    fn pandoc_uses_reader_and_font() {
        let argv = strings(&Pandoc::new("rst", "Noto Serif SC").build(&task()));
        assert_eq!(argv[0], "pandoc");
        assert_eq!(argv[1], "/src/md_notes/sub/intro.md");
        assert!(argv.windows(2).any(|w| w == ["-f", "rst"]));
        assert!(argv.windows(2).any(|w| w == ["-o", "/out/md_notes/sub/intro.pdf"]));
        assert!(argv.contains(&"--resource-path=/src/md_notes/sub".to_string()));
        assert!(argv.contains(&"CJKmainfont=Noto Serif SC".to_string()));
    }

    #[test]
    fn typst_compile_argv() {
        let argv = strings(&TypstCompile.build(&task()));
        assert_eq!(
            argv,
            vec![
                "typst",
                "compile",
                "/src/md_notes/sub/intro.md",
                "/out/md_notes/sub/intro.pdf",
            ]
        );
    }

    #[test]
    fn extra_args_are_appended() {
        let mut t = task();
        t.extra_args = vec!["-shell-escape".to_string()];
        let argv = strings(&XeLatex.build(&t));
        assert_eq!(argv[argv.len() - 2], "-shell-escape");
        assert_eq!(argv.last().unwrap(), "/src/md_notes/sub/intro.md");
    }

    #[test]
    fn two_stage_chains_through_intermediate() {
        let adapter = MarkdownViaTypst::new("Serif");
        let mid = Path::new("/out/md_notes/sub/intro.abc123.typ");

        let stage1 = strings(&adapter.build_stage1(&task(), mid));
        assert_eq!(stage1.last().unwrap(), "/out/md_notes/sub/intro.abc123.typ");
        assert!(stage1.windows(2).any(|w| w == ["-t", "typst"]));
        assert!(stage1.contains(&"mainfont=Serif".to_string()));

        let stage2 = strings(&adapter.build_stage2(&task(), mid));
        assert_eq!(
            stage2,
            vec![
                "typst",
                "compile",
                "/out/md_notes/sub/intro.abc123.typ",
                "/out/md_notes/sub/intro.pdf",
            ]
        );
    }

    #[test]
    fn adapters_are_pure() {
        let adapter = Pandoc::new("gfm", "Serif");
        assert_eq!(adapter.build(&task()), adapter.build(&task()));
    }

    #[test]
    fn toolchain_selection_follows_config() {
        let mut config = CompileConfig::default();
        assert_eq!(Toolchain::for_format(Format::Tex, &config).name(), "xelatex");
        assert_eq!(Toolchain::for_format(Format::Typst, &config).name(), "typst");
        assert_eq!(Toolchain::for_format(Format::Markdown, &config).name(), "pandoc");

        config.markdown.compiler = MarkdownCompiler::Typst;
        let markdown = Toolchain::for_format(Format::Markdown, &config);
        assert!(matches!(markdown, Toolchain::TwoStage(_)));
        assert_eq!(markdown.name(), "pandoc+typst");
    }

    #[test]
    fn command_line_display() {
        let cmd = CommandLine::new("typst").args(["compile", "a.typ"]);
        assert_eq!(cmd.to_string(), "typst compile a.typ");
    }
}
