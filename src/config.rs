//! Build configuration.
//!
//! Loaded once from `docbatch.toml`, adjusted by command-line flags, then
//! passed by reference to everything that needs it. Nothing reads
//! configuration from global state; the Markdown toolchain in particular is
//! a value here, not a mutable switch.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source_dir = "content"     # Parent directory of the per-format folders
//! output_dir = "output"      # Artifact tree root
//! compile_types = ["TeX", "Markdown", "RST", "Typst"]
//! incremental = true         # Skip sources whose PDF is newer
//! font = "Noto Serif SC"     # Main/CJK font for pandoc and typst
//!
//! [markdown]
//! compiler = "pandoc"        # "pandoc" (direct) or "typst" (md → typ → pdf)
//!
//! [benchmark]
//! loops = 3                  # Full passes per compiler
//! compilers = ["pandoc", "typst"]
//!
//! [processing]
//! max_processes = 4          # Max parallel compilers (omit for auto = CPU cores)
//!
//! [extra_args]               # Extra compiler arguments per format
//! tex = ["-shell-escape"]
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::format::Format;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "docbatch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileConfig {
    /// Parent directory scanned by the auto dispatcher.
    pub source_dir: String,
    /// Root of the artifact tree.
    pub output_dir: String,
    /// Allow-list of format names. Folders of other formats are skipped.
    pub compile_types: Vec<String>,
    /// Skip sources whose artifact is newer than the source.
    pub incremental: bool,
    /// Font handed to pandoc (`CJKmainfont`) and typst (`mainfont`).
    pub font: String,
    pub markdown: MarkdownConfig,
    pub benchmark: BenchmarkConfig,
    pub processing: ProcessingConfig,
    /// Extra compiler arguments keyed by format name.
    pub extra_args: BTreeMap<String, Vec<String>>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            source_dir: "content".to_string(),
            output_dir: "output".to_string(),
            compile_types: Format::ALL.iter().map(|f| f.name().to_string()).collect(),
            incremental: true,
            font: "Noto Serif SC".to_string(),
            markdown: MarkdownConfig::default(),
            benchmark: BenchmarkConfig::default(),
            processing: ProcessingConfig::default(),
            extra_args: BTreeMap::new(),
        }
    }
}

impl CompileConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.font.trim().is_empty() {
            return Err(ConfigError::Validation("font must not be empty".into()));
        }
        if self.benchmark.loops == 0 {
            return Err(ConfigError::Validation(
                "benchmark.loops must be at least 1".into(),
            ));
        }
        if self.benchmark.compilers.is_empty() {
            return Err(ConfigError::Validation(
                "benchmark.compilers must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if let Some(key) = self
            .extra_args
            .keys()
            .find(|k| Format::from_name(k).is_none())
        {
            return Err(ConfigError::Validation(format!(
                "extra_args.{key} is not a known format"
            )));
        }
        Ok(())
    }

    /// Formats named in `compile_types`. Unknown names are logged and ignored.
    pub fn allowed_formats(&self) -> Vec<Format> {
        let mut formats = Vec::new();
        for name in &self.compile_types {
            match Format::from_name(name) {
                Some(format) if !formats.contains(&format) => formats.push(format),
                Some(_) => {}
                None => warn!(name = %name, "unknown format in compile_types, ignoring"),
            }
        }
        formats
    }

    /// Extra arguments configured for `format`.
    pub fn extra_args_for(&self, format: Format) -> Vec<String> {
        self.extra_args
            .iter()
            .filter(|(key, _)| Format::from_name(key) == Some(format))
            .flat_map(|(_, args)| args.iter().cloned())
            .collect()
    }
}

/// The alternative Markdown toolchains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkdownCompiler {
    /// `pandoc` straight to PDF.
    Pandoc,
    /// `pandoc` to Typst markup, then `typst compile`.
    Typst,
}

impl MarkdownCompiler {
    pub fn name(self) -> &'static str {
        match self {
            MarkdownCompiler::Pandoc => "pandoc",
            MarkdownCompiler::Typst => "typst",
        }
    }
}

impl fmt::Display for MarkdownCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    pub compiler: MarkdownCompiler,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            compiler: MarkdownCompiler::Pandoc,
        }
    }
}

/// Toolchain benchmark settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Full compilation passes per compiler.
    pub loops: u32,
    /// Markdown compilers to compare.
    pub compilers: Vec<MarkdownCompiler>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            loops: 3,
            compilers: vec![MarkdownCompiler::Pandoc, MarkdownCompiler::Typst],
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel compiler processes.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<CompileConfig, ConfigError> {
    if !path.exists() {
        return Ok(CompileConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let config: CompileConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// A documented stock `docbatch.toml` with every option at its default.
pub fn stock_config_toml() -> &'static str {
    r#"# docbatch configuration
#
# All options are optional. Values shown are the defaults.

# Parent directory holding one folder per format. Folder names select the
# compiler by their first `_`-separated word:
#   latex_* / tex_*      → TeX (xelatex)
#   markdown_* / md_*    → Markdown (pandoc, or pandoc + typst)
#   rst_* / rest_*       → RST (pandoc)
#   typst_* / typ_*      → Typst (typst compile)
source_dir = "content"

# Artifact tree root. Each source folder gets its own namespace:
#   content/md_notes/ch1/intro.md → output/md_notes/ch1/intro.pdf
output_dir = "output"

# Formats to compile. Folders of any other format are skipped.
compile_types = ["TeX", "Markdown", "RST", "Typst"]

# Skip sources whose PDF is newer than the source file.
incremental = true

# Font used by pandoc (CJKmainfont) and by the typst markdown pipeline.
font = "Noto Serif SC"

[markdown]
# "pandoc": markdown → PDF directly through xelatex.
# "typst":  markdown → typst markup → PDF.
compiler = "pandoc"

[benchmark]
# Full, non-incremental passes per compiler.
loops = 3
# Markdown compilers to compare with `docbatch bench`.
compilers = ["pandoc", "typst"]

[processing]
# Maximum parallel compiler processes. Omit for one per CPU core.
# max_processes = 4

[extra_args]
# Extra compiler arguments per format, appended to every command.
# tex = ["-shell-escape"]
"#
}
