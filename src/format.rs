//! Supported document formats and the folder-keyword table.
//!
//! Folder names map to formats by their first `_`-separated token,
//! lower-cased:
//!
//! ```text
//! latex_thesis/   → TeX
//! md_notes/       → Markdown
//! REST_api/       → RST
//! typ/            → Typst
//! ```
//!
//! The table is ordered and the first match wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source document format with its own compiler toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Tex,
    Markdown,
    Rst,
    Typst,
}

/// Ordered keyword table used by the auto dispatcher.
pub const FORMAT_TABLE: &[(&[&str], Format)] = &[
    (&["latex", "tex"], Format::Tex),
    (&["markdown", "md"], Format::Markdown),
    (&["rst", "rest"], Format::Rst),
    (&["typst", "typ"], Format::Typst),
];

/// Extension of every final artifact.
pub const ARTIFACT_EXTENSION: &str = "pdf";

impl Format {
    pub const ALL: [Format; 4] = [Format::Tex, Format::Markdown, Format::Rst, Format::Typst];

    /// Display name used in logs, reports and `compile_types`.
    pub fn name(self) -> &'static str {
        match self {
            Format::Tex => "TeX",
            Format::Markdown => "Markdown",
            Format::Rst => "RST",
            Format::Typst => "Typst",
        }
    }

    /// Source file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Tex => "tex",
            Format::Markdown => "md",
            Format::Rst => "rst",
            Format::Typst => "typ",
        }
    }

    /// Parse a format by display name or keyword, case-insensitively.
    pub fn from_name(name: &str) -> Option<Format> {
        let lower = name.trim().to_lowercase();
        Format::ALL
            .into_iter()
            .find(|f| f.name().to_lowercase() == lower)
            .or_else(|| lookup_keyword(&lower))
    }

    /// Match a folder name against [`FORMAT_TABLE`].
    ///
    /// Only the token before the first `_` is considered.
    pub fn from_folder_name(folder: &str) -> Option<Format> {
        let token = folder.split('_').next().unwrap_or_default().to_lowercase();
        lookup_keyword(&token)
    }
}

fn lookup_keyword(token: &str) -> Option<Format> {
    FORMAT_TABLE
        .iter()
        .find(|(keywords, _)| keywords.contains(&token))
        .map(|(_, format)| *format)
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
