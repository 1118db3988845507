//! Task discovery.
//!
//! Walks a source directory once and produces one [`Task`] per file with the
//! requested extension. The source tree is mirrored under a namespace named
//! after the source directory:
//!
//! ```text
//! content/md_notes/intro.md          →  output/md_notes/intro.pdf
//! content/md_notes/ch1/part.md       →  output/md_notes/ch1/part.pdf
//! ```
//!
//! Within one directory, file names are unique and only one extension is
//! matched, so `<stem>.pdf` never collides.

use crate::types::Task;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Name of the output namespace for `source_dir` (its final component).
///
/// Paths without a final component (`.`, `foo/..`) are canonicalized first.
pub fn namespace(source_dir: &Path) -> Result<String, DiscoverError> {
    if let Some(name) = source_dir.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    let canonical = source_dir.canonicalize()?;
    Ok(canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default())
}

/// The directory-specific output root: `output_root/<namespace>`.
pub fn output_root_for(source_dir: &Path, output_root: &Path) -> Result<PathBuf, DiscoverError> {
    Ok(output_root.join(namespace(source_dir)?))
}

/// Find every `*.{extension}` file under `source_dir`.
///
/// Returns tasks in a stable (file-name sorted) order. An empty list is not
/// an error.
pub fn discover(
    source_dir: &Path,
    output_root: &Path,
    extension: &str,
    target_extension: &str,
) -> Result<Vec<Task>, DiscoverError> {
    if !source_dir.is_dir() {
        return Err(DiscoverError::SourceNotFound(source_dir.to_path_buf()));
    }
    let target_root = output_root_for(source_dir, output_root)?;

    let mut tasks = Vec::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            // An unreadable subtree loses only its own files.
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
            continue;
        }
        let input_path = entry.into_path();
        let relative_dir = input_path
            .parent()
            .and_then(|p| p.strip_prefix(source_dir).ok())
            .unwrap_or(Path::new(""));
        let output_dir = target_root.join(relative_dir);
        // Not `with_extension`: `v1.2.md` must become `v1.2.pdf`, not `v1.pdf`.
        let mut artifact_name = input_path.file_stem().unwrap_or_default().to_os_string();
        artifact_name.push(".");
        artifact_name.push(target_extension);
        let output_path = output_dir.join(artifact_name);

        tasks.push(Task {
            input_path,
            output_path,
            output_dir,
            extra_args: Vec::new(),
        });
    }
    Ok(tasks)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn mirrors_relative_structure_under_namespace() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("md_notes");
        write_file(&source, "intro.md", "# Intro");
        write_file(&source, "ch1/part.md", "# Part");
        let out = tmp.path().join("out");

        let tasks = discover(&source, &out, "md", "pdf").unwrap();

        assert_eq!(tasks.len(), 2);
        let ch1 = tasks.iter().find(|t| t.file_name() == "part.md").unwrap();
        assert_eq!(ch1.output_path, out.join("md_notes/ch1/part.pdf"));
        assert_eq!(ch1.output_dir, out.join("md_notes/ch1"));
        let intro = tasks.iter().find(|t| t.file_name() == "intro.md").unwrap();
        assert_eq!(intro.output_path, out.join("md_notes/intro.pdf"));
        assert_eq!(intro.output_dir, out.join("md_notes"));
    }

    #[test]
    fn filters_by_extension() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("tex");
        write_file(&source, "a.tex", "");
        write_file(&source, "b.md", "");
        write_file(&source, "c.texx", "");
        write_file(&source, "notes.tex.bak", "");

        let tasks = discover(&source, tmp.path(), "tex", "pdf").unwrap();
        let names: Vec<String> = tasks.iter().map(|t| t.file_name()).collect();
        assert_eq!(names, vec!["a.tex"]);
    }

    #[test]
    fn dotted_stem_keeps_all_parts() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("md");
        write_file(&source, "v1.2.md", "");
        write_file(&source, "v1.md", "");

        let tasks = discover(&source, tmp.path(), "md", "pdf").unwrap();
        let outputs: Vec<_> = tasks.iter().map(|t| t.output_path.clone()).collect();
        assert!(outputs.contains(&tmp.path().join("md/v1.2.pdf")));
        assert!(outputs.contains(&tmp.path().join("md/v1.pdf")));
    }

    #[test]
    fn no_matches_is_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("rst");
        write_file(&source, "readme.txt", "");

        let tasks = discover(&source, tmp.path(), "rst", "pdf").unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn missing_source_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = discover(&tmp.path().join("nope"), tmp.path(), "md", "pdf");
        assert!(matches!(result, Err(DiscoverError::SourceNotFound(_))));
    }

    #[test]
    fn output_paths_are_unique_and_deterministic() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("typ");
        for rel in ["a.typ", "b.typ", "x/a.typ", "x/y/a.typ", "y/a.typ"] {
            write_file(&source, rel, "");
        }
        let out = tmp.path().join("out");

        let first = discover(&source, &out, "typ", "pdf").unwrap();
        let second = discover(&source, &out, "typ", "pdf").unwrap();
        assert_eq!(first, second);

        let unique: HashSet<_> = first.iter().map(|t| &t.output_path).collect();
        assert_eq!(unique.len(), first.len());
        assert!(first.iter().all(|t| t.output_path.starts_with(out.join("typ"))));
    }

    #[test]
    fn dot_source_uses_canonical_name() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("md_docs");
        std::fs::create_dir_all(&source).unwrap();
        assert_eq!(namespace(&source.join(".")).unwrap(), "md_docs");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_keeps_its_siblings() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("md_notes");
        write_file(&source, "intro.md", "# Intro");
        write_file(&source, "private/secret.md", "# Secret");
        let private = source.join("private");
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores the mode bits, so the subtree may still be readable.
        let locked = std::fs::read_dir(&private).is_err();

        let result = discover(&source, &tmp.path().join("out"), "md", "pdf");
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o755)).unwrap();

        let names: Vec<String> = result.unwrap().iter().map(|t| t.file_name()).collect();
        assert!(names.contains(&"intro.md".to_string()));
        if locked {
            assert_eq!(names, vec!["intro.md"]);
        }
    }
}
