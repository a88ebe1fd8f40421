use std::path::{Path, PathBuf};

use crate::document::InputType;
use crate::error::IndexError;

/// Collect input files under `root` for `input_type`, sorted by path and
/// truncated to `max_files`.
///
/// Hidden files and ignore files are not consulted; the corpus directory is
/// taken as-is.
///
/// # Errors
///
/// Returns [`IndexError::MissingInput`] if `root` is not a directory, or a
/// walk error if a directory cannot be read.
pub fn discover_files(
    root: &Path,
    input_type: InputType,
    max_files: usize,
) -> Result<Vec<PathBuf>, IndexError> {
    if !root.is_dir() {
        return Err(IndexError::MissingInput(root.to_path_buf()));
    }
    let extensions = input_type.extensions();

    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root).standard_filters(false).build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)));
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    let found = files.len();
    files.truncate(max_files);
    tracing::info!(
        root = %root.display(),
        input_type = %input_type,
        found,
        selected = files.len(),
        "input files discovered"
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_matching_files_recursively_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("sub/a.JSON"), "{}").unwrap();
        std::fs::write(dir.path().join("c.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden.json"), "{}").unwrap();

        let files = discover_files(dir.path(), InputType::Json, 100).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![".hidden.json", "b.json", "sub/a.JSON"]);
    }

    #[test]
    fn truncates_to_max_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("{i}.md")), "x").unwrap();
        }
        let files = discover_files(dir.path(), InputType::Md, 3).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("0.md"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_files(&dir.path().join("nope"), InputType::Json, 10),
            Err(IndexError::MissingInput(_))
        ));
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_files(dir.path(), InputType::Txt, 10).unwrap().is_empty());
    }
}
