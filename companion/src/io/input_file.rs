//! Puzzle input artifact written next to the generated code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// File name used for a puzzle's input: `INPUT(<name>).txt`.
///
/// Path separators in the name are replaced so the file always lands directly
/// in the working directory.
pub fn input_file_name(puzzle_name: &str) -> String {
    let safe: String = puzzle_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    format!("INPUT({safe}).txt")
}

/// Write the input with trailing newlines stripped and return its absolute path.
///
/// Snippets run in their own scratch directory, so the recorded path must not
/// depend on the caller's current directory.
pub fn write_input_file(working_dir: &Path, puzzle_name: &str, raw: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(working_dir)
        .with_context(|| format!("create working dir {}", working_dir.display()))?;
    let working_dir = fs::canonicalize(working_dir)
        .with_context(|| format!("resolve working dir {}", working_dir.display()))?;
    let path = working_dir.join(input_file_name(puzzle_name));
    let end = raw
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    fs::write(&path, &raw[..end]).with_context(|| format!("write input {}", path.display()))?;
    debug!(path = %path.display(), bytes = end, "input written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_newlines_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_input_file(temp.path(), "Day 1: Historian Hysteria", b"\n3   4\n4   3\n\n")
            .expect("write");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("INPUT(Day 1: Historian Hysteria).txt")
        );
        assert_eq!(fs::read(&path).expect("read"), b"\n3   4\n4   3");
    }

    #[test]
    fn relative_working_dir_yields_absolute_path() {
        let temp = tempfile::tempdir_in(".").expect("tempdir");
        let relative = Path::new(".").join(temp.path().file_name().expect("dir name"));
        let path = write_input_file(&relative, "Day 2", b"x\n").expect("write");
        assert!(path.is_absolute());
        let expected = fs::canonicalize(temp.path()).expect("canonical");
        assert_eq!(path, expected.join("INPUT(Day 2).txt"));
    }

    #[test]
    fn separators_in_names_stay_inside_working_dir() {
        assert_eq!(input_file_name("a/b\\c"), "INPUT(a_b_c).txt");
    }
}
