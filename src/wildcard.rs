//! Wildcard expansion relative to a context's working directory.

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::debug;

/// True when `word` contains `*`, `?` or `[`.
pub fn has_wildcard(word: &str) -> bool {
    word.contains(['*', '?', '['])
}

/// Sorted paths matching `pattern`.
///
/// A relative pattern is matched under `dir` and its matches are returned
/// relative to it. A pattern that is malformed or matches nothing expands to
/// itself.
pub fn expand(dir: &Path, pattern: &str) -> Vec<String> {
    let relative = Path::new(pattern).is_relative();
    let full = if relative {
        let Some(dir) = dir.to_str() else {
            return vec![pattern.to_string()];
        };
        PathBuf::from(Pattern::escape(dir)).join(pattern)
    } else {
        PathBuf::from(pattern)
    };
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let paths = match glob::glob_with(&full.to_string_lossy(), options) {
        Ok(paths) => paths,
        Err(err) => {
            debug!(%pattern, %err, "malformed wildcard");
            return vec![pattern.to_string()];
        }
    };
    let mut found: Vec<String> = paths
        .filter_map(|entry| entry.ok())
        .map(|path| match path.strip_prefix(dir) {
            Ok(rest) if relative => rest.display().to_string(),
            _ => path.display().to_string(),
        })
        .collect();
    if found.is_empty() {
        return vec![pattern.to_string()];
    }
    found.sort();
    found
}
