//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the listener crates:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! The helpers here locate production sources and classify lines; the
//! policies live in `tests/`.

use std::path::{Path, PathBuf};

/// Source roots checked by the policies, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["chain/core/src", "chain/monitor/src"];

/// Workspace root, derived from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under the production source roots
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Lines before the file's top-level `#[cfg(test)]` module
///
/// Test modules sit at the end of each file, so everything after the
/// marker is test code. Indented `#[cfg(test)]` items inside an `impl` do
/// not end the scan.
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| line.trim_end() != "#[cfg(test)]")
        .collect()
}

/// Code portion of a line, comments removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// Plain `fn`
    Sync,
    /// Not inside a function (module level, impl header, ...)
    None,
}

/// Classify a function signature line, ignoring visibility
#[must_use]
pub fn signature_kind(line: &str) -> Option<FnKind> {
    let mut rest = line.trim();
    if let Some(stripped) = rest.strip_prefix("pub") {
        rest = match stripped.strip_prefix('(') {
            Some(scoped) => scoped.split_once(')').map_or(scoped, |(_, after)| after),
            None => stripped,
        }
        .trim_start();
    }
    for qualifier in ["const ", "unsafe "] {
        rest = rest.strip_prefix(qualifier).unwrap_or(rest);
    }

    if rest.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if rest.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Find the function enclosing `lines[idx]` by scanning backwards
#[must_use]
pub fn enclosing_fn(lines: &[&str], idx: usize) -> FnKind {
    for line in lines[..=idx].iter().rev() {
        if let Some(kind) = signature_kind(line) {
            return kind;
        }
        let trimmed = line.trim();
        if trimmed.starts_with("mod ") || (trimmed.starts_with("impl") && trimmed.ends_with('{')) {
            return FnKind::None;
        }
    }
    FnKind::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_kind_ignores_visibility() {
        assert_eq!(signature_kind("    pub async fn open(&mut self) {"), Some(FnKind::Async));
        assert_eq!(signature_kind("pub(crate) fn load() {"), Some(FnKind::Sync));
        assert_eq!(signature_kind("fn main() {"), Some(FnKind::Sync));
        assert_eq!(signature_kind("let f = fn_ptr;"), None);
    }

    #[test]
    fn test_enclosing_fn() {
        let code = [
            "impl Loader {",
            "    pub fn load() {",
            "        std::fs::read_to_string(path);",
            "    }",
            "    async fn open(&mut self) {",
            "        std::fs::read_to_string(path);",
            "    }",
            "}",
        ];

        assert_eq!(enclosing_fn(&code, 2), FnKind::Sync);
        assert_eq!(enclosing_fn(&code, 5), FnKind::Async);
        assert_eq!(enclosing_fn(&code, 0), FnKind::None);
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}"]);
    }

    #[test]
    fn test_indented_test_items_do_not_stop_the_scan() {
        let content = "impl A {\n    #[cfg(test)]\n    fn b() {}\n}\nfn c() {}\n#[cfg(test)]\nmod tests {}\n";
        assert_eq!(production_lines(content).len(), 5);
    }

    #[test]
    fn test_production_files_found() {
        assert!(!production_files().is_empty());
    }
}
