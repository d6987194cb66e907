//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions in the listener crates MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net`, not `std::fs`, `std::net`.
//! **Acceptable**: blocking calls in non-async functions (configuration is
//! loaded before the listener task starts) and test code.

use std::fs;
use std::path::Path;

use architectural_enforcement::{
    code_part, enclosing_fn, production_files, production_lines, FnKind,
};

/// Test that production code does not use blocking I/O in async context
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<String> = production_files()
        .iter()
        .flat_map(|path| blocking_io_violations(path))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN in async code:");
        eprintln!("  - std::fs::read_to_string(), std::fs::metadata(), Path::exists()");
        eprintln!("  - std::net::*, std::os::unix::net::*");
        eprintln!("  - std::process::Command");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::try_exists().await");
        eprintln!("  - tokio::net::UnixStream::connect().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn blocking_io_violations(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines = production_lines(&content);

    let mut violations = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(kind) = blocking_call(code_part(line)) else {
            continue;
        };
        if enclosing_fn(&lines, idx) == FnKind::Sync {
            continue;
        }
        violations.push(format!(
            "{}:{} - Blocking {kind}: {}",
            path.display(),
            idx + 1,
            line.trim()
        ));
    }
    violations
}

/// Name the kind of blocking call on a line, if any
fn blocking_call(code: &str) -> Option<&'static str> {
    if code.contains("std::fs::") || code.contains("use std::fs") {
        Some("file I/O")
    } else if code.contains("std::net::")
        || code.contains("use std::net")
        || code.contains("std::os::unix::net")
    {
        Some("network I/O")
    } else if code.contains("std::process::Command") {
        Some("process I/O")
    } else if code.contains(".exists()") {
        Some("filesystem probe")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_io_detection() {
        assert_eq!(
            blocking_call("    let s = std::fs::read_to_string(path)?;"),
            Some("file I/O")
        );
        assert_eq!(
            blocking_call("use std::os::unix::net::UnixStream;"),
            Some("network I/O")
        );
        assert_eq!(blocking_call("    if path.exists() {"), Some("filesystem probe"));
        assert_eq!(
            blocking_call("    tokio::fs::try_exists(path).await"),
            None
        );
    }

    #[test]
    fn test_sync_function_is_acceptable() {
        let code = [
            "pub fn load_config(path: &Path) -> Result<Config, Error> {",
            "    let contents = std::fs::read_to_string(path)?;",
            "}",
        ];
        assert_eq!(enclosing_fn(&code, 1), FnKind::Sync);
    }

    #[test]
    fn test_async_function_is_flagged() {
        let code = [
            "    pub async fn open(&mut self) -> bool {",
            "        self.path.exists()",
            "    }",
        ];
        assert_eq!(enclosing_fn(&code, 1), FnKind::Async);
    }
}
