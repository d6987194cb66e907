//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the listener crates MUST NOT call sleep.
//! The engine waits on socket I/O and channels only; periodic work in the
//! monitor uses `tokio::time::interval()`.

use std::fs;
use std::path::Path;

use architectural_enforcement::{code_part, production_files, production_lines};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = production_files()
        .iter()
        .flat_map(|path| sleep_violations(path))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE instead:");
        eprintln!("  - Awaiting socket reads and channel receives");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("  - Timeouts in test code");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn sleep_violations(path: &Path) -> Vec<String> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    production_lines(&content)
        .iter()
        .enumerate()
        .filter(|(_, line)| is_sleep_call(code_part(line)))
        .map(|(idx, line)| format!("{}:{} - {}", path.display(), idx + 1, line.trim()))
        .collect()
}

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
        assert!(is_sleep_call("    std::thread::sleep(delay);"));
        assert!(!is_sleep_call("    retry.tick().await;"));
        assert!(!is_sleep_call(code_part("    // never sleep(...) here")));
    }
}
