//! Architectural Enforcement Integration Tests
//!
//! Static checks over the workspace's production sources. The dispatch task
//! runs listeners on a tokio worker, so nothing reachable from an async
//! context may park the thread.
//!
//! The helpers here are line-based heuristics, shared by the test files in
//! `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// A forbidden call found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the call
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Short description of the rule that fired
    pub rule: &'static str,
    /// Offending source line, trimmed
    pub source: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.source
        )
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under `dir`, sorted
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Run `check` over every non-comment line of every file under `dir`
pub fn scan_directory<F>(dir: &Path, violations: &mut Vec<Violation>, mut check: F)
where
    F: FnMut(&[&str], usize, &str) -> Option<&'static str>,
{
    for path in rust_files(dir) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();

        for (idx, line) in lines.iter().enumerate() {
            let code_part = line.split("//").next().unwrap_or(line);
            if code_part.trim().is_empty() {
                continue;
            }
            if let Some(rule) = check(&lines, idx, code_part) {
                violations.push(Violation {
                    path: path.clone(),
                    line: idx + 1,
                    rule,
                    source: line.trim().to_string(),
                });
            }
        }
    }
}

/// Kind of the nearest enclosing function-like header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// `async fn` or an `async` block
    Async,
    /// Plain `fn`
    Sync,
    /// Module or impl level
    Item,
}

fn strip_visibility(line: &str) -> &str {
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return rest;
        }
    }
    line
}

fn header_context(line: &str) -> Option<Context> {
    let line = strip_visibility(line.trim());
    if line.starts_with("async fn ") || line.contains("async move {") || line.ends_with("async {")
    {
        return Some(Context::Async);
    }
    if line.starts_with("fn ") || line.starts_with("const fn ") || line.starts_with("unsafe fn ") {
        return Some(Context::Sync);
    }
    if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
        return Some(Context::Item);
    }
    None
}

/// Context of the closest header at or above `current_idx`
#[must_use]
pub fn enclosing_context(lines: &[&str], current_idx: usize) -> Context {
    (0..=current_idx)
        .rev()
        .find_map(|i| header_context(lines[i]))
        .unwrap_or(Context::Item)
}

/// Whether the line at `current_idx` belongs to test code
#[must_use]
pub fn is_in_test_code(lines: &[&str], current_idx: usize) -> bool {
    let is_test_marker = |line: &str| {
        let line = line.trim();
        line.starts_with("#[test]")
            || line.starts_with("#[tokio::test")
            || line.starts_with("#[cfg(test)]")
    };

    // Anything after a `#[cfg(test)]` module header is test code
    if lines[..current_idx]
        .windows(2)
        .any(|w| is_test_marker(w[0]) && w[1].trim_start().starts_with("mod "))
    {
        return true;
    }

    // Otherwise look for a marker directly above the enclosing function
    let Some(fn_idx) = (0..=current_idx)
        .rev()
        .find(|&i| matches!(header_context(lines[i]), Some(Context::Sync | Context::Async)))
    else {
        return false;
    };

    for i in (0..fn_idx).rev() {
        let line = lines[i].trim();
        if is_test_marker(line) {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_fn_detection() {
        let code = [
            "pub async fn join(self) {",
            "    std::thread::sleep(d);",
            "}",
        ];
        assert_eq!(enclosing_context(&code, 1), Context::Async);
    }

    #[test]
    fn test_async_block_detection() {
        let code = [
            "pub fn spawn(self) {",
            "    let dispatch = runtime.spawn(async move {",
            "        queue.pop_blocking();",
            "    });",
        ];
        assert_eq!(enclosing_context(&code, 2), Context::Async);
    }

    #[test]
    fn test_sync_fn_detection() {
        let code = [
            "impl<T> RingBuffer<T> {",
            "    pub fn pop_blocking(&self) -> T {",
            "        self.readable.wait(&mut slots);",
            "    }",
        ];
        assert_eq!(enclosing_context(&code, 2), Context::Sync);
        assert_eq!(enclosing_context(&code, 0), Context::Item);
    }

    #[test]
    fn test_test_function_detection() {
        let code = [
            "#[tokio::test]",
            "async fn test_something() {",
            "    std::thread::sleep(d);",
            "}",
        ];
        assert!(is_in_test_code(&code, 2));
    }

    #[test]
    fn test_test_module_detection() {
        let code = [
            "fn helper() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    async fn slow() {",
            "        std::thread::sleep(d);",
            "    }",
            "}",
        ];
        assert!(!is_in_test_code(&code, 0));
        assert!(is_in_test_code(&code, 4));
    }

    #[test]
    fn test_violation_display() {
        let v = Violation {
            path: PathBuf::from("src/lib.rs"),
            line: 3,
            rule: "Thread sleep in async context",
            source: "std::thread::sleep(d);".to_string(),
        };
        assert_eq!(
            v.to_string(),
            "src/lib.rs:3 - Thread sleep in async context: std::thread::sleep(d);"
        );
    }
}
