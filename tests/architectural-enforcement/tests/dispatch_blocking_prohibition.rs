//! Integration Test: Blocking Call Prohibition in Async Contexts
//!
//! **Policy**: Production code MUST NOT park a thread inside an `async fn` or
//! an `async` block. The dispatch task delivers every event of a worker; a
//! blocked tokio worker stalls delivery for every listener.
//!
//! **Forbidden in async contexts**:
//! - `std::thread::sleep` / `thread::sleep`
//! - `RingBuffer::push_blocking` / `RingBuffer::pop_blocking`
//! - `Runtime::block_on` / `Handle::block_on`
//!
//! **Acceptable**: the same calls in plain functions (worker threads, the
//! ring buffer itself) and in test code.

use architectural_enforcement::{
    enclosing_context, is_in_test_code, scan_directory, workspace_root, Context, Violation,
};

const PRODUCTION_DIRS: [&str; 2] = ["emitter/core/src", "emitter/cli/src"];

const FORBIDDEN: [(&str, &str); 5] = [
    ("std::thread::sleep", "Thread sleep in async context"),
    ("thread::sleep(", "Thread sleep in async context"),
    (".push_blocking(", "Blocking queue push in async context"),
    (".pop_blocking(", "Blocking queue pop in async context"),
    (".block_on(", "Nested block_on in async context"),
];

fn find_violations() -> Vec<Violation> {
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        scan_directory(&root.join(dir), &mut violations, |lines, idx, code| {
            if is_in_test_code(lines, idx) || enclosing_context(lines, idx) != Context::Async {
                return None;
            }
            FORBIDDEN
                .iter()
                .find(|(needle, _)| code.contains(needle))
                .map(|(_, rule)| *rule)
        });
    }

    violations
}

#[test]
fn test_production_dirs_exist() {
    let root = workspace_root();
    for dir in PRODUCTION_DIRS {
        assert!(
            root.join(dir).is_dir(),
            "expected production sources at {}",
            root.join(dir).display()
        );
    }
}

#[test]
fn test_no_blocking_calls_in_async_code() {
    let violations = find_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking calls found in async production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use instead:");
        eprintln!("  - tokio::time::sleep(..).await");
        eprintln!("  - RingBuffer::push / RingBuffer::pop with a Notify wake-up");
        eprintln!("  - tokio::task::spawn_blocking for work that must block");

        panic!(
            "\nFound {} blocking call(s) in async production code.",
            violations.len()
        );
    }
}

#[test]
fn test_detector_flags_sleep_in_async_block() {
    let dir = tempfile_dir_with(
        "lib.rs",
        "pub fn spawn() {\n    tokio::spawn(async move {\n        std::thread::sleep(d);\n    });\n}\n",
    );

    let mut violations = Vec::new();
    scan_directory(dir.path(), &mut violations, |lines, idx, code| {
        (enclosing_context(lines, idx) == Context::Async && code.contains("std::thread::sleep"))
            .then_some("Thread sleep in async context")
    });

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 3);
}

fn tempfile_dir_with(name: &str, content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(name), content).unwrap();
    dir
}
