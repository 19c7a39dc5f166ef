//! Common test infrastructure for pgspawn integration tests.
//!
//! Provides:
//! - Docker availability check + skip macro for daemon-dependent tests
//! - Binary invocation helpers with an isolated environment
//! - Output assertion helpers

#![allow(dead_code)] // Shared between test binaries; not every helper is used by each

use std::process::{Command, Output};
use std::sync::atomic::{AtomicU32, Ordering};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Image used by docker-backed tests. Override with PGSPAWN_TEST_IMAGE to
/// test against a different tag.
pub fn test_image() -> String {
    std::env::var("PGSPAWN_TEST_IMAGE").unwrap_or_else(|_| "postgres:15".into())
}

/// A container name unique to this process and call site.
pub fn unique_name(prefix: &str) -> String {
    let count = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), count)
}

/// Check if a Docker daemon is reachable and responsive.
pub async fn docker_available() -> bool {
    match pgspawn::runtime::Runtime::connect() {
        Ok(runtime) => runtime.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// Skip test if no Docker daemon is available.
#[macro_export]
macro_rules! skip_if_no_docker {
    () => {
        if !crate::common::docker_available().await {
            eprintln!("Skipping test: Docker not available");
            return;
        }
    };
}

/// Run pgspawn with an isolated environment: the config-relevant variables
/// are cleared so the host's shell state can't leak into assertions.
pub fn run_pgspawn(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pgspawn"))
        .args(args)
        .current_dir(std::env::temp_dir())
        .env_remove("POSTGRES_IMAGE")
        .env_remove("APP_NAME")
        .env_remove("DATABASE_URL")
        .output()
        .expect("Failed to execute pgspawn")
}

/// Run pgspawn and assert success
pub fn run_pgspawn_ok(args: &[&str]) -> Output {
    let output = run_pgspawn(args);
    assert!(
        output.status.success(),
        "pgspawn {:?} failed (exit {:?}):\nstdout: {}\nstderr: {}",
        args,
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// Run pgspawn and assert failure with specific exit code
pub fn run_pgspawn_fails(args: &[&str], expected_code: i32) -> Output {
    let output = run_pgspawn(args);
    assert_eq!(
        output.status.code(),
        Some(expected_code),
        "pgspawn {:?} expected exit {} but got {:?}:\nstdout: {}\nstderr: {}",
        args,
        expected_code,
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

// ============================================================================
// Output assertion helpers
// ============================================================================

/// Parse JSON output and return the value
pub fn parse_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("Invalid JSON output:\n{}\nError: {}", stdout, e))
}

/// Assert stdout contains a substring
pub fn assert_stdout_contains(output: &Output, expected: &str) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(expected),
        "Expected stdout to contain '{}':\n{}",
        expected,
        stdout
    );
}

/// Assert stderr contains a substring
pub fn assert_stderr_contains(output: &Output, expected: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(expected),
        "Expected stderr to contain '{}':\n{}",
        expected,
        stderr
    );
}

/// Get stdout as string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Get stderr as string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
