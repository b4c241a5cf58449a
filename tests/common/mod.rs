use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use testforge::logging::NullSink;
use testforge::{Config, MockRunner, Orchestrator};

/// Create a test environment with a temporary project tree.
#[allow(dead_code)]
pub fn setup_test_env() -> (TempDir, Config) {
    let temp_dir = TempDir::new().expect("create temp dir");
    let config = Config::with_root(temp_dir.path());
    (temp_dir, config)
}

/// Orchestrator wired with a silent logger and a canned runner.
#[allow(dead_code)]
pub fn quiet_orchestrator(config: Config, runner: MockRunner) -> Orchestrator {
    Orchestrator::new(config)
        .with_logger(Arc::new(NullSink))
        .with_runner(Arc::new(runner))
}

/// A runner whose every answer is `passed` passing tests.
#[allow(dead_code)]
pub fn all_pass_runner(passed: u64) -> MockRunner {
    MockRunner::new().with_fallback(json!({
        "total": passed,
        "passed": passed,
        "failed": 0,
    }))
}

/// Write a module directory with an entry script.
#[allow(dead_code)]
pub fn add_module(root: &Path, name: &str, script: &str) -> PathBuf {
    let dir = root.join("modules").join(name);
    fs::create_dir_all(&dir).expect("create module dir");
    fs::write(dir.join(format!("{}.sh", name)), script).expect("write entry script");
    dir
}

/// A module exporting one well-documented function.
#[allow(dead_code)]
pub fn add_healthy_module(root: &Path, name: &str) -> PathBuf {
    add_module(
        root,
        name,
        "# Returns a friendly greeting for the given name.\nsay_hello() {\n  echo hello\n}\n",
    )
}

/// Give a module a co-located (distributed) test file.
#[allow(dead_code)]
pub fn add_distributed_tests(module_dir: &Path, name: &str) {
    let tests = module_dir.join("tests");
    fs::create_dir_all(&tests).expect("create tests dir");
    fs::write(
        tests.join(format!("{}.test.sh", name)),
        "test_placeholder() {\n  :\n}\n",
    )
    .expect("write test file");
}

/// Drop an integration test file into the shared integration directory.
#[allow(dead_code)]
pub fn add_integration_test(root: &Path, file_name: &str) {
    let dir = root.join("tests").join("integration");
    fs::create_dir_all(&dir).expect("create integration dir");
    fs::write(dir.join(file_name), "test_integration() {\n  :\n}\n")
        .expect("write integration test");
}

/// Write a module manifest.
#[allow(dead_code)]
pub fn add_manifest(module_dir: &Path, contents: &str) {
    fs::write(module_dir.join("module.toml"), contents).expect("write manifest");
}

/// Runner response builder for a mixed pass/fail suite.
#[allow(dead_code)]
pub fn counts(total: u64, passed: u64, failed: u64) -> Value {
    json!({"total": total, "passed": passed, "failed": failed})
}
