use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::profile::{RunConfiguration, Verbosity};

/// Boundary to the external unit-test runner. The orchestrator only ever
/// sees the runner's JSON result object and probes it defensively.
pub trait TestRunner: Send + Sync {
    fn run(&self, test_path: &Path, config: &RunConfiguration) -> Result<Value>;
}

/// Aggregate counts extracted from a runner result object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerCounts {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
}

impl RunnerCounts {
    /// Probe the historically-stable result shapes, oldest API last:
    ///
    /// 1. `{total, passed, failed}`
    /// 2. `{tests_run, tests_passed, tests_failed}`
    /// 3. `{summary: <either of the above>}`
    /// 4. `{results: [{passed: bool} | {status: "pass"/"fail"}, ..]}`
    ///
    /// A shape mismatch never errors; it yields zero counts.
    pub fn from_value(value: &Value) -> Self {
        if let Some(counts) = Self::from_flat(value, "total", "passed", "failed") {
            return counts;
        }
        if let Some(counts) = Self::from_flat(value, "tests_run", "tests_passed", "tests_failed") {
            return counts;
        }
        if let Some(summary) = value.get("summary") {
            let counts = Self::from_value(summary);
            if counts != Self::default() {
                return counts;
            }
        }
        if let Some(cases) = value.get("results").and_then(Value::as_array) {
            return Self::from_cases(cases);
        }

        Self::default()
    }

    fn from_flat(value: &Value, total: &str, passed: &str, failed: &str) -> Option<Self> {
        // All three keys or no match: a partial shape must not be
        // mistaken for this one with missing counts defaulted.
        let total = value.get(total)?.as_u64()?;
        let passed = value.get(passed)?.as_u64()?;
        let failed = value.get(failed)?.as_u64()?;
        Some(Self {
            total,
            passed,
            failed,
        })
    }

    fn from_cases(cases: &[Value]) -> Self {
        let mut counts = Self::default();
        for case in cases {
            let passed = case
                .get("passed")
                .and_then(Value::as_bool)
                .or_else(|| case.get("status").and_then(Value::as_str).map(|s| s == "pass"));

            if let Some(passed) = passed {
                counts.total += 1;
                if passed {
                    counts.passed += 1;
                } else {
                    counts.failed += 1;
                }
            }
        }
        counts
    }
}

/// Runs the configured external runner executable and parses its stdout
/// as JSON. Coverage and machine-readable result files are requested
/// under `artifacts_dir` when one is set.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    command: String,
    args: Vec<String>,
    artifacts_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            args,
            artifacts_dir: None,
        }
    }

    pub fn with_artifacts_dir(mut self, dir: PathBuf) -> Self {
        self.artifacts_dir = Some(dir);
        self
    }

    fn build_args(&self, test_path: &Path, config: &RunConfiguration) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(test_path.display().to_string());
        args.push("--format".to_string());
        args.push("json".to_string());
        args.push("--timeout-minutes".to_string());
        args.push(config.timeout_minutes.to_string());

        if config.retry_count > 0 {
            args.push("--retries".to_string());
            args.push(config.retry_count.to_string());
        }

        match config.verbosity {
            Verbosity::Quiet => args.push("--quiet".to_string()),
            Verbosity::Detailed | Verbosity::Diagnostic => args.push("--verbose".to_string()),
            Verbosity::Normal => {}
        }

        if let Some(dir) = &self.artifacts_dir {
            args.push("--results-out".to_string());
            args.push(dir.join("results.json").display().to_string());

            if config.enable_coverage {
                args.push("--coverage".to_string());
                args.push("--coverage-out".to_string());
                args.push(dir.join("coverage").display().to_string());
            }
        } else if config.enable_coverage {
            args.push("--coverage".to_string());
        }

        args
    }
}

impl TestRunner for ProcessRunner {
    fn run(&self, test_path: &Path, config: &RunConfiguration) -> Result<Value> {
        let executable = which::which(&self.command)
            .with_context(|| format!("Test runner '{}' not found on PATH", self.command))?;

        let output = Command::new(executable)
            .args(self.build_args(test_path, config))
            .output()
            .with_context(|| format!("Failed to invoke test runner '{}'", self.command))?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        // A failing suite exits nonzero but still reports counts, so the
        // exit status is ignored as long as the output parses.
        parse_runner_stdout(&stdout).ok_or_else(|| {
            anyhow!(
                "Runner '{}' produced no JSON result (stderr: {})",
                self.command,
                String::from_utf8_lossy(&output.stderr).trim()
            )
        })
    }
}

/// The runner may print human-readable noise before the result document;
/// fall back to the last non-empty line when the full stream fails.
fn parse_runner_stdout(stdout: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        return Some(value);
    }

    stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| serde_json::from_str(line.trim()).ok())
}

/// Canned runner used by the orchestrator's own tests: maps a path
/// substring to a fixed result value.
#[derive(Debug, Default, Clone)]
pub struct MockRunner {
    responses: Vec<(String, Value)>,
    pub fallback: Option<Value>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, path_fragment: &str, value: Value) -> Self {
        self.responses.push((path_fragment.to_string(), value));
        self
    }

    pub fn with_fallback(mut self, value: Value) -> Self {
        self.fallback = Some(value);
        self
    }
}

impl TestRunner for MockRunner {
    fn run(&self, test_path: &Path, _config: &RunConfiguration) -> Result<Value> {
        let path = test_path.display().to_string();

        for (fragment, value) in &self.responses {
            if path.contains(fragment.as_str()) {
                return Ok(value.clone());
            }
        }

        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("MockRunner has no response for {}", path))
    }
}
