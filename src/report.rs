use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ForgeError, Result};
use crate::plan::{PhaseResult, TestSuiteKind};

/// Aggregate statistics computed purely from the result collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSummary {
    pub suite: TestSuiteKind,
    pub total_modules: usize,
    pub modules_passed: usize,
    pub modules_failed: usize,
    pub total_tests: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
    /// Percentage rounded to 2 decimals; 0 when no tests ran.
    pub success_rate: f64,
    pub total_duration_seconds: f64,
}

/// The report payload: summary plus the raw, untouched results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: Vec<PhaseResult>,
}

/// Per-module success: a module passes iff all of its results passed.
pub fn module_success(results: &[PhaseResult]) -> BTreeMap<String, bool> {
    let mut modules: BTreeMap<String, bool> = BTreeMap::new();
    for result in results {
        modules
            .entry(result.module_name.clone())
            .and_modify(|ok| *ok &= result.success)
            .or_insert(result.success);
    }
    modules
}

pub fn summarize(results: &[PhaseResult], suite: TestSuiteKind) -> RunSummary {
    let modules = module_success(results);
    let modules_passed = modules.values().filter(|ok| **ok).count();

    let total_tests: u64 = results.iter().map(|r| r.tests_run).sum();
    let tests_passed: u64 = results.iter().map(|r| r.tests_passed).sum();
    let tests_failed: u64 = results.iter().map(|r| r.tests_failed).sum();

    let success_rate = if total_tests == 0 {
        0.0
    } else {
        let rate = tests_passed as f64 / total_tests as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    };

    RunSummary {
        suite,
        total_modules: modules.len(),
        modules_passed,
        modules_failed: modules.len() - modules_passed,
        total_tests,
        tests_passed,
        tests_failed,
        success_rate,
        total_duration_seconds: results.iter().map(|r| r.duration_seconds).sum(),
    }
}

/// Editor-integration export entry, camelCase per that consumer's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditorResult {
    module: String,
    phase: String,
    success: bool,
    tests_run: u64,
    tests_passed: u64,
    tests_failed: u64,
    duration: f64,
    details: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EditorExport {
    version: String,
    timestamp: String,
    results: Vec<EditorResult>,
}

/// Renders the run's artifacts under an output root.
pub struct ReportGenerator {
    output_root: PathBuf,
    include_editor_export: bool,
}

impl ReportGenerator {
    pub fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            include_editor_export: false,
        }
    }

    pub fn with_editor_export(mut self) -> Self {
        self.include_editor_export = true;
        self
    }

    /// Emit the JSON, HTML and plain-text artifacts (plus the optional
    /// editor export) and return the written paths.
    pub fn generate(&self, results: &[PhaseResult], suite: TestSuiteKind) -> Result<Vec<PathBuf>> {
        self.ensure_output_dirs()?;

        let report = RunReport {
            summary: summarize(results, suite),
            results: results.to_vec(),
        };

        let mut written = Vec::new();

        let json_path = self.output_root.join("reports").join("test-report.json");
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| ForgeError::ReportError(e.to_string()))?;
        fs::write(&json_path, json)?;
        written.push(json_path);

        let html_path = self.output_root.join("reports").join("test-report.html");
        fs::write(&html_path, render_html(&report))?;
        written.push(html_path);

        let log_path = self.output_root.join("logs").join("test-run.log");
        fs::write(&log_path, render_text(&report))?;
        written.push(log_path);

        if self.include_editor_export {
            let editor_path = self.output_root.join("reports").join("editor-results.json");
            let export = EditorExport {
                version: "1.0".to_string(),
                timestamp: Utc::now().to_rfc3339(),
                results: results
                    .iter()
                    .map(|r| EditorResult {
                        module: r.module_name.clone(),
                        phase: r.phase.to_string(),
                        success: r.success,
                        tests_run: r.tests_run,
                        tests_passed: r.tests_passed,
                        tests_failed: r.tests_failed,
                        duration: r.duration_seconds,
                        details: r.details.clone(),
                        error: r.error.clone(),
                    })
                    .collect(),
            };
            let json = serde_json::to_string_pretty(&export)
                .map_err(|e| ForgeError::ReportError(e.to_string()))?;
            fs::write(&editor_path, json)?;
            written.push(editor_path);
        }

        Ok(written)
    }

    /// Create reports/, logs/ and coverage/ under the output root.
    /// Safe to call repeatedly.
    fn ensure_output_dirs(&self) -> Result<()> {
        for sub in ["reports", "logs", "coverage"] {
            fs::create_dir_all(self.output_root.join(sub))?;
        }
        Ok(())
    }
}

fn render_html(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{} Test Report</title>\n", summary.suite));
    html.push_str(
        "<style>\nbody { font-family: sans-serif; margin: 2em; }\n\
         .pass { color: #2e7d32; }\n.fail { color: #c62828; }\n\
         .summary { background: #f5f5f5; padding: 1em; border-radius: 4px; }\n\
         h2 { border-bottom: 1px solid #ddd; padding-bottom: 0.2em; }\n</style>\n",
    );
    html.push_str("</head>\n<body>\n");

    html.push_str(&format!("<h1>{} Test Report</h1>\n", summary.suite));
    html.push_str("<div class=\"summary\">\n");
    html.push_str(&format!(
        "<p>Modules: {} ({} passed, {} failed)</p>\n",
        summary.total_modules, summary.modules_passed, summary.modules_failed
    ));
    html.push_str(&format!(
        "<p>Tests: {} ({} passed, {} failed)</p>\n",
        summary.total_tests, summary.tests_passed, summary.tests_failed
    ));
    html.push_str(&format!(
        "<p>Success rate: {:.2}% in {:.2}s</p>\n",
        summary.success_rate, summary.total_duration_seconds
    ));
    html.push_str("</div>\n");

    for (module, ok) in module_success(&report.results) {
        let class = if ok { "pass" } else { "fail" };
        let verdict = if ok { "PASS" } else { "FAIL" };
        html.push_str(&format!(
            "<h2 class=\"{}\">{} &mdash; {}</h2>\n<ul>\n",
            class, module, verdict
        ));

        for result in report.results.iter().filter(|r| r.module_name == module) {
            let class = if result.success { "pass" } else { "fail" };
            html.push_str(&format!(
                "<li class=\"{}\">{}: {}/{} passed ({:.2}s)</li>\n",
                class,
                result.phase,
                result.tests_passed,
                result.tests_run,
                result.duration_seconds
            ));
            for detail in &result.details {
                html.push_str(&format!("<li class=\"{}\">&nbsp;&nbsp;{}</li>\n", class, detail));
            }
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_text(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut text = String::new();

    text.push_str(&format!("{} Test Report\n", summary.suite));
    text.push_str(&"=".repeat(60));
    text.push('\n');
    text.push_str(&format!(
        "Modules: {} ({} passed, {} failed)\n",
        summary.total_modules, summary.modules_passed, summary.modules_failed
    ));
    text.push_str(&format!(
        "Tests:   {} ({} passed, {} failed)\n",
        summary.total_tests, summary.tests_passed, summary.tests_failed
    ));
    text.push_str(&format!(
        "Success rate: {:.2}% in {:.2}s\n\n",
        summary.success_rate, summary.total_duration_seconds
    ));

    for (module, ok) in module_success(&report.results) {
        let verdict = if ok { "PASS" } else { "FAIL" };
        text.push_str(&format!("[{}] {}\n", verdict, module));

        for result in report.results.iter().filter(|r| r.module_name == module) {
            text.push_str(&format!(
                "  {}: {}/{} passed ({:.2}s)\n",
                result.phase, result.tests_passed, result.tests_run, result.duration_seconds
            ));
            for detail in &result.details {
                text.push_str(&format!("    {}\n", detail));
            }
        }
        text.push('\n');
    }

    text
}
