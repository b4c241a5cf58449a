use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{ModuleDescriptor, TestStrategy};
use crate::plan::{Phase, PhaseResult};
use crate::profile::RunConfiguration;
use crate::runner::{RunnerCounts, TestRunner};

/// Module reloads slower than this fail the Performance phase.
pub const RELOAD_THRESHOLD_SECONDS: f64 = 5.0;

/// Comment text shorter than this does not count as help metadata.
const MIN_HELP_LENGTH: usize = 20;

/// One strategy per phase kind. Handlers catch their own failures and
/// report them as failed results; they never panic past this boundary.
pub trait PhaseHandler: Send + Sync {
    fn phase(&self) -> Phase;
    fn handle(&self, module: &ModuleDescriptor, config: &RunConfiguration) -> PhaseResult;
}

/// Shared collaborators handed to handlers at registry construction.
#[derive(Clone)]
pub struct HandlerContext {
    pub runner: Arc<dyn TestRunner>,
    pub integration_dir: PathBuf,
}

/// Static lookup from phase kind to handler. An unregistered phase is a
/// programming error, not a runtime condition.
pub struct PhaseRegistry {
    handlers: HashMap<Phase, Box<dyn PhaseHandler>>,
}

impl PhaseRegistry {
    pub fn new(context: HandlerContext) -> Self {
        let mut handlers: HashMap<Phase, Box<dyn PhaseHandler>> = HashMap::new();
        handlers.insert(Phase::Environment, Box::new(EnvironmentHandler));
        handlers.insert(
            Phase::Unit,
            Box::new(UnitHandler {
                runner: context.runner.clone(),
            }),
        );
        handlers.insert(
            Phase::Integration,
            Box::new(IntegrationHandler {
                runner: context.runner,
                integration_dir: context.integration_dir,
            }),
        );
        handlers.insert(Phase::Performance, Box::new(PerformanceHandler));
        handlers.insert(Phase::NonInteractive, Box::new(NonInteractiveHandler));

        Self { handlers }
    }

    pub fn handler(&self, phase: Phase) -> &dyn PhaseHandler {
        self.handlers
            .get(&phase)
            .map(|h| h.as_ref())
            .expect("a handler is registered for every phase kind")
    }
}

/// Load a module: read its entry script and enumerate invokable units.
pub fn load_module(module: &ModuleDescriptor) -> Result<Vec<String>> {
    std::fs::read_to_string(&module.script_path).with_context(|| {
        format!(
            "Failed to load entry script {}",
            module.script_path.display()
        )
    })?;

    invokable_units(module)
}

/// Exported unit names for a module, in declaration order.
///
/// Sources, first hit wins: manifest `exports` (when present and not
/// wildcard), `public/` file stems, function definitions scanned from
/// the entry script.
pub fn invokable_units(module: &ModuleDescriptor) -> Result<Vec<String>> {
    if let Some(manifest) = module.manifest() {
        if !manifest.exports.is_empty() && !manifest.is_wildcard_export() {
            return Ok(manifest.exports);
        }
    }

    let public_dir = module.path.join("public");
    if public_dir.is_dir() {
        let mut units: Vec<String> = std::fs::read_dir(&public_dir)
            .with_context(|| format!("Failed to read {}", public_dir.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "sh"))
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
            })
            .collect();
        units.sort();
        if !units.is_empty() {
            return Ok(units);
        }
    }

    let script = std::fs::read_to_string(&module.script_path).with_context(|| {
        format!(
            "Failed to read entry script {}",
            module.script_path.display()
        )
    })?;
    Ok(scan_function_names(&script))
}

fn scan_function_names(script: &str) -> Vec<String> {
    let pattern = Regex::new(r"(?m)^\s*(?:function\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\(\)")
        .expect("function pattern is valid");

    pattern
        .captures_iter(script)
        .map(|c| c[1].to_string())
        .collect()
}

/// Help metadata for one unit: the leading comment block of its
/// `public/<unit>.sh` file, else the comment block directly above its
/// definition in the entry script.
fn help_metadata(module: &ModuleDescriptor, unit: &str) -> String {
    let public_file = module.path.join("public").join(format!("{}.sh", unit));
    if let Ok(source) = std::fs::read_to_string(&public_file) {
        return leading_comment_block(&source);
    }

    let Ok(script) = std::fs::read_to_string(&module.script_path) else {
        return String::new();
    };
    comment_block_above(&script, unit)
}

fn leading_comment_block(source: &str) -> String {
    let mut comment = String::new();
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("#!") {
            continue;
        }
        if let Some(text) = trimmed.strip_prefix('#') {
            comment.push_str(text.trim());
            comment.push(' ');
        } else if trimmed.is_empty() && comment.is_empty() {
            continue;
        } else {
            break;
        }
    }
    comment.trim().to_string()
}

fn comment_block_above(script: &str, unit: &str) -> String {
    let lines: Vec<&str> = script.lines().collect();
    let definition = lines.iter().position(|line| {
        let trimmed = line.trim();
        trimmed.starts_with(&format!("{}()", unit))
            || trimmed.starts_with(&format!("function {}", unit))
    });

    let Some(index) = definition else {
        return String::new();
    };

    let mut comment_lines = Vec::new();
    for line in lines[..index].iter().rev() {
        let trimmed = line.trim();
        if let Some(text) = trimmed.strip_prefix('#') {
            comment_lines.push(text.trim());
        } else {
            break;
        }
    }
    comment_lines.reverse();
    comment_lines.join(" ")
}

fn has_nontrivial_help(module: &ModuleDescriptor, unit: &str) -> bool {
    help_metadata(module, unit).len() >= MIN_HELP_LENGTH
}

// ---------------------------------------------------------------------------
// Handlers

struct EnvironmentHandler;

impl PhaseHandler for EnvironmentHandler {
    fn phase(&self) -> Phase {
        Phase::Environment
    }

    fn handle(&self, module: &ModuleDescriptor, _config: &RunConfiguration) -> PhaseResult {
        let started = Instant::now();
        let mut result = PhaseResult::new(&module.name, Phase::Environment);

        match load_module(module) {
            Ok(units) if !units.is_empty() => {
                // One loadability check per invokable unit.
                result.success = true;
                result.tests_run = units.len() as u64;
                result.tests_passed = units.len() as u64;
                result
                    .details
                    .push(format!("Module loads, exports {} invokable units", units.len()));
            }
            Ok(_) => {
                // Loads, but nothing can be invoked: recorded as a failed test.
                result.tests_run = 1;
                result.tests_failed = 1;
                result
                    .details
                    .push("Module loads but exposes no invokable units".to_string());
            }
            Err(e) => {
                result = PhaseResult::failure(&module.name, Phase::Environment, &format!("{:#}", e));
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        result
    }
}

struct UnitHandler {
    runner: Arc<dyn TestRunner>,
}

impl PhaseHandler for UnitHandler {
    fn phase(&self) -> Phase {
        Phase::Unit
    }

    fn handle(&self, module: &ModuleDescriptor, config: &RunConfiguration) -> PhaseResult {
        let started = Instant::now();

        if module.test_strategy == TestStrategy::None || !module.test_path.exists() {
            let mut result =
                PhaseResult::skipped(&module.name, Phase::Unit, "No unit tests discovered");
            result.duration_seconds = started.elapsed().as_secs_f64();
            return result;
        }

        let mut result = PhaseResult::new(&module.name, Phase::Unit);

        match self.runner.run(&module.test_path, config) {
            Ok(value) => {
                let counts = RunnerCounts::from_value(&value);
                result.tests_run = counts.total;
                result.tests_passed = counts.passed;
                result.tests_failed = counts.failed;
                result.success = counts.failed == 0;
                result.details.push(format!(
                    "{}: {}/{} tests passed",
                    module.test_path.display(),
                    counts.passed,
                    counts.total
                ));
            }
            Err(e) => {
                result = PhaseResult::failure(&module.name, Phase::Unit, &format!("{:#}", e));
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        result
    }
}

struct IntegrationHandler {
    runner: Arc<dyn TestRunner>,
    integration_dir: PathBuf,
}

impl IntegrationHandler {
    fn matching_test_files(&self, module_name: &str) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.integration_dir) else {
            return Vec::new();
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let file_name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                file_name.starts_with(module_name) && file_name.ends_with(".test.sh")
            })
            .collect();
        files.sort();
        files
    }
}

impl PhaseHandler for IntegrationHandler {
    fn phase(&self) -> Phase {
        Phase::Integration
    }

    fn handle(&self, module: &ModuleDescriptor, config: &RunConfiguration) -> PhaseResult {
        let started = Instant::now();
        let files = self.matching_test_files(&module.name);

        if files.is_empty() {
            let mut result = PhaseResult::skipped(
                &module.name,
                Phase::Integration,
                "No integration tests discovered",
            );
            result.duration_seconds = started.elapsed().as_secs_f64();
            return result;
        }

        let mut result = PhaseResult::new(&module.name, Phase::Integration);
        result.success = true;

        for file in &files {
            match self.runner.run(file, config) {
                Ok(value) => {
                    let counts = RunnerCounts::from_value(&value);
                    result.tests_run += counts.total;
                    result.tests_passed += counts.passed;
                    result.tests_failed += counts.failed;
                    if counts.failed > 0 {
                        result.success = false;
                    }
                    result.details.push(format!(
                        "{}: {}/{} tests passed",
                        file.display(),
                        counts.passed,
                        counts.total
                    ));
                }
                Err(e) => {
                    // One broken file fails the phase but not the run.
                    result.tests_run += 1;
                    result.tests_failed += 1;
                    result.success = false;
                    result
                        .details
                        .push(format!("{}: runner error: {:#}", file.display(), e));
                    result.error = Some(format!("{:#}", e));
                }
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        result
    }
}

struct PerformanceHandler;

impl PhaseHandler for PerformanceHandler {
    fn phase(&self) -> Phase {
        Phase::Performance
    }

    fn handle(&self, module: &ModuleDescriptor, _config: &RunConfiguration) -> PhaseResult {
        let started = Instant::now();
        let mut result = PhaseResult::new(&module.name, Phase::Performance);

        match load_module(module) {
            Ok(_) => {
                let elapsed = started.elapsed().as_secs_f64();
                result.tests_run = 1;
                if elapsed < RELOAD_THRESHOLD_SECONDS {
                    result.success = true;
                    result.tests_passed = 1;
                    result
                        .details
                        .push(format!("Module reload took {:.3}s", elapsed));
                } else {
                    result.tests_failed = 1;
                    result.details.push(format!(
                        "Module reload took {:.3}s, over the {:.0}s threshold",
                        elapsed, RELOAD_THRESHOLD_SECONDS
                    ));
                }
            }
            Err(e) => {
                result = PhaseResult::failure(&module.name, Phase::Performance, &format!("{:#}", e));
            }
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        result
    }
}

struct NonInteractiveHandler;

impl PhaseHandler for NonInteractiveHandler {
    fn phase(&self) -> Phase {
        Phase::NonInteractive
    }

    fn handle(&self, module: &ModuleDescriptor, _config: &RunConfiguration) -> PhaseResult {
        let started = Instant::now();

        let units = match invokable_units(module) {
            Ok(units) => units,
            Err(e) => {
                let mut result =
                    PhaseResult::failure(&module.name, Phase::NonInteractive, &format!("{:#}", e));
                result.duration_seconds = started.elapsed().as_secs_f64();
                return result;
            }
        };

        if units.is_empty() {
            let mut result = PhaseResult::skipped(
                &module.name,
                Phase::NonInteractive,
                "No invokable units to check",
            );
            result.duration_seconds = started.elapsed().as_secs_f64();
            return result;
        }

        let mut result = PhaseResult::new(&module.name, Phase::NonInteractive);
        for unit in &units {
            result.tests_run += 1;
            if has_nontrivial_help(module, unit) {
                result.tests_passed += 1;
            } else {
                result.tests_failed += 1;
                result
                    .details
                    .push(format!("'{}' has no usable help metadata", unit));
            }
        }
        result.success = result.tests_failed == 0;
        result.details.push(format!(
            "{}/{} units document themselves",
            result.tests_passed, result.tests_run
        ));

        result.duration_seconds = started.elapsed().as_secs_f64();
        result
    }
}
