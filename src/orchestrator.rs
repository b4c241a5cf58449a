use indicatif::ProgressBar;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{CatalogBuilder, ModuleDescriptor};
use crate::config::Config;
use crate::engine::{ExecutionEngine, ExecutionStrategy};
use crate::error::Result;
use crate::events::EventBus;
use crate::logging::{ConsoleSink, LogLevel, LogSink};
use crate::phases::{HandlerContext, PhaseRegistry};
use crate::plan::{build_plan, PhaseResult, TestSuiteKind};
use crate::profile;
use crate::report::{summarize, ReportGenerator};
use crate::runner::{ProcessRunner, TestRunner};
use crate::scaffold::{self, ScaffoldGenerator, ScaffoldOutcome};

/// Explicitly constructed orchestration facade. Holds the event store and
/// all collaborators as instance state so independent runs never share
/// anything process-wide.
pub struct Orchestrator {
    config: Config,
    logger: Arc<dyn LogSink>,
    runner: Arc<dyn TestRunner>,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let runner = ProcessRunner::new(
            &config.runner_settings.command,
            config.runner_settings.args.clone(),
        )
        .with_artifacts_dir(config.output_root.clone());

        Self {
            config,
            logger: Arc::new(ConsoleSink::new()),
            runner: Arc::new(runner),
            events: EventBus::new(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn TestRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot the module catalog. Rebuilt on every call; never cached.
    pub fn build_catalog(&self, module_filter: Option<&[String]>) -> Vec<ModuleDescriptor> {
        CatalogBuilder::new(
            self.config.modules_root.clone(),
            self.config.tests_root.clone(),
            self.logger.clone(),
        )
        .build(module_filter)
    }

    /// Run a test suite end to end: catalog, plan, execute, report.
    ///
    /// Returns the flat result collection; report artifacts land under
    /// `output_path` (defaults to the configured output root).
    pub async fn run_suite(
        &self,
        suite: TestSuiteKind,
        profile_name: &str,
        module_filter: Option<&[String]>,
        parallel: bool,
        output_path: Option<&Path>,
        generate_report: bool,
    ) -> Result<Vec<PhaseResult>> {
        if !profile::is_known_profile(profile_name) {
            self.logger.log(
                LogLevel::Warn,
                &format!(
                    "Unknown profile '{}', falling back to base configuration",
                    profile_name
                ),
            );
        }

        let modules = self.build_catalog(module_filter);
        let plan = build_plan(suite, modules, profile_name);
        self.logger.log(
            LogLevel::Info,
            &format!(
                "Running {} suite: {} phases x {} modules ({} profile)",
                suite,
                plan.phases.len(),
                plan.modules.len(),
                profile_name
            ),
        );

        let registry = PhaseRegistry::new(HandlerContext {
            runner: self.runner.clone(),
            integration_dir: self.config.get_integration_test_dir(),
        });
        let strategy = if parallel {
            ExecutionStrategy::Parallel
        } else {
            ExecutionStrategy::Sequential
        };
        let engine = ExecutionEngine::new(Arc::new(registry), self.logger.clone(), strategy);

        let results = match engine.run(&plan).await {
            Ok(results) => results,
            Err(e) => {
                self.events.publish(
                    "run_aborted",
                    json!({ "suite": suite.as_str(), "reason": e.to_string() }),
                );
                return Err(e);
            }
        };

        let summary = summarize(&results, suite);
        self.events.publish(
            "run_completed",
            json!({
                "suite": suite.as_str(),
                "profile": profile_name,
                "total_tests": summary.total_tests,
                "success_rate": summary.success_rate,
                "modules_failed": summary.modules_failed,
            }),
        );

        if generate_report {
            let output_root: PathBuf = output_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.config.output_root.clone());
            let written = ReportGenerator::new(&output_root)
                .with_editor_export()
                .generate(&results, suite)?;
            for path in &written {
                self.logger
                    .log(LogLevel::Info, &format!("Wrote {}", path.display()));
            }
        }

        let level = if summary.modules_failed == 0 {
            LogLevel::Success
        } else {
            LogLevel::Error
        };
        self.logger.log(
            level,
            &format!(
                "{} suite finished: {}/{} tests passed ({:.2}%)",
                suite, summary.tests_passed, summary.total_tests, summary.success_rate
            ),
        );

        Ok(results)
    }

    /// Scaffold starter tests for every catalogued module without any.
    pub async fn generate_missing_tests(
        &self,
        module_filter: Option<&[String]>,
        max_concurrency: usize,
        overwrite: bool,
        progress: Option<&ProgressBar>,
    ) -> anyhow::Result<Vec<ScaffoldOutcome>> {
        let catalog = self.build_catalog(None);
        let generator = Arc::new(ScaffoldGenerator::new(self.logger.clone())?);

        let outcomes = scaffold::generate_missing_tests(
            generator,
            &catalog,
            module_filter,
            max_concurrency,
            overwrite,
            progress,
        )
        .await;

        let generated = outcomes.iter().filter(|o| o.success).count();
        self.events.publish(
            "scaffold_completed",
            json!({
                "candidates": outcomes.len(),
                "generated": generated,
            }),
        );
        self.logger.log(
            LogLevel::Success,
            &format!("Scaffolded {}/{} modules", generated, outcomes.len()),
        );

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullSink;
    use crate::runner::MockRunner;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn orchestrator(tmp: &TempDir) -> Orchestrator {
        Orchestrator::new(Config::with_root(tmp.path()))
            .with_logger(Arc::new(NullSink))
            .with_runner(Arc::new(
                MockRunner::new().with_fallback(json!({"total": 2, "passed": 2, "failed": 0})),
            ))
    }

    fn add_module(tmp: &TempDir, name: &str) {
        let dir = tmp.path().join("modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.sh", name)), "go() {\n  :\n}\n").unwrap();
    }

    #[tokio::test]
    async fn run_suite_publishes_completion_event() {
        let tmp = TempDir::new().unwrap();
        add_module(&tmp, "alpha");
        let orch = orchestrator(&tmp);

        let results = orch
            .run_suite(TestSuiteKind::Quick, "CI", None, false, None, false)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(orch.events().get_events(Some("run_completed")).len(), 1);
    }

    #[tokio::test]
    async fn run_suite_writes_reports_when_asked() {
        let tmp = TempDir::new().unwrap();
        add_module(&tmp, "alpha");
        let orch = orchestrator(&tmp);

        orch.run_suite(TestSuiteKind::All, "CI", None, true, None, true)
            .await
            .unwrap();

        let reports = tmp.path().join("test-output").join("reports");
        assert!(reports.join("test-report.json").is_file());
        assert!(reports.join("test-report.html").is_file());
        assert!(reports.join("editor-results.json").is_file());
    }

    #[tokio::test]
    async fn independent_orchestrators_do_not_share_events() {
        let tmp = TempDir::new().unwrap();
        add_module(&tmp, "alpha");

        let first = orchestrator(&tmp);
        let second = orchestrator(&tmp);
        first
            .run_suite(TestSuiteKind::Quick, "CI", None, false, None, false)
            .await
            .unwrap();

        assert_eq!(first.events().get_events(None).len(), 1);
        assert!(second.events().get_events(None).is_empty());
    }
}
