use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::ModuleDescriptor;
use crate::error::ForgeError;
use crate::profile::{self, RunConfiguration};

/// A named stage of testing with its own pass/fail semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Environment,
    Unit,
    Integration,
    Performance,
    NonInteractive,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Environment => "Environment",
            Phase::Unit => "Unit",
            Phase::Integration => "Integration",
            Phase::Performance => "Performance",
            Phase::NonInteractive => "NonInteractive",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested test suite. Closed enumeration: unknown kinds are rejected
/// at the string boundary, the phase table has no default branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestSuiteKind {
    All,
    Unit,
    Integration,
    Performance,
    Modules,
    Quick,
    NonInteractive,
}

impl TestSuiteKind {
    /// Ordered phases for this suite. Environment always precedes any
    /// phase that needs the module to be loadable.
    pub fn phases(&self) -> Vec<Phase> {
        match self {
            TestSuiteKind::All => vec![
                Phase::Environment,
                Phase::Unit,
                Phase::Integration,
                Phase::Performance,
            ],
            TestSuiteKind::Unit => vec![Phase::Unit],
            TestSuiteKind::Integration => vec![Phase::Integration],
            TestSuiteKind::Performance => vec![Phase::Environment, Phase::Performance],
            TestSuiteKind::Modules => vec![Phase::Environment],
            TestSuiteKind::Quick => vec![Phase::Unit],
            TestSuiteKind::NonInteractive => {
                vec![Phase::Environment, Phase::NonInteractive]
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestSuiteKind::All => "All",
            TestSuiteKind::Unit => "Unit",
            TestSuiteKind::Integration => "Integration",
            TestSuiteKind::Performance => "Performance",
            TestSuiteKind::Modules => "Modules",
            TestSuiteKind::Quick => "Quick",
            TestSuiteKind::NonInteractive => "NonInteractive",
        }
    }
}

impl fmt::Display for TestSuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestSuiteKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TestSuiteKind::All),
            "unit" => Ok(TestSuiteKind::Unit),
            "integration" => Ok(TestSuiteKind::Integration),
            "performance" => Ok(TestSuiteKind::Performance),
            "modules" => Ok(TestSuiteKind::Modules),
            "quick" => Ok(TestSuiteKind::Quick),
            "noninteractive" | "non-interactive" => Ok(TestSuiteKind::NonInteractive),
            _ => Err(ForgeError::UnknownSuiteKind {
                name: s.to_string(),
            }),
        }
    }
}

/// One result per (module, phase) execution cell. Immutable once
/// returned; the report generator only aggregates by grouping.
///
/// Serialized with the PascalCase keys the report consumers expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhaseResult {
    pub module_name: String,
    pub phase: Phase,
    pub success: bool,
    pub tests_run: u64,
    pub tests_passed: u64,
    pub tests_failed: u64,
    #[serde(rename = "Duration")]
    pub duration_seconds: f64,
    pub details: Vec<String>,
    pub error: Option<String>,
}

impl PhaseResult {
    pub fn new(module_name: &str, phase: Phase) -> Self {
        Self {
            module_name: module_name.to_string(),
            phase,
            success: false,
            tests_run: 0,
            tests_passed: 0,
            tests_failed: 0,
            duration_seconds: 0.0,
            details: Vec::new(),
            error: None,
        }
    }

    /// Absence of tests is not a failure.
    pub fn skipped(module_name: &str, phase: Phase, detail: &str) -> Self {
        let mut result = Self::new(module_name, phase);
        result.success = true;
        result.details.push(detail.to_string());
        result
    }

    /// A check that could not even be attempted.
    pub fn failure(module_name: &str, phase: Phase, message: &str) -> Self {
        let mut result = Self::new(module_name, phase);
        result.tests_run = 1;
        result.tests_failed = 1;
        result.details.push(message.to_string());
        result.error = Some(message.to_string());
        result
    }
}

/// Bound plan for one invocation: suite, snapshot of the catalog, ordered
/// phases and the resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub suite: TestSuiteKind,
    pub profile: String,
    pub started_at: DateTime<Utc>,
    pub modules: Vec<ModuleDescriptor>,
    pub phases: Vec<Phase>,
    pub configuration: RunConfiguration,
}

impl ExecutionPlan {
    pub fn cell_count(&self) -> usize {
        self.phases.len() * self.modules.len()
    }
}

/// Build an execution plan for a suite over a catalog snapshot.
pub fn build_plan(
    suite: TestSuiteKind,
    modules: Vec<ModuleDescriptor>,
    profile_name: &str,
) -> ExecutionPlan {
    let phases = suite.phases();
    debug_assert!(!phases.is_empty(), "every suite kind maps to phases");

    ExecutionPlan {
        suite,
        profile: profile_name.to_string(),
        started_at: Utc::now(),
        modules,
        phases,
        configuration: profile::resolve(profile_name),
    }
}
