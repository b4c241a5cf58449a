//! testforge - Unified Test Orchestration Engine
//!
//! Discovers script modules and their test suites, plans multi-phase test
//! runs, executes them sequentially or across a bounded worker pool, and
//! renders reports. Also scaffolds starter tests for modules lacking them.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod phases;
pub mod plan;
pub mod profile;
pub mod report;
pub mod runner;
pub mod scaffold;
pub mod templates;

// Re-export commonly used types
pub use catalog::{CatalogBuilder, ModuleDescriptor, ModuleManifest, TestStrategy};
pub use config::Config;
pub use engine::{ExecutionEngine, ExecutionStrategy};
pub use error::ForgeError;
pub use events::{EventBus, RunEvent};
pub use logging::{ConsoleSink, LogLevel, LogSink};
pub use orchestrator::Orchestrator;
pub use plan::{ExecutionPlan, Phase, PhaseResult, TestSuiteKind};
pub use profile::{MockLevel, RunConfiguration, Verbosity};
pub use report::{RunReport, RunSummary};
pub use runner::{MockRunner, ProcessRunner, RunnerCounts, TestRunner};
pub use scaffold::{Archetype, ScaffoldGenerator, ScaffoldOutcome};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Default config filename
    pub const DEFAULT_CONFIG_NAME: &str = "config.toml";

    /// Default external test runner command
    pub const DEFAULT_RUNNER: &str = "stest";

    /// Default maximum concurrency for bulk scaffold generation
    pub const DEFAULT_SCAFFOLD_CONCURRENCY: usize = 4;
}
