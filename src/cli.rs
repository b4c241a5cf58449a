use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::defaults;

#[derive(Parser)]
#[command(
    name = "testforge",
    author = "Jarad DeLorenzo <jaradd@gmail.com>",
    version,
    about = "testforge - Unified test orchestration for script module trees",
    long_about = "Discovers which modules have test suites, plans multi-phase runs, executes them sequentially or in parallel, and renders JSON/HTML/text reports. Modules without tests can be scaffolded from archetype templates.",
    disable_version_flag = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    /// Project root (uses modules/, tests/, test-output/ beneath it)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test suite across the module catalog
    Run {
        /// Suite kind: all, unit, integration, performance, modules, quick, non-interactive
        suite: String,

        /// Configuration profile (Development, CI, Production, Debug)
        #[arg(short, long)]
        profile: Option<String>,

        /// Restrict the run to these modules (repeatable)
        #[arg(short, long)]
        module: Vec<String>,

        /// Execute modules within a phase on a bounded worker pool
        #[arg(long)]
        parallel: bool,

        /// Directory for report artifacts (defaults to the configured output root)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip report generation
        #[arg(long)]
        no_report: bool,
    },

    /// Generate starter test files for modules without tests
    #[command(alias = "gen")]
    Scaffold {
        /// Restrict generation to these modules (repeatable)
        #[arg(short, long)]
        module: Vec<String>,

        /// Modules scaffolded concurrently per batch
        #[arg(long, default_value_t = defaults::DEFAULT_SCAFFOLD_CONCURRENCY)]
        max_concurrency: usize,

        /// Replace an existing generated test file
        #[arg(long)]
        overwrite: bool,
    },

    /// List catalogued modules and their test strategies
    #[command(alias = "ls")]
    Catalog {
        /// Restrict the listing to these modules (repeatable)
        #[arg(short, long)]
        module: Vec<String>,
    },

    /// Generate shell completions for testforge
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_concurrency_defaults_from_crate_constants() {
        let cli = Cli::try_parse_from(["testforge", "scaffold"]).unwrap();
        match cli.command {
            Some(Commands::Scaffold {
                max_concurrency, ..
            }) => {
                assert_eq!(max_concurrency, defaults::DEFAULT_SCAFFOLD_CONCURRENCY);
            }
            _ => panic!("expected the scaffold subcommand"),
        }
    }
}
