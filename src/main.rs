use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use testforge::cli::{Cli, Commands};
use testforge::logging::NullSink;
use testforge::report::summarize;
use testforge::{
    Config, ForgeError, Orchestrator, PhaseResult, ScaffoldOutcome, TestStrategy, TestSuiteKind,
};

/// JSON response structure for --json output mode
#[derive(Serialize, Deserialize)]
struct JsonResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl JsonResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }

    fn print(&self) {
        println!(
            "{}",
            serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json_mode = cli.json;

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completion { shell } = &command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, name, &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.root {
        Some(root) => Config::with_root(root),
        None => Config::load()
            .await
            .context("Failed to load configuration")?,
    };

    let mut orchestrator = Orchestrator::new(config);
    if json_mode {
        orchestrator = orchestrator.with_logger(Arc::new(NullSink));
    }

    match command {
        Commands::Run {
            suite,
            profile,
            module,
            parallel,
            output,
            no_report,
        } => {
            let suite: TestSuiteKind = suite.parse()?;
            let profile = profile.unwrap_or_else(|| orchestrator.config().default_profile.clone());
            let filter = (!module.is_empty()).then_some(module.as_slice());

            match orchestrator
                .run_suite(
                    suite,
                    &profile,
                    filter,
                    parallel,
                    output.as_deref(),
                    !no_report,
                )
                .await
            {
                Ok(results) => {
                    let summary = summarize(&results, suite);
                    if json_mode {
                        JsonResponse::success(serde_json::json!({
                            "summary": summary,
                            "results": results,
                        }))
                        .print();
                    } else {
                        print_run_results(&results);
                    }
                    if summary.modules_failed > 0 {
                        std::process::exit(1);
                    }
                }
                Err(ForgeError::EnvironmentPhase { module, results }) => {
                    if json_mode {
                        JsonResponse::error(format!(
                            "Environment phase failed for module '{}'",
                            module
                        ))
                        .print();
                    } else {
                        print_run_results(&results);
                        eprintln!(
                            "{} Environment check failed for '{}', run aborted",
                            "✗".bright_red().bold(),
                            module.bright_yellow()
                        );
                    }
                    std::process::exit(1);
                }
                Err(e) => {
                    if json_mode {
                        JsonResponse::error(e.to_string()).print();
                        std::process::exit(1);
                    }
                    return Err(e.into());
                }
            }
        }

        Commands::Scaffold {
            module,
            max_concurrency,
            overwrite,
        } => {
            let filter = (!module.is_empty()).then_some(module.as_slice());
            let progress = (!json_mode).then(|| {
                let bar = ProgressBar::new(0);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner} [{bar:30}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar.set_message("scaffolding");
                bar
            });

            let outcomes = orchestrator
                .generate_missing_tests(filter, max_concurrency, overwrite, progress.as_ref())
                .await?;

            if let Some(bar) = progress {
                bar.finish_and_clear();
            }

            if json_mode {
                JsonResponse::success(serde_json::json!({ "outcomes": outcomes })).print();
            } else {
                print_scaffold_outcomes(&outcomes);
            }
            if outcomes.iter().any(|o| !o.success && o.error.as_deref() != Some("test file already exists")) {
                std::process::exit(1);
            }
        }

        Commands::Catalog { module } => {
            let filter = (!module.is_empty()).then_some(module.as_slice());
            let catalog = orchestrator.build_catalog(filter);

            if json_mode {
                JsonResponse::success(serde_json::json!({ "modules": catalog })).print();
            } else {
                print_catalog(&catalog);
            }
        }

        Commands::Completion { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn print_run_results(results: &[PhaseResult]) {
    println!();
    for result in results {
        let marker = if result.success {
            "✓".bright_green().bold()
        } else {
            "✗".bright_red().bold()
        };
        println!(
            "{} {} {} {}/{} passed ({:.2}s)",
            marker,
            result.module_name.bright_blue(),
            result.phase.to_string().bright_black(),
            result.tests_passed,
            result.tests_run,
            result.duration_seconds
        );
        if !result.success {
            for detail in &result.details {
                println!("    {}", detail.bright_black());
            }
        }
    }
    println!();
}

fn print_scaffold_outcomes(outcomes: &[ScaffoldOutcome]) {
    if outcomes.is_empty() {
        println!("{} Every catalogued module already has tests", "ℹ".bright_blue());
        return;
    }

    for outcome in outcomes {
        if outcome.success {
            println!("{} {}", "✓".bright_green().bold(), outcome.module_name.bright_blue());
        } else {
            println!(
                "{} {} {}",
                "✗".bright_red().bold(),
                outcome.module_name.bright_blue(),
                outcome
                    .error
                    .as_deref()
                    .unwrap_or("unknown failure")
                    .bright_black()
            );
        }
    }
}

fn print_catalog(catalog: &[testforge::ModuleDescriptor]) {
    if catalog.is_empty() {
        println!("{} No modules catalogued", "ℹ".bright_blue());
        return;
    }

    println!();
    for module in catalog {
        let strategy = match module.test_strategy {
            TestStrategy::Distributed => "distributed".bright_green(),
            TestStrategy::Centralized => "centralized".bright_cyan(),
            TestStrategy::None => "no tests".bright_yellow(),
        };
        println!(
            "  {} [{}] {}",
            module.name.bright_blue().bold(),
            strategy,
            module.test_path.display().to_string().bright_black()
        );
    }
    println!();
}
