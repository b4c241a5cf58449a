//! End-to-end scenario: a modules root with Alpha (co-located tests,
//! 3 pass / 1 fail), Beta (no tests at all) and Gamma (loads nothing
//! invokable), exercised through the public orchestrator entry point.

mod common;

use common::*;
use serde_json::json;
use testforge::{ForgeError, MockRunner, Phase, TestStrategy, TestSuiteKind};

fn scenario_runner() -> MockRunner {
    MockRunner::new()
        .respond("Alpha", counts(4, 3, 1))
        .with_fallback(counts(0, 0, 0))
}

fn build_scenario(root: &std::path::Path) {
    let alpha = add_healthy_module(root, "Alpha");
    add_distributed_tests(&alpha, "Alpha");

    add_healthy_module(root, "Beta");

    // Gamma's entry script defines no functions, so the Environment
    // phase records it as unloadable for testing purposes.
    add_module(root, "Gamma", "echo side effects only\n");
}

#[tokio::test]
async fn unit_suite_skips_beta_and_surfaces_alphas_failure() {
    let (tmp, config) = setup_test_env();
    build_scenario(tmp.path());
    let orch = quiet_orchestrator(config, scenario_runner());

    let results = orch
        .run_suite(TestSuiteKind::Unit, "CI", None, false, None, false)
        .await
        .unwrap();

    // One Unit-phase result per module, catalog (name) order.
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.phase == Phase::Unit));

    let alpha = results.iter().find(|r| r.module_name == "Alpha").unwrap();
    assert!(!alpha.success);
    assert_eq!(alpha.tests_run, 4);
    assert_eq!(alpha.tests_passed, 3);
    assert_eq!(alpha.tests_failed, 1);

    let beta = results.iter().find(|r| r.module_name == "Beta").unwrap();
    assert!(beta.success, "absence of tests is a skip, not a failure");
    assert_eq!(beta.tests_run, 0);

    let gamma = results.iter().find(|r| r.module_name == "Gamma").unwrap();
    assert!(gamma.success);
    assert_eq!(gamma.tests_run, 0);
}

#[tokio::test]
async fn all_suite_aborts_on_gammas_environment_failure() {
    let (tmp, config) = setup_test_env();
    build_scenario(tmp.path());
    let orch = quiet_orchestrator(config, scenario_runner());

    let err = orch
        .run_suite(TestSuiteKind::All, "CI", None, false, None, false)
        .await
        .unwrap_err();

    match err {
        ForgeError::EnvironmentPhase { module, results } => {
            assert_eq!(module, "Gamma");
            // The run never reached the Unit phase for any module.
            assert!(results.iter().all(|r| r.phase == Phase::Environment));
            assert!(results.iter().any(|r| r.module_name == "Alpha" && r.success));
        }
        other => panic!("expected environment abort, got {other:?}"),
    }

    // The abort is visible on the event bus.
    assert_eq!(orch.events().get_events(Some("run_aborted")).len(), 1);
    assert!(orch.events().get_events(Some("run_completed")).is_empty());
}

#[tokio::test]
async fn catalog_reflects_each_modules_strategy() {
    let (tmp, config) = setup_test_env();
    build_scenario(tmp.path());
    std::fs::create_dir_all(tmp.path().join("tests").join("Beta")).unwrap();

    let orch = quiet_orchestrator(config, scenario_runner());
    let catalog = orch.build_catalog(None);

    assert_eq!(catalog.len(), 3);
    let strategy = |name: &str| {
        catalog
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.test_strategy)
            .unwrap()
    };
    assert_eq!(strategy("Alpha"), TestStrategy::Distributed);
    assert_eq!(strategy("Beta"), TestStrategy::Centralized);
    assert_eq!(strategy("Gamma"), TestStrategy::None);
}

#[tokio::test]
async fn failed_run_still_produces_a_complete_report() {
    let (tmp, config) = setup_test_env();
    build_scenario(tmp.path());
    let orch = quiet_orchestrator(config, scenario_runner());

    orch.run_suite(TestSuiteKind::Unit, "CI", None, false, None, true)
        .await
        .unwrap();

    let report_path = tmp
        .path()
        .join("test-output")
        .join("reports")
        .join("test-report.json");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();

    assert_eq!(report["Results"].as_array().unwrap().len(), 3);
    assert_eq!(report["Summary"]["TotalTests"], json!(4));
    assert_eq!(report["Summary"]["TestsPassed"], json!(3));
    // 3 of 4 tests passed: 75.00, rounded to two decimals.
    assert_eq!(report["Summary"]["SuccessRate"], json!(75.0));
}
