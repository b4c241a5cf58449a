use anyhow::{Context as _, Result};
use indicatif::ProgressBar;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::catalog::{ModuleDescriptor, TestStrategy};
use crate::logging::{LogLevel, LogSink};
use crate::templates::{TemplateEngine, UNRESOLVED_MARKER};

/// The classified "shape" of a module, used to pick a scaffold template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Archetype {
    Manager,
    Provider,
    Core,
    Utility,
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Archetype::Manager => "Manager",
            Archetype::Provider => "Provider",
            Archetype::Core => "Core",
            Archetype::Utility => "Utility",
        };
        f.write_str(name)
    }
}

/// Modules on this list are Core regardless of naming.
const CORE_MODULES: &[&str] = &["core", "common", "bootstrap", "logging"];

/// What the analysis step extracts from a module lacking tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAnalysis {
    pub name: String,
    pub description: String,
    pub version: String,
    pub exports: Vec<String>,
    pub dependencies: Vec<String>,
    pub has_public_private_layout: bool,
}

/// Extract exported unit names, manifest metadata and directory shape.
///
/// Exports come from the manifest when it is present and not a wildcard,
/// else from the `public/` folder's file names.
pub fn analyze(module: &ModuleDescriptor) -> ModuleAnalysis {
    let manifest = module.manifest();

    let mut exports = manifest
        .as_ref()
        .filter(|m| !m.exports.is_empty() && !m.is_wildcard_export())
        .map(|m| m.exports.clone())
        .unwrap_or_default();

    let public_dir = module.path.join("public");
    if exports.is_empty() && public_dir.is_dir() {
        if let Ok(entries) = std::fs::read_dir(&public_dir) {
            exports = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "sh"))
                .filter_map(|e| {
                    e.path()
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                })
                .collect();
            exports.sort();
        }
    }

    let has_public_private_layout =
        public_dir.is_dir() && module.path.join("private").is_dir();

    ModuleAnalysis {
        name: module.name.clone(),
        description: manifest
            .as_ref()
            .and_then(|m| m.description.clone())
            .unwrap_or_else(|| format!("Tests for the {} module", module.name)),
        version: manifest
            .as_ref()
            .and_then(|m| m.version.clone())
            .unwrap_or_else(|| "0.1.0".to_string()),
        exports,
        dependencies: manifest.map(|m| m.dependencies).unwrap_or_default(),
        has_public_private_layout,
    }
}

/// Classify a module's archetype.
///
/// Name suffix wins, then the Core allow-list, then a majority vote over
/// the exported unit names' verb prefixes; Utility when nothing signals.
pub fn classify(analysis: &ModuleAnalysis) -> Archetype {
    let lowered = analysis.name.to_ascii_lowercase();

    if lowered.ends_with("manager") {
        return Archetype::Manager;
    }
    if lowered.ends_with("provider") {
        return Archetype::Provider;
    }
    if CORE_MODULES.contains(&lowered.as_str()) {
        return Archetype::Core;
    }

    let manager_verbs =
        Regex::new(r"^(create|add|remove|delete|set|update|start|stop|install|enable|disable)_")
            .expect("manager verb pattern is valid");
    let provider_verbs = Regex::new(r"^(get|list|fetch|read|resolve|query|find|show)_")
        .expect("provider verb pattern is valid");

    let manager_votes = analysis
        .exports
        .iter()
        .filter(|unit| manager_verbs.is_match(&unit.to_ascii_lowercase()))
        .count();
    let provider_votes = analysis
        .exports
        .iter()
        .filter(|unit| provider_verbs.is_match(&unit.to_ascii_lowercase()))
        .count();

    if manager_votes > provider_votes {
        Archetype::Manager
    } else if provider_votes > manager_votes {
        Archetype::Provider
    } else {
        Archetype::Utility
    }
}

/// Strip the archetype suffix to get the thing a module manages/provides.
fn subject_of(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    let stripped = lowered
        .trim_end_matches("manager")
        .trim_end_matches("provider")
        .trim_end_matches(['_', '-']);

    if stripped.is_empty() {
        lowered
    } else {
        stripped.to_string()
    }
}

fn exports_literal(exports: &[String]) -> String {
    let quoted: Vec<String> = exports.iter().map(|e| format!("\"{}\"", e)).collect();
    format!("({})", quoted.join(" "))
}

/// Per-module outcome of bulk generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldOutcome {
    pub module_name: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Renders starter test files for modules that have none.
pub struct ScaffoldGenerator {
    engine: TemplateEngine,
    logger: Arc<dyn LogSink>,
}

impl ScaffoldGenerator {
    pub fn new(logger: Arc<dyn LogSink>) -> Result<Self> {
        Ok(Self {
            engine: TemplateEngine::new()?,
            logger,
        })
    }

    /// Generate a starter test file for one module.
    ///
    /// Returns false (and leaves the file untouched) when the target
    /// already exists and `overwrite` was not requested.
    pub fn generate_test(
        &self,
        module: &ModuleDescriptor,
        template: Option<Archetype>,
        overwrite: bool,
    ) -> Result<bool> {
        let target = ModuleDescriptor::distributed_test_path(&module.path, &module.name);

        if target.exists() && !overwrite {
            self.logger.log(
                LogLevel::Warn,
                &format!("{} already exists, skipping (use overwrite)", target.display()),
            );
            return Ok(false);
        }

        let analysis = analyze(module);
        let archetype = template.unwrap_or_else(|| classify(&analysis));

        let mut context = tera::Context::new();
        context.insert("module_name", &analysis.name);
        context.insert("description", &analysis.description);
        context.insert("version", &analysis.version);
        context.insert("exports", &analysis.exports);
        context.insert("exports_literal", &exports_literal(&analysis.exports));
        context.insert("dependencies", &analysis.dependencies);
        context.insert("resource", &subject_of(&analysis.name));
        context.insert("subject", &subject_of(&analysis.name));
        context.insert("todo", UNRESOLVED_MARKER);

        let rendered = self
            .engine
            .render(archetype, &context)
            .with_context(|| format!("render {} scaffold for '{}'", archetype, module.name))?;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(&target, rendered)
            .with_context(|| format!("write {}", target.display()))?;

        self.logger.log(
            LogLevel::Success,
            &format!(
                "Scaffolded {} tests for '{}' at {}",
                archetype,
                module.name,
                target.display()
            ),
        );
        Ok(true)
    }
}

/// Bulk scaffold generation across a catalog.
///
/// Only `TestStrategy::None` modules are candidates (optionally further
/// restricted by name). Modules are processed in batches of
/// `max_concurrency`; a whole batch joins before the next one starts and
/// one module's panic never poisons its batch-mates.
pub async fn generate_missing_tests(
    generator: Arc<ScaffoldGenerator>,
    catalog: &[ModuleDescriptor],
    module_filter: Option<&[String]>,
    max_concurrency: usize,
    overwrite: bool,
    progress: Option<&ProgressBar>,
) -> Vec<ScaffoldOutcome> {
    let candidates: Vec<ModuleDescriptor> = catalog
        .iter()
        .filter(|m| m.test_strategy == TestStrategy::None)
        .filter(|m| {
            module_filter
                .map(|f| f.iter().any(|name| name == &m.name))
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    if let Some(bar) = progress {
        bar.set_length(candidates.len() as u64);
    }

    let batch_size = max_concurrency.max(1);
    let mut outcomes = Vec::with_capacity(candidates.len());

    for batch in candidates.chunks(batch_size) {
        let mut workers = JoinSet::new();

        for module in batch.iter().cloned() {
            let generator = generator.clone();
            workers.spawn_blocking(move || {
                let name = module.name.clone();
                match generator.generate_test(&module, None, overwrite) {
                    Ok(true) => ScaffoldOutcome {
                        module_name: name,
                        success: true,
                        error: None,
                    },
                    Ok(false) => ScaffoldOutcome {
                        module_name: name,
                        success: false,
                        error: Some("test file already exists".to_string()),
                    },
                    Err(e) => ScaffoldOutcome {
                        module_name: name,
                        success: false,
                        error: Some(format!("{:#}", e)),
                    },
                }
            });
        }

        // Batch barrier: everything joins before the next batch starts.
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.unwrap_or_else(|e| ScaffoldOutcome {
                module_name: "<unknown>".to_string(),
                success: false,
                error: Some(format!("Worker crashed: {}", e)),
            });
            if let Some(bar) = progress {
                bar.inc(1);
            }
            outcomes.push(outcome);
        }
    }

    outcomes.sort_by(|a, b| a.module_name.cmp(&b.module_name));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullSink;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn module(root: &Path, name: &str) -> ModuleDescriptor {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let script_path = dir.join(format!("{}.sh", name));
        fs::write(&script_path, "noop() {\n  :\n}\n").unwrap();
        ModuleDescriptor {
            name: name.to_string(),
            path: dir.clone(),
            manifest_path: {
                let m = dir.join("module.toml");
                m.is_file().then_some(m)
            },
            script_path,
            test_strategy: TestStrategy::None,
            test_path: dir.join("tests").join(format!("{}.test.sh", name)),
        }
    }

    fn analysis(name: &str, exports: &[&str]) -> ModuleAnalysis {
        ModuleAnalysis {
            name: name.to_string(),
            description: String::new(),
            version: "0.1.0".to_string(),
            exports: exports.iter().map(|s| s.to_string()).collect(),
            dependencies: Vec::new(),
            has_public_private_layout: false,
        }
    }

    #[test]
    fn suffix_heuristics_win_first() {
        assert_eq!(classify(&analysis("session_manager", &[])), Archetype::Manager);
        assert_eq!(classify(&analysis("SecretProvider", &[])), Archetype::Provider);
    }

    #[test]
    fn core_allow_list_applies() {
        assert_eq!(classify(&analysis("core", &[])), Archetype::Core);
        assert_eq!(classify(&analysis("logging", &[])), Archetype::Core);
    }

    #[test]
    fn verb_majority_breaks_no_suffix() {
        assert_eq!(
            classify(&analysis("sessions", &["create_session", "remove_session", "get_count"])),
            Archetype::Manager
        );
        assert_eq!(
            classify(&analysis("lookup", &["get_entry", "list_entries", "set_flag"])),
            Archetype::Provider
        );
        assert_eq!(classify(&analysis("misc", &["frobnicate"])), Archetype::Utility);
    }

    #[test]
    fn analyze_prefers_manifest_exports() {
        let tmp = TempDir::new().unwrap();
        let mut m = module(tmp.path(), "withmanifest");
        fs::write(
            m.path.join("module.toml"),
            "version = \"2.0.0\"\ndescription = \"desc\"\nexports = [\"get_a\", \"get_b\"]\n",
        )
        .unwrap();
        m.manifest_path = Some(m.path.join("module.toml"));

        let a = analyze(&m);
        assert_eq!(a.exports, vec!["get_a", "get_b"]);
        assert_eq!(a.version, "2.0.0");
        assert_eq!(a.description, "desc");
    }

    #[test]
    fn analyze_falls_back_to_public_folder() {
        let tmp = TempDir::new().unwrap();
        let m = module(tmp.path(), "pub");
        fs::create_dir_all(m.path.join("public")).unwrap();
        fs::create_dir_all(m.path.join("private")).unwrap();
        fs::write(m.path.join("public").join("get_x.sh"), "").unwrap();
        fs::write(m.path.join("public").join("set_x.sh"), "").unwrap();

        let a = analyze(&m);
        assert_eq!(a.exports, vec!["get_x", "set_x"]);
        assert!(a.has_public_private_layout);
    }

    #[test]
    fn generate_is_non_destructive_by_default() {
        let tmp = TempDir::new().unwrap();
        let m = module(tmp.path(), "alpha");
        let generator = ScaffoldGenerator::new(Arc::new(NullSink)).unwrap();

        assert!(generator.generate_test(&m, None, false).unwrap());
        let first = fs::read_to_string(&m.test_path).unwrap();

        // Second call without overwrite: false, file unmodified.
        assert!(!generator.generate_test(&m, None, false).unwrap());
        assert_eq!(fs::read_to_string(&m.test_path).unwrap(), first);

        assert!(generator.generate_test(&m, None, true).unwrap());
    }

    #[test]
    fn generated_file_has_no_raw_tokens() {
        let tmp = TempDir::new().unwrap();
        let m = module(tmp.path(), "widget_manager");
        let generator = ScaffoldGenerator::new(Arc::new(NullSink)).unwrap();
        generator.generate_test(&m, None, false).unwrap();

        let content = fs::read_to_string(&m.test_path).unwrap();
        assert!(content.contains("widget_manager"));
        assert!(content.contains("test_widget_lifecycle"));
        assert!(!content.contains("{{"));
    }

    #[tokio::test]
    async fn bulk_generation_only_touches_untested_modules() {
        let tmp = TempDir::new().unwrap();
        let untested = module(tmp.path(), "alpha");
        let mut tested = module(tmp.path(), "beta");
        tested.test_strategy = TestStrategy::Distributed;

        let generator = Arc::new(ScaffoldGenerator::new(Arc::new(NullSink)).unwrap());
        let outcomes = generate_missing_tests(
            generator,
            &[untested.clone(), tested],
            None,
            2,
            false,
            None,
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].module_name, "alpha");
        assert!(outcomes[0].success);
        assert!(untested.test_path.exists());
    }

    #[tokio::test]
    async fn bulk_generation_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let good = module(tmp.path(), "good");
        // "bad" points its module path at a plain file, so creating the
        // tests directory under it must fail.
        let mut bad = module(tmp.path(), "bad");
        fs::remove_dir_all(&bad.path).unwrap();
        fs::write(tmp.path().join("blocker"), "").unwrap();
        bad.path = tmp.path().join("blocker");

        let generator = Arc::new(ScaffoldGenerator::new(Arc::new(NullSink)).unwrap());
        let outcomes =
            generate_missing_tests(generator, &[bad, good.clone()], None, 4, false, None).await;

        assert_eq!(outcomes.len(), 2);
        let good_outcome = outcomes.iter().find(|o| o.module_name == "good").unwrap();
        assert!(good_outcome.success);
        let bad_outcome = outcomes.iter().find(|o| o.module_name == "bad").unwrap();
        assert!(!bad_outcome.success);
        assert!(bad_outcome.error.is_some());
    }
}
