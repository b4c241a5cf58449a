use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::logging::{LogLevel, LogSink};

/// Where a module's tests live, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStrategy {
    /// Test file co-located with the module under `<module>/tests/`.
    Distributed,
    /// Test directory keyed by module name under the shared tests root.
    Centralized,
    /// No tests discovered; `test_path` is the scaffold target.
    None,
}

/// Optional module manifest (`module.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    /// Exported unit names; a single "*" entry means wildcard export.
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ModuleManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let manifest = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        Ok(manifest)
    }

    pub fn is_wildcard_export(&self) -> bool {
        self.exports.iter().any(|e| e == "*")
    }
}

/// Identity and test-discovery result for one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub script_path: PathBuf,
    pub test_strategy: TestStrategy,
    /// Resolved path for test execution; for `TestStrategy::None` this is
    /// the target a scaffold would be written to.
    pub test_path: PathBuf,
}

impl ModuleDescriptor {
    pub fn manifest(&self) -> Option<ModuleManifest> {
        self.manifest_path
            .as_ref()
            .and_then(|p| ModuleManifest::load(p).ok())
    }

    pub fn has_tests(&self) -> bool {
        self.test_strategy != TestStrategy::None
    }

    /// Conventional location of a distributed test file for this module.
    pub fn distributed_test_path(path: &Path, name: &str) -> PathBuf {
        path.join("tests").join(format!("{}.test.sh", name))
    }
}

/// Scans a modules root and resolves each module's test strategy.
#[derive(Clone)]
pub struct CatalogBuilder {
    modules_root: PathBuf,
    tests_root: PathBuf,
    logger: Arc<dyn LogSink>,
}

impl CatalogBuilder {
    pub fn new(modules_root: PathBuf, tests_root: PathBuf, logger: Arc<dyn LogSink>) -> Self {
        Self {
            modules_root,
            tests_root,
            logger,
        }
    }

    /// Build the module catalog.
    ///
    /// Discovery never aborts the larger run: a missing modules root
    /// yields an empty catalog plus a warning. The result is sorted by
    /// module name so repeated builds over an unchanged tree are
    /// descriptor-for-descriptor identical.
    pub fn build(&self, name_filter: Option<&[String]>) -> Vec<ModuleDescriptor> {
        if !self.modules_root.is_dir() {
            self.logger.log(
                LogLevel::Warn,
                &format!(
                    "Modules root not found: {}, catalog is empty",
                    self.modules_root.display()
                ),
            );
            return Vec::new();
        }

        let mut catalog = Vec::new();

        for entry in WalkDir::new(&self.modules_root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let name = entry.file_name().to_string_lossy().to_string();

            if let Some(filter) = name_filter {
                if !filter.iter().any(|f| f == &name) {
                    continue;
                }
            }

            match self.describe(entry.path(), &name) {
                Some(descriptor) => catalog.push(descriptor),
                None => self.logger.log(
                    LogLevel::Debug,
                    &format!("Skipping '{}': no entry script", name),
                ),
            }
        }

        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        catalog
    }

    /// Describe a single module directory, or None if it has no entry
    /// script and therefore is not a module.
    fn describe(&self, path: &Path, name: &str) -> Option<ModuleDescriptor> {
        let script_path = path.join(format!("{}.sh", name));
        if !script_path.is_file() {
            return None;
        }

        let manifest_path = {
            let candidate = path.join("module.toml");
            candidate.is_file().then_some(candidate)
        };

        // Distributed wins over centralized; both absent means None.
        let distributed = ModuleDescriptor::distributed_test_path(path, name);
        let centralized = self.tests_root.join(name);

        let (test_strategy, test_path) = if distributed.is_file() {
            (TestStrategy::Distributed, distributed)
        } else if centralized.is_dir() {
            (TestStrategy::Centralized, centralized)
        } else {
            (TestStrategy::None, distributed)
        };

        Some(ModuleDescriptor {
            name: name.to_string(),
            path: path.to_path_buf(),
            manifest_path,
            script_path,
            test_strategy,
            test_path,
        })
    }
}
