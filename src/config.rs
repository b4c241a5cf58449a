use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub modules_root: PathBuf,
    pub tests_root: PathBuf,
    pub output_root: PathBuf,
    pub runner_settings: RunnerSettings,
    pub default_profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Executable name of the external unit-test runner.
    pub command: String,
    /// Extra arguments prepended before the test path.
    pub args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self {
            modules_root: cwd.join("modules"),
            tests_root: cwd.join("tests"),
            output_root: cwd.join("test-output"),
            runner_settings: RunnerSettings {
                command: defaults::DEFAULT_RUNNER.to_string(),
                args: vec![],
            },
            default_profile: "Development".to_string(),
        }
    }
}

impl Config {
    pub async fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;

            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("testforge");

        Ok(config_dir.join(defaults::DEFAULT_CONFIG_NAME))
    }

    /// Build a config rooted at an explicit directory, bypassing the
    /// on-disk config. Used by the CLI's --root flag and by tests.
    pub fn with_root(root: &std::path::Path) -> Self {
        Self {
            modules_root: root.join("modules"),
            tests_root: root.join("tests"),
            output_root: root.join("test-output"),
            ..Self::default()
        }
    }

    pub fn get_module_path(&self, module_name: &str) -> PathBuf {
        self.modules_root.join(module_name)
    }

    pub fn get_centralized_test_path(&self, module_name: &str) -> PathBuf {
        self.tests_root.join(module_name)
    }

    pub fn get_integration_test_dir(&self) -> PathBuf {
        self.tests_root.join("integration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.runner_settings.command, defaults::DEFAULT_RUNNER);
        assert_eq!(config.runner_settings.command, "stest");
        assert_eq!(config.default_profile, "Development");
        assert!(config.modules_root.ends_with("modules"));
    }

    #[test]
    fn test_config_paths() {
        let config = Config::with_root(std::path::Path::new("/tmp/forge"));

        let module_path = config.get_module_path("alpha");
        assert!(module_path.to_string_lossy().contains("modules/alpha"));

        let central = config.get_centralized_test_path("alpha");
        assert!(central.to_string_lossy().contains("tests/alpha"));

        let integration = config.get_integration_test_dir();
        assert!(integration.to_string_lossy().contains("tests/integration"));
    }
}
