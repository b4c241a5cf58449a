use serde::{Deserialize, Serialize};

/// How chatty the run should be. Forwarded to the external runner and
/// used to pick the console sink's debug visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    Quiet,
    Normal,
    Detailed,
    Diagnostic,
}

/// How aggressively external collaborators should be mocked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MockLevel {
    None,
    Partial,
    Full,
}

/// Immutable per-run configuration, resolved from a named profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub verbosity: Verbosity,
    pub timeout_minutes: u64,
    pub retry_count: u32,
    pub mock_level: MockLevel,
    pub parallel_jobs: usize,
    pub enable_coverage: bool,
    pub coverage_threshold: u8,
    pub enable_performance_metrics: bool,
    pub max_memory_usage_mb: u64,
}

fn default_parallel_jobs() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(4)
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            timeout_minutes: 10,
            retry_count: 0,
            mock_level: MockLevel::None,
            parallel_jobs: default_parallel_jobs(),
            enable_coverage: false,
            coverage_threshold: 75,
            enable_performance_metrics: false,
            max_memory_usage_mb: 1024,
        }
    }
}

/// Partial overlay applied on top of the base configuration. Only the
/// fields a profile names are patched; everything else keeps base values.
#[derive(Debug, Clone, Default)]
struct ProfileOverride {
    verbosity: Option<Verbosity>,
    timeout_minutes: Option<u64>,
    retry_count: Option<u32>,
    mock_level: Option<MockLevel>,
    parallel_jobs: Option<usize>,
    enable_coverage: Option<bool>,
    coverage_threshold: Option<u8>,
    enable_performance_metrics: Option<bool>,
    max_memory_usage_mb: Option<u64>,
}

fn profile_override(profile_name: &str) -> Option<ProfileOverride> {
    match profile_name {
        "Development" => Some(ProfileOverride {
            verbosity: Some(Verbosity::Detailed),
            timeout_minutes: Some(5),
            mock_level: Some(MockLevel::Full),
            ..Default::default()
        }),
        "CI" => Some(ProfileOverride {
            timeout_minutes: Some(20),
            retry_count: Some(2),
            enable_coverage: Some(true),
            coverage_threshold: Some(80),
            parallel_jobs: Some(4),
            ..Default::default()
        }),
        "Production" => Some(ProfileOverride {
            verbosity: Some(Verbosity::Quiet),
            retry_count: Some(1),
            enable_coverage: Some(true),
            coverage_threshold: Some(90),
            max_memory_usage_mb: Some(2048),
            ..Default::default()
        }),
        "Debug" => Some(ProfileOverride {
            verbosity: Some(Verbosity::Diagnostic),
            timeout_minutes: Some(60),
            parallel_jobs: Some(1),
            enable_performance_metrics: Some(true),
            max_memory_usage_mb: Some(4096),
            ..Default::default()
        }),
        _ => None,
    }
}

/// Resolve a named profile into a concrete configuration.
///
/// An unrecognized profile name is not an error: the base configuration
/// is returned unchanged. Callers that want to surface the fallback
/// should compare the name against `known_profiles()` and warn.
pub fn resolve(profile_name: &str) -> RunConfiguration {
    let mut config = RunConfiguration::default();

    if let Some(patch) = profile_override(profile_name) {
        if let Some(v) = patch.verbosity {
            config.verbosity = v;
        }
        if let Some(v) = patch.timeout_minutes {
            config.timeout_minutes = v;
        }
        if let Some(v) = patch.retry_count {
            config.retry_count = v;
        }
        if let Some(v) = patch.mock_level {
            config.mock_level = v;
        }
        if let Some(v) = patch.parallel_jobs {
            config.parallel_jobs = v;
        }
        if let Some(v) = patch.enable_coverage {
            config.enable_coverage = v;
        }
        if let Some(v) = patch.coverage_threshold {
            config.coverage_threshold = v;
        }
        if let Some(v) = patch.enable_performance_metrics {
            config.enable_performance_metrics = v;
        }
        if let Some(v) = patch.max_memory_usage_mb {
            config.max_memory_usage_mb = v;
        }
    }

    config
}

pub fn known_profiles() -> &'static [&'static str] {
    &["Development", "CI", "Production", "Debug"]
}

pub fn is_known_profile(profile_name: &str) -> bool {
    known_profiles().contains(&profile_name)
}
