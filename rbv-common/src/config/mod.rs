//! Configuration for a verification run.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! `RBV_*` environment variables. The binary applies CLI flags last.

pub mod env;

pub use env::{EnvError, EnvParser};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// File name looked up in the project directory when no `--config` is given.
pub const PROJECT_CONFIG_FILE: &str = "rbv.toml";

/// Default base URL of the application API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:9090/api";
/// Default base URL of the search cluster.
pub const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";
/// Default per-call API timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid environment configuration: {}", join_errors(.0))]
    Env(Vec<EnvError>),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

fn join_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Serde adapter for durations written as `"3s"`, `"15m"`, `"1h 30m"`.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Directory holding the compose file and the backend sources.
    pub project_dir: PathBuf,
    pub api: ApiConfig,
    pub stack: StackConfig,
    pub readiness: ReadinessConfig,
    pub scenario: ScenarioConfig,
    pub seed: SeedConfig,
    pub unit_tests: UnitTestConfig,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            api: ApiConfig::default(),
            stack: StackConfig::default(),
            readiness: ReadinessConfig::default(),
            scenario: ScenarioConfig::default(),
            seed: SeedConfig::default(),
            unit_tests: UnitTestConfig::default(),
        }
    }
}

/// Application API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every API path is appended to.
    pub base_url: String,
    /// Timeout applied to each request. Requests are never retried.
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Container stack settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Compose executable (`docker-compose`, or `docker` with `compose_args = ["compose"]`).
    pub compose_program: String,
    /// Arguments placed before every compose subcommand.
    pub compose_args: Vec<String>,
    pub database_container: String,
    pub cache_container: String,
    pub app_container: String,
    /// Base URL of the search cluster.
    pub search_url: String,
    /// Compose services that must be running to reuse an existing stack.
    pub required_services: Vec<String>,
    /// Files that must exist in the project directory before bring-up.
    pub required_files: Vec<String>,
    /// Timeout for a single container health command.
    #[serde(with = "duration_str")]
    pub probe_timeout: Duration,
    #[serde(with = "duration_str")]
    pub stop_timeout: Duration,
    /// Covers image builds, so it is long.
    #[serde(with = "duration_str")]
    pub start_timeout: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            compose_program: "docker-compose".to_string(),
            compose_args: Vec::new(),
            database_container: "redbus-postgres".to_string(),
            cache_container: "redbus-redis".to_string(),
            app_container: "redbus-app".to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            required_services: ["postgres", "redis", "elasticsearch", "app"]
                .into_iter()
                .map(String::from)
                .collect(),
            required_files: ["docker-compose.yml", "Dockerfile", "pom.xml"]
                .into_iter()
                .map(String::from)
                .collect(),
            probe_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(60),
            start_timeout: Duration::from_secs(900),
        }
    }
}

/// Attempt budget for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBudget {
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub delay: Duration,
}

impl ServiceBudget {
    pub const fn new(max_attempts: u32, delay_secs: u64) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_secs(delay_secs),
        }
    }
}

/// How the delay between health attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    #[default]
    Fixed,
    Exponential,
}

/// Readiness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub database: ServiceBudget,
    pub cache: ServiceBudget,
    pub search_index: ServiceBudget,
    pub application: ServiceBudget,
    pub backoff: BackoffMode,
    /// Upper bound for exponential delays.
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
    /// Restart the stack even when it already reports healthy.
    pub force_bring_up: bool,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            database: ServiceBudget::new(30, 3),
            cache: ServiceBudget::new(30, 3),
            search_index: ServiceBudget::new(60, 5),
            application: ServiceBudget::new(120, 5),
            backoff: BackoffMode::Fixed,
            max_delay: Duration::from_secs(30),
            force_bring_up: false,
        }
    }
}

/// When the scenario triggers a manual index resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResyncPolicy {
    Never,
    #[default]
    WhenDiverged,
    Always,
}

/// Scenario settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Travel date for searches and bookings. Defaults to the next Monday.
    pub travel_date: Option<NaiveDate>,
    /// Route searched by the regular user (covered by the seed data).
    pub demo_origin: String,
    pub demo_destination: String,
    #[serde(with = "duration_str")]
    pub consistency_interval: Duration,
    #[serde(with = "duration_str")]
    pub consistency_deadline: Duration,
    pub resync: ResyncPolicy,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            travel_date: None,
            demo_origin: "Mumbai".to_string(),
            demo_destination: "Pune".to_string(),
            consistency_interval: Duration::from_secs(1),
            consistency_deadline: Duration::from_secs(8),
            resync: ResyncPolicy::WhenDiverged,
        }
    }
}

/// Baseline data seeding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub enabled: bool,
    /// Wait after seeding so the search index can catch up.
    #[serde(with = "duration_str")]
    pub settle: Duration,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle: Duration::from_secs(10),
        }
    }
}

/// Backend unit-test settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitTestConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Coverage HTML report, relative to the project directory.
    pub coverage_report: PathBuf,
}

impl Default for UnitTestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "mvn".to_string(),
            args: ["clean", "test", "jacoco:report"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout: Duration::from_secs(600),
            coverage_report: PathBuf::from("target/site/jacoco/index.html"),
        }
    }
}

impl VerifyConfig {
    /// Load configuration: file (explicit, project-local, then user config
    /// dir), then `RBV_*` overrides, then validation.
    pub fn load(explicit: Option<&Path>, project_dir: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(explicit, project_dir, &mut EnvParser::new())
    }

    /// [`VerifyConfig::load`] over a given environment. A `project_dir`
    /// passed on the command line beats `RBV_PROJECT_DIR`.
    pub fn load_with_env(
        explicit: Option<&Path>,
        project_dir: Option<&Path>,
        env: &mut EnvParser,
    ) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(explicit, project_dir) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        if let Some(dir) = project_dir {
            config.project_dir = dir.to_path_buf();
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `RBV_*` overrides. All invalid variables are reported together.
    pub fn apply_env(&mut self, env: &mut EnvParser) -> Result<(), ConfigError> {
        if let Some(url) = env.get_string("BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = env.get_string("SEARCH_URL") {
            self.stack.search_url = url;
        }
        if let Some(dir) = env.get_path("PROJECT_DIR") {
            self.project_dir = dir;
        }
        if let Some(force) = env.get_bool("FORCE_BRING_UP") {
            self.readiness.force_bring_up = force;
        }
        if let Some(skip) = env.get_bool("SKIP_SEED") {
            self.seed.enabled = !skip;
        }
        if let Some(skip) = env.get_bool("SKIP_UNIT_TESTS") {
            self.unit_tests.enabled = !skip;
        }
        if let Some(secs) = env.get_u64_range("REQUEST_TIMEOUT_SECS", 1, 300) {
            self.api.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env.get_u64_range("CONSISTENCY_DEADLINE_SECS", 1, 600) {
            self.scenario.consistency_deadline = Duration::from_secs(secs);
        }
        if let Some(attempts) = env.get_u32_range("APP_MAX_ATTEMPTS", 1, 10_000) {
            self.readiness.application.max_attempts = attempts;
        }

        if env.has_errors() {
            return Err(ConfigError::Env(env.take_errors()));
        }
        Ok(())
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.api.base_url.trim().is_empty() {
            problems.push("api.base_url must not be empty".to_string());
        }
        for (name, budget) in [
            ("database", &self.readiness.database),
            ("cache", &self.readiness.cache),
            ("search_index", &self.readiness.search_index),
            ("application", &self.readiness.application),
        ] {
            if budget.max_attempts == 0 {
                problems.push(format!("readiness.{name}.max_attempts must be at least 1"));
            }
        }
        if self.scenario.consistency_interval.is_zero() {
            problems.push("scenario.consistency_interval must be greater than zero".to_string());
        }
        if self.scenario.consistency_interval > self.scenario.consistency_deadline {
            problems.push(
                "scenario.consistency_interval must not exceed scenario.consistency_deadline"
                    .to_string(),
            );
        }
        if self.stack.compose_program.trim().is_empty() {
            problems.push("stack.compose_program must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

fn resolve_config_path(explicit: Option<&Path>, project_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = project_dir
        .unwrap_or_else(|| Path::new("."))
        .join(PROJECT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("rbv").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_service_budgets() {
        let config = VerifyConfig::default();
        assert_eq!(config.readiness.database, ServiceBudget::new(30, 3));
        assert_eq!(config.readiness.cache, ServiceBudget::new(30, 3));
        assert_eq!(config.readiness.search_index, ServiceBudget::new(60, 5));
        assert_eq!(config.readiness.application, ServiceBudget::new(120, 5));
        assert_eq!(config.api.request_timeout, Duration::from_secs(15));
        assert_eq!(config.scenario.consistency_deadline, Duration::from_secs(8));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rbv.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "http://staging:8080/api"

[readiness]
backoff = "exponential"
application = {{ max_attempts = 10, delay = "2s" }}

[scenario]
travel_date = "2030-03-04"
resync = "always"
"#
        )
        .unwrap();

        let config = VerifyConfig::from_file(&path).unwrap();
        assert_eq!(config.api.base_url, "http://staging:8080/api");
        assert_eq!(config.api.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.readiness.backoff, BackoffMode::Exponential);
        assert_eq!(config.readiness.application, ServiceBudget::new(10, 2));
        assert_eq!(config.readiness.database, ServiceBudget::new(30, 3));
        assert_eq!(
            config.scenario.travel_date,
            NaiveDate::from_ymd_opt(2030, 3, 4)
        );
        assert_eq!(config.scenario.resync, ResyncPolicy::Always);
    }

    #[test]
    fn test_project_local_file_is_discovered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "[seed]\nenabled = false\n",
        )
        .unwrap();

        let path = resolve_config_path(None, Some(dir.path())).unwrap();
        let config = VerifyConfig::from_file(&path).unwrap();
        assert!(!config.seed.enabled);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();

        let err = VerifyConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = VerifyConfig::default();
        let mut env = EnvParser::from_pairs([
            ("RBV_BASE_URL", "http://ci:9090/api"),
            ("RBV_SKIP_UNIT_TESTS", "yes"),
            ("RBV_APP_MAX_ATTEMPTS", "12"),
            ("RBV_CONSISTENCY_DEADLINE_SECS", "20"),
        ]);

        config.apply_env(&mut env).unwrap();
        assert_eq!(config.api.base_url, "http://ci:9090/api");
        assert!(!config.unit_tests.enabled);
        assert_eq!(config.readiness.application.max_attempts, 12);
        assert_eq!(
            config.scenario.consistency_deadline,
            Duration::from_secs(20)
        );
    }

    #[test]
    fn test_env_errors_are_collected() {
        let mut config = VerifyConfig::default();
        let mut env = EnvParser::from_pairs([
            ("RBV_FORCE_BRING_UP", "maybe"),
            ("RBV_APP_MAX_ATTEMPTS", "0"),
        ]);

        match config.apply_env(&mut env) {
            Err(ConfigError::Env(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected env errors, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_budget_and_inverted_deadline() {
        let mut config = VerifyConfig::default();
        config.readiness.cache.max_attempts = 0;
        config.scenario.consistency_interval = Duration::from_secs(10);

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => {
                assert_eq!(problems.len(), 2);
                assert!(problems[0].contains("cache"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_project_dir_beats_env() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PROJECT_CONFIG_FILE), "[seed]\nenabled = true\n").unwrap();
        let mut env = EnvParser::from_pairs([("RBV_PROJECT_DIR", "/from/env")]);

        let config = VerifyConfig::load_with_env(None, Some(dir.path()), &mut env).unwrap();
        assert_eq!(config.project_dir, dir.path());
    }

    #[test]
    fn test_env_project_dir_applies_without_cli_flag() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("custom.toml");
        std::fs::write(&explicit, "[seed]\nenabled = true\n").unwrap();
        let mut env = EnvParser::from_pairs([("RBV_PROJECT_DIR", "/from/env")]);

        let config = VerifyConfig::load_with_env(Some(&explicit), None, &mut env).unwrap();
        assert_eq!(config.project_dir, PathBuf::from("/from/env"));
    }

    #[test]
    fn test_validate_rejects_zero_consistency_interval() {
        let mut config = VerifyConfig::default();
        config.scenario.consistency_interval = Duration::ZERO;

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => {
                assert_eq!(problems.len(), 1);
                assert!(problems[0].contains("consistency_interval"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
