//! Monitor configuration
//!
//! Settings are layered: the built-in defaults (which carry the full worker
//! registry), an optional `config/default.toml` found next to the executable
//! or in the current directory, an optional explicit file, and finally
//! environment variables with the `WORKER_HEALTH_` prefix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// One synthetic task used to exercise a worker
///
/// Several tests may share a `name` when a worker serves more than one
/// endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTest {
    /// Worker (and compose service) name
    pub name: String,
    /// API endpoint relative to the API base path, e.g. `/retro/`
    pub endpoint: String,
    /// Form fields submitted to the endpoint
    #[serde(default, rename = "test")]
    pub payload: BTreeMap<String, String>,
}

impl WorkerTest {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            payload: BTreeMap::new(),
        }
    }

    /// Adds a form field to the test payload
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path prefix of the versioned API
    pub base_path: String,
    /// Scheme used when the host is given without one
    pub default_scheme: String,
    /// Skip TLS certificate validation (self-signed deployments)
    pub accept_invalid_certs: bool,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Status polling bounds for a single test
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of status polls
    pub attempts: u32,
    /// Pause after every unresolved poll, in milliseconds
    pub interval_ms: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval_ms: 2000,
        }
    }
}

/// Queue triage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Worker whose queue is inspected when it times out
    pub critical_worker: String,
}

/// External compose tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Orchestrator executable
    pub program: String,
    /// Service running the message broker
    pub broker_service: String,
    /// Service able to run the celery CLI
    pub app_service: String,
    /// Celery application passed to `celery -A`
    pub celery_app: String,
    /// Variable the service definitions read the image tag from
    pub version_env: String,
}

/// Complete monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub triage: TriageConfig,
    pub compose: ComposeConfig,
    /// Worker registry, probed in declaration order
    pub workers: Vec<WorkerTest>,
}

impl MonitorConfig {
    /// Loads configuration, optionally layering an explicit file on top of
    /// the defaults
    ///
    /// Sources, lowest priority first:
    /// 1. built-in defaults
    /// 2. config/default.toml (next to the executable, else ./config)
    /// 3. `extra`, if given (must exist)
    /// 4. Environment variables with prefix WORKER_HEALTH_ (e.g. WORKER_HEALTH_POLL__ATTEMPTS=3)
    pub fn load(extra: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(dir) = Self::find_config_dir() {
            builder = builder.add_source(File::from(dir.join("default")).required(false));
        }

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("WORKER_HEALTH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults only, ignoring files and environment
    pub fn builtin() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the deserializer cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.is_empty() {
            return Err(ConfigError::Message(
                "worker registry must not be empty".to_string(),
            ));
        }
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "worker with endpoint '{}' has an empty name",
                    worker.endpoint
                )));
            }
            if !worker.endpoint.starts_with('/') {
                return Err(ConfigError::Message(format!(
                    "endpoint '{}' of worker '{}' must start with '/'",
                    worker.endpoint, worker.name
                )));
            }
        }
        if self.poll.attempts == 0 {
            return Err(ConfigError::Message(
                "poll.attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Finds the config directory by searching in multiple locations
    fn find_config_dir() -> Option<PathBuf> {
        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let config_dir = exe_dir.join("config");
            if config_dir.exists() {
                return Some(config_dir);
            }
        }

        let cwd_config = PathBuf::from("config");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        None
    }
}
