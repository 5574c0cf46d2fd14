//! Configuration types for croc-relay
//!
//! Every field has a serde default so an empty document (or no environment
//! at all) yields a working process-mode setup rooted at `./files`.

use crate::error::{Error, Result};
use crate::types::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Which backing-handle flavor transfers run on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// `croc` runs as a local subprocess, one timer per transfer
    #[default]
    Process,
    /// `croc` runs in a labeled container, reaped by a periodic loop
    Container,
}

impl RuntimeMode {
    /// Parse a mode name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "process" => Some(Self::Process),
            "container" | "docker" => Some(Self::Container),
            _ => None,
        }
    }
}

/// Permitted file root
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FilesConfig {
    /// Directory transfers may select from (default: "./files")
    #[serde(default = "default_file_root")]
    pub root: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: default_file_root(),
        }
    }
}

/// External runtime settings (croc binary, container image and limits)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RuntimeConfig {
    /// Backing-handle flavor (default: process)
    #[serde(default)]
    pub mode: RuntimeMode,

    /// Path to the croc executable (auto-detected if None)
    #[serde(default)]
    pub croc_path: Option<PathBuf>,

    /// Path to the docker executable (auto-detected if None)
    #[serde(default)]
    pub docker_path: Option<PathBuf>,

    /// Whether to search PATH for binaries if explicit paths are not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Container image whose entrypoint is croc (default: "schollz/croc")
    #[serde(default = "default_image")]
    pub image: String,

    /// Container memory limit passed to `--memory` (default: "256m")
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// Container CPU limit passed to `--cpus` (default: "0.5")
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,

    /// Label marking containers owned by this system (default: "croc-relay.managed")
    #[serde(default = "default_label")]
    pub label: String,

    /// Number of log lines scraped per container by the reaper (default: 200)
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::default(),
            croc_path: None,
            docker_path: None,
            search_path: true,
            image: default_image(),
            memory_limit: default_memory_limit(),
            cpu_limit: default_cpu_limit(),
            label: default_label(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

/// Timeout and reaper timings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TimeoutConfig {
    /// Maximum transfer age before it is forced out (default: 600 seconds)
    #[serde(default = "default_transfer_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub transfer_timeout: Duration,

    /// Interval between reaper cycles in container mode (default: 60 seconds)
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub cleanup_interval: Duration,

    /// Age after which a record whose container vanished is dropped (default: 600 seconds)
    #[serde(default = "default_stale_age", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub stale_age: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: default_transfer_timeout(),
            cleanup_interval: default_cleanup_interval(),
            stale_age: default_stale_age(),
        }
    }
}

/// Permitted hash algorithms
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HashConfig {
    /// Algorithms callers may pick (default: all)
    #[serde(default = "default_allowed_hashes")]
    pub allowed: Vec<HashAlgorithm>,

    /// Algorithm used when the caller's choice is missing or not permitted (default: imohash)
    #[serde(default)]
    pub fallback: HashAlgorithm,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed_hashes(),
            fallback: HashAlgorithm::default(),
        }
    }
}

impl HashConfig {
    /// Map caller input onto a permitted algorithm; invalid input silently coerces
    pub fn resolve(&self, requested: Option<&str>) -> HashAlgorithm {
        if let Some(algo) = requested.and_then(HashAlgorithm::parse)
            && self.allowed.contains(&algo)
        {
            return algo;
        }
        if self.allowed.is_empty() || self.allowed.contains(&self.fallback) {
            self.fallback
        } else {
            self.allowed[0]
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for croc-relay
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// File root settings
    #[serde(default)]
    pub files: FilesConfig,

    /// External runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Timeout and reaper timings
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Permitted hash algorithms
    #[serde(default)]
    pub hashes: HashConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Build a configuration from `CROC_RELAY_*` environment variables
    ///
    /// Unset variables keep their defaults. See [`Config::from_lookup`] for the
    /// variable names.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `CROC_RELAY_FILE_ROOT` | `files.root` |
    /// | `CROC_RELAY_RUNTIME` | `runtime.mode` (`process` / `container`) |
    /// | `CROC_RELAY_CROC_PATH` | `runtime.croc_path` |
    /// | `CROC_RELAY_DOCKER_PATH` | `runtime.docker_path` |
    /// | `CROC_RELAY_IMAGE` | `runtime.image` |
    /// | `CROC_RELAY_MEMORY_LIMIT` | `runtime.memory_limit` |
    /// | `CROC_RELAY_CPU_LIMIT` | `runtime.cpu_limit` |
    /// | `CROC_RELAY_LOG_TAIL` | `runtime.log_tail_lines` |
    /// | `CROC_RELAY_TRANSFER_TIMEOUT` | `timeouts.transfer_timeout` (seconds) |
    /// | `CROC_RELAY_CLEANUP_INTERVAL` | `timeouts.cleanup_interval` (seconds) |
    /// | `CROC_RELAY_STALE_AGE` | `timeouts.stale_age` (seconds) |
    /// | `CROC_RELAY_HASHES` | `hashes.allowed` (comma-separated) |
    /// | `CROC_RELAY_BIND` | `api.bind_address` |
    /// | `CROC_RELAY_CORS_ORIGINS` | `api.cors_origins` (comma-separated) |
    /// | `CROC_RELAY_SWAGGER_UI` | `api.swagger_ui` |
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = get("CROC_RELAY_FILE_ROOT") {
            config.files.root = PathBuf::from(root);
        }
        if let Some(mode) = get("CROC_RELAY_RUNTIME") {
            config.runtime.mode = RuntimeMode::parse(&mode).ok_or_else(|| {
                Error::config(
                    "CROC_RELAY_RUNTIME",
                    format!("unknown runtime '{mode}', expected 'process' or 'container'"),
                )
            })?;
        }
        if let Some(path) = get("CROC_RELAY_CROC_PATH") {
            config.runtime.croc_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("CROC_RELAY_DOCKER_PATH") {
            config.runtime.docker_path = Some(PathBuf::from(path));
        }
        if let Some(image) = get("CROC_RELAY_IMAGE") {
            config.runtime.image = image;
        }
        if let Some(memory) = get("CROC_RELAY_MEMORY_LIMIT") {
            config.runtime.memory_limit = memory;
        }
        if let Some(cpus) = get("CROC_RELAY_CPU_LIMIT") {
            config.runtime.cpu_limit = cpus;
        }
        if let Some(tail) = get("CROC_RELAY_LOG_TAIL") {
            config.runtime.log_tail_lines = parse_number("CROC_RELAY_LOG_TAIL", &tail)?;
        }
        if let Some(secs) = get("CROC_RELAY_TRANSFER_TIMEOUT") {
            config.timeouts.transfer_timeout =
                Duration::from_secs(parse_number("CROC_RELAY_TRANSFER_TIMEOUT", &secs)?);
        }
        if let Some(secs) = get("CROC_RELAY_CLEANUP_INTERVAL") {
            config.timeouts.cleanup_interval =
                Duration::from_secs(parse_number("CROC_RELAY_CLEANUP_INTERVAL", &secs)?);
        }
        if let Some(secs) = get("CROC_RELAY_STALE_AGE") {
            config.timeouts.stale_age =
                Duration::from_secs(parse_number("CROC_RELAY_STALE_AGE", &secs)?);
        }
        if let Some(hashes) = get("CROC_RELAY_HASHES") {
            let mut allowed = Vec::new();
            for name in hashes.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let algo = HashAlgorithm::parse(name).ok_or_else(|| {
                    Error::config("CROC_RELAY_HASHES", format!("unknown hash algorithm '{name}'"))
                })?;
                if !allowed.contains(&algo) {
                    allowed.push(algo);
                }
            }
            config.hashes.allowed = allowed;
        }
        if let Some(bind) = get("CROC_RELAY_BIND") {
            config.api.bind_address = bind.trim().parse().map_err(|_| {
                Error::config("CROC_RELAY_BIND", format!("invalid socket address '{bind}'"))
            })?;
        }
        if let Some(origins) = get("CROC_RELAY_CORS_ORIGINS") {
            config.api.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(flag) = get("CROC_RELAY_SWAGGER_UI") {
            config.api.swagger_ui = parse_flag("CROC_RELAY_SWAGGER_UI", &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the supervisor or parser misbehave
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.transfer_timeout.is_zero() {
            return Err(Error::config(
                "timeouts.transfer_timeout",
                "transfer timeout must be greater than zero",
            ));
        }
        if self.timeouts.cleanup_interval.is_zero() {
            return Err(Error::config(
                "timeouts.cleanup_interval",
                "cleanup interval must be greater than zero",
            ));
        }
        if self.hashes.allowed.is_empty() {
            return Err(Error::config(
                "hashes.allowed",
                "at least one hash algorithm must be permitted",
            ));
        }
        if self.runtime.log_tail_lines == 0 {
            return Err(Error::config(
                "runtime.log_tail_lines",
                "log tail must be at least one line",
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(key, format!("'{value}' is not a valid number")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(key, format!("'{value}' is not a boolean"))),
    }
}

fn default_file_root() -> PathBuf {
    PathBuf::from("files")
}

fn default_true() -> bool {
    true
}

fn default_image() -> String {
    "schollz/croc".into()
}

fn default_memory_limit() -> String {
    "256m".into()
}

fn default_cpu_limit() -> String {
    "0.5".into()
}

fn default_label() -> String {
    "croc-relay.managed".into()
}

fn default_log_tail_lines() -> usize {
    200
}

fn default_transfer_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_stale_age() -> Duration {
    Duration::from_secs(600)
}

fn default_allowed_hashes() -> Vec<HashAlgorithm> {
    HashAlgorithm::ALL.to_vec()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
