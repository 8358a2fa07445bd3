use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub check: CheckConfig,
    pub storage: StorageConfig,
    pub prometheus: PrometheusConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            check: CheckConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            prometheus: PrometheusConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  check:       step={}s, sample_period={}s, offset={}s, shutdown_timeout={}s",
            self.check.default_step,
            self.check.sample_period,
            self.check.time_offset,
            self.check.shutdown_timeout_secs
        );
        tracing::info!(
            "  storage:     workflows={}, models={}",
            self.storage.workflow_store.display(),
            self.storage.model_dir.display()
        );
        tracing::info!(
            "  prometheus:  url={}, timeout={}s, instance_port={}",
            self.prometheus.url,
            self.prometheus.timeout_secs,
            self.prometheus.instance_port
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            check: CheckConfig::default(),
            storage: StorageConfig::default(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

// ── Check scheduling ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Step (seconds) used when a workflow does not carry its own.
    pub default_step: u64,
    /// Metric resolution used when aligning series.
    pub sample_period: u64,
    /// Seconds the check window trails behind "now".
    pub time_offset: u64,
    pub shutdown_timeout_secs: u64,
}

impl CheckConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_step: profiled_env_u64(p, "VIGIL_DEFAULT_STEP", 60),
            sample_period: profiled_env_u64(p, "VIGIL_SAMPLE_PERIOD", 15),
            time_offset: profiled_env_u64(p, "VIGIL_TIME_OFFSET", 0),
            shutdown_timeout_secs: profiled_env_u64(p, "VIGIL_SHUTDOWN_TIMEOUT", 10),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            default_step: 60,
            sample_period: 15,
            time_offset: 0,
            shutdown_timeout_secs: 10,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding workflow records.
    pub workflow_store: PathBuf,
    /// Root of model files, laid out as `<dir>/<algo_name>/<model_id>.json`.
    pub model_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            workflow_store: PathBuf::from(profiled_env_or(
                p,
                "VIGIL_WORKFLOW_STORE",
                "data/workflows.json",
            )),
            model_dir: PathBuf::from(profiled_env_or(p, "VIGIL_MODEL_DIR", "data")),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workflow_store: PathBuf::from("data/workflows.json"),
            model_dir: PathBuf::from("data"),
        }
    }
}

// ── Prometheus ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Exporter port appended to a host ip to form the `instance` label.
    pub instance_port: u16,
}

impl PrometheusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "PROMETHEUS_URL", "http://127.0.0.1:9090"),
            timeout_secs: profiled_env_u64(p, "PROMETHEUS_TIMEOUT", 30),
            instance_port: profiled_env_opt(p, "PROMETHEUS_INSTANCE_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(9100),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9090".to_string(),
            timeout_secs: 30,
            instance_port: 9100,
        }
    }
}
