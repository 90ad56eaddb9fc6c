use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

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

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RippleConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl RippleConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RIPPLE_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RIPPLE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            compute: ComputeConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            propagation: PropagationConfig::from_env_profiled(p),
            rules: RulesConfig::from_env_profiled(p),
        }
    }

    /// Parse a TOML document. Missing sections and fields take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  compute:     threads={}, timeout={}ms, priority_factor={}",
            self.compute.resolved_threads(),
            self.compute.execution_timeout_ms,
            self.compute.priority_factor
        );
        tracing::info!("  queue:       hysteresis_window={}ms", self.queue.hysteresis_window_ms);
        tracing::info!(
            "  propagation: default_priority={}, monitor_key={}",
            self.propagation.default_priority,
            self.propagation.monitor_key.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  rules:       refractory={}ms, timeout={}ms, fact_validity={}ms",
            self.rules.refractory_ms,
            self.rules.execution_timeout_ms,
            self.rules.fact_valid_for_ms
        );
    }
}

// ── Compute scheduler ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Maximum concurrently running actions. 0 = available parallelism.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Multiplier applied to a link priority when weighing dirty nodes.
    #[serde(default = "default_priority_factor")]
    pub priority_factor: f64,
    /// Sleep between admission attempts while the pool is saturated.
    #[serde(default = "default_admission_backoff_ms")]
    pub admission_backoff_ms: u64,
}

fn default_execution_timeout_ms() -> u64 { 30_000 }
fn default_priority_factor() -> f64 { 1.0 }
fn default_admission_backoff_ms() -> u64 { 100 }

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            execution_timeout_ms: default_execution_timeout_ms(),
            priority_factor: default_priority_factor(),
            admission_backoff_ms: default_admission_backoff_ms(),
        }
    }
}

impl ComputeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            threads: profiled_env_parse(p, "RIPPLE_COMPUTE_THREADS", 0),
            execution_timeout_ms: profiled_env_parse(
                p,
                "RIPPLE_COMPUTE_TIMEOUT_MS",
                default_execution_timeout_ms(),
            ),
            priority_factor: profiled_env_parse(
                p,
                "RIPPLE_PRIORITY_FACTOR",
                default_priority_factor(),
            ),
            admission_backoff_ms: profiled_env_parse(
                p,
                "RIPPLE_ADMISSION_BACKOFF_MS",
                default_admission_backoff_ms(),
            ),
        }
    }

    /// Resolve the thread count (0 means use available parallelism).
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.threads
        }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn admission_backoff(&self) -> Duration {
        Duration::from_millis(self.admission_backoff_ms)
    }
}

// ── Fireable queues ───────────────────────────────────────────

/// Cleanup cadence for queues with hysteresis enabled.
pub const HYSTERESIS_CLEANUP_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Coalescing window for duplicate actions. 0 disables hysteresis.
    #[serde(default)]
    pub hysteresis_window_ms: u64,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            hysteresis_window_ms: profiled_env_parse(p, "RIPPLE_HYSTERESIS_WINDOW_MS", 0),
        }
    }

    pub fn hysteresis_window(&self) -> Duration {
        Duration::from_millis(self.hysteresis_window_ms)
    }
}

// ── Link propagation ──────────────────────────────────────────

/// Priority used when a link carries no parseable priority.
pub const DEFAULT_PRIORITY: i32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    #[serde(default = "default_priority")]
    pub default_priority: i32,
    /// Link property holding the monitored-property allow-list.
    /// Unset means every property is monitored.
    #[serde(default)]
    pub monitor_key: Option<String>,
}

fn default_priority() -> i32 { DEFAULT_PRIORITY }

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
            monitor_key: None,
        }
    }
}

impl PropagationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_priority: profiled_env_parse(p, "RIPPLE_DEFAULT_PRIORITY", DEFAULT_PRIORITY),
            monitor_key: profiled_env_opt(p, "RIPPLE_MONITOR_KEY"),
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_refractory_ms")]
    pub refractory_ms: u64,
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Dispatch loop tick while rules are registered.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Dispatch loop sleep while no rules are registered.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Upper bound for collecting a finished run's step trace.
    #[serde(default = "default_trace_wait_ms")]
    pub trace_wait_ms: u64,
    #[serde(default)]
    pub fact_valid_delay_ms: u64,
    #[serde(default = "default_fact_valid_for_ms")]
    pub fact_valid_for_ms: u64,
    #[serde(default = "default_true")]
    pub clear_facts_after_execution: bool,
}

fn default_refractory_ms() -> u64 { 1_000 }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_idle_backoff_ms() -> u64 { 5_000 }
fn default_trace_wait_ms() -> u64 { 1_000 }
fn default_fact_valid_for_ms() -> u64 { 10_000 }
fn default_true() -> bool { true }

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            refractory_ms: default_refractory_ms(),
            execution_timeout_ms: default_execution_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            trace_wait_ms: default_trace_wait_ms(),
            fact_valid_delay_ms: 0,
            fact_valid_for_ms: default_fact_valid_for_ms(),
            clear_facts_after_execution: true,
        }
    }
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            refractory_ms: profiled_env_parse(p, "RIPPLE_RULE_REFRACTORY_MS", default_refractory_ms()),
            execution_timeout_ms: profiled_env_parse(
                p,
                "RIPPLE_RULE_TIMEOUT_MS",
                default_execution_timeout_ms(),
            ),
            poll_interval_ms: profiled_env_parse(
                p,
                "RIPPLE_RULE_POLL_MS",
                default_poll_interval_ms(),
            ),
            idle_backoff_ms: profiled_env_parse(
                p,
                "RIPPLE_RULE_IDLE_BACKOFF_MS",
                default_idle_backoff_ms(),
            ),
            trace_wait_ms: profiled_env_parse(p, "RIPPLE_RULE_TRACE_WAIT_MS", default_trace_wait_ms()),
            fact_valid_delay_ms: profiled_env_parse(p, "RIPPLE_FACT_VALID_DELAY_MS", 0),
            fact_valid_for_ms: profiled_env_parse(
                p,
                "RIPPLE_FACT_VALID_FOR_MS",
                default_fact_valid_for_ms(),
            ),
            clear_facts_after_execution: profiled_env_parse(p, "RIPPLE_CLEAR_FACTS", true),
        }
    }

    pub fn refractory(&self) -> Duration { Duration::from_millis(self.refractory_ms) }
    pub fn execution_timeout(&self) -> Duration { Duration::from_millis(self.execution_timeout_ms) }
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
    pub fn idle_backoff(&self) -> Duration { Duration::from_millis(self.idle_backoff_ms) }
    pub fn trace_wait(&self) -> Duration { Duration::from_millis(self.trace_wait_ms) }
    pub fn fact_valid_delay(&self) -> Duration { Duration::from_millis(self.fact_valid_delay_ms) }
    pub fn fact_valid_for(&self) -> Duration { Duration::from_millis(self.fact_valid_for_ms) }
}
