use std::env;

use serde::{Deserialize, Serialize};

use crate::resources::ConcurrencyPolicy;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,
    pub defaults: AdmissionDefaults,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            controller: ControllerConfig::from_env(),
            defaults: AdmissionDefaults::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  controller:  workers={}, max_catch_up={}, backoff={}ms..{}ms",
            self.controller.workers,
            self.controller.max_catch_up,
            self.controller.backoff_base_ms,
            self.controller.backoff_max_ms,
        );
        tracing::info!(
            "  defaults:    policy={}, suspend={}, history={}/{}",
            self.defaults.concurrency_policy,
            self.defaults.suspend,
            self.defaults.successful_history_limit,
            self.defaults.failed_history_limit,
        );
    }
}

// ── Controller tuning ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    pub workers: usize,
    /// Catch-up bound: when more missed runs than this have accumulated,
    /// only the single most recent due time is executed.
    pub max_catch_up: usize,
    /// Initial re-enqueue delay after a transient error.
    pub backoff_base_ms: u64,
    /// Ceiling on the exponential error backoff.
    pub backoff_max_ms: u64,
}

impl ControllerConfig {
    fn from_env() -> Self {
        Self {
            workers: env_usize("METRONOME_WORKERS", 4),
            max_catch_up: env_usize("METRONOME_MAX_CATCH_UP", 100),
            backoff_base_ms: env_u64("METRONOME_BACKOFF_BASE_MS", 500),
            backoff_max_ms: env_u64("METRONOME_BACKOFF_MAX_MS", 300_000),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_catch_up: 100,
            backoff_base_ms: 500,
            backoff_max_ms: 300_000,
        }
    }
}

// ── Admission defaults ────────────────────────────────────────

/// Default values filled into unset optional schedule fields at admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionDefaults {
    pub concurrency_policy: ConcurrencyPolicy,
    pub suspend: bool,
    pub successful_history_limit: u32,
    pub failed_history_limit: u32,
}

impl AdmissionDefaults {
    fn from_env() -> Self {
        Self {
            concurrency_policy: env_or("METRONOME_DEFAULT_POLICY", "Allow")
                .parse()
                .unwrap_or(ConcurrencyPolicy::Allow),
            suspend: env_bool("METRONOME_DEFAULT_SUSPEND", false),
            successful_history_limit: env_u32("METRONOME_DEFAULT_SUCCESS_HISTORY", 3),
            failed_history_limit: env_u32("METRONOME_DEFAULT_FAILED_HISTORY", 1),
        }
    }
}

impl Default for AdmissionDefaults {
    fn default() -> Self {
        Self {
            concurrency_policy: ConcurrencyPolicy::Allow,
            suspend: false,
            successful_history_limit: 3,
            failed_history_limit: 1,
        }
    }
}
