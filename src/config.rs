use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL (orders, balances, task locks)
    pub postgres_url: String,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    #[serde(default)]
    pub task_lock: TaskLockConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Currency label echoed by the third-party status API
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Shared secret for operator routes (`X-Admin-Secret`). Unset disables them.
    #[serde(default)]
    pub admin_secret: Option<String>,
}

/// Exclusive task lock settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskLockConfig {
    pub default_ttl_secs: u64,
    /// Per lock-kind TTL, keyed by the kind name (e.g. `balance_update`)
    #[serde(default)]
    pub ttl_secs: HashMap<String, u64>,
    pub release_attempts: u32,
    pub release_backoff_ms: u64,
}

impl Default for TaskLockConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 60,
            ttl_secs: HashMap::new(),
            release_attempts: 3,
            release_backoff_ms: 50,
        }
    }
}

impl TaskLockConfig {
    pub fn ttl_for(&self, kind: &str) -> Duration {
        Duration::from_secs(
            self.ttl_secs
                .get(kind)
                .copied()
                .unwrap_or(self.default_ttl_secs),
        )
    }

    pub fn release_backoff(&self) -> Duration {
        Duration::from_millis(self.release_backoff_ms)
    }
}

/// Detached provider submission pool
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub submit_timeout_ms: u64,
    /// How long the request path may wait for queue capacity
    pub enqueue_timeout_ms: u64,
    pub writeback_attempts: u32,
    /// How long shutdown waits for queued submissions to finish
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_size: 1024,
            submit_timeout_ms: 30_000,
            enqueue_timeout_ms: 500,
            writeback_attempts: 3,
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// What a stale-order refund does besides flipping the status
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundPolicy {
    #[default]
    StatusOnly,
    CreditBalance,
}

/// Reconciliation loop settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub page_size: usize,
    pub provider_timeout_ms: u64,
    /// Grace period before an order without provider id is refunded
    pub stale_after_secs: u64,
    /// Max provider order ids per bulk-status request
    pub status_batch_size: usize,
    #[serde(default)]
    pub refund_policy: RefundPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            page_size: 1000,
            provider_timeout_ms: 30_000,
            stale_after_secs: 300,
            status_batch_size: 100,
            refund_policy: RefundPolicy::StatusOnly,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_secs as i64)
    }
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "VND".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}
