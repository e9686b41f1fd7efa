use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_PATH: &str = "chime.db";

// Scheduling cadence. The fetch-ahead window must comfortably exceed the poll
// interval so a reminder is leased before its instant arrives.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2500;
pub const DEFAULT_FETCH_AHEAD_MS: i64 = 5000;
pub const DEFAULT_LEASE_DURATION_MS: i64 = 30_000;
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Top-level config (chime.toml + CHIME_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChimeConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tunables for the lease/poll pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the poller scans the store for due rows.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Reminders due within this window are leased ahead of their instant.
    #[serde(default = "default_fetch_ahead_ms")]
    pub fetch_ahead_ms: i64,
    /// A lease older than this is abandoned and the row becomes eligible again.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: i64,
    /// Maximum rows leased per poll tick. Must be at least 1.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            fetch_ahead_ms: default_fetch_ahead_ms(),
            lease_duration_ms: default_lease_duration_ms(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_fetch_ahead_ms() -> i64 {
    DEFAULT_FETCH_AHEAD_MS
}
fn default_lease_duration_ms() -> i64 {
    DEFAULT_LEASE_DURATION_MS
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl ChimeConfig {
    /// Load config from a TOML file with CHIME_* env var overrides
    /// (double underscore separates sections, e.g. `CHIME_GATEWAY__PORT`).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("chime.toml");

        let config: ChimeConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHIME_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = ChimeConfig::default();
        assert_eq!(config.gateway.bind, "127.0.0.1");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.scheduler.poll_interval_ms, 2500);
        assert_eq!(config.scheduler.fetch_ahead_ms, 5000);
        assert_eq!(config.scheduler.lease_duration_ms, 30_000);
        assert_eq!(config.scheduler.batch_size, 2);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let scheduler: SchedulerConfig =
            serde_json::from_str(r#"{"poll_interval_ms": 100}"#).unwrap();
        assert_eq!(scheduler.poll_interval_ms, 100);
        assert_eq!(scheduler.batch_size, DEFAULT_BATCH_SIZE);
    }
}
