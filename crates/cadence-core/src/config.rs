use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database file. Created (with parent directories) on first
    /// connect.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub recurrence: RecurrenceSettings,
}

fn default_database_path() -> String {
    "cadence.db".to_string()
}

/// Tuning for instance materialization and the background sweep.
#[derive(Deserialize, Debug, Clone)]
pub struct RecurrenceSettings {
    /// Default materialization window in days
    pub lookahead_days: i64,
    /// Minutes between background sweeps
    pub sweep_interval_minutes: u64,
    /// Limit for batch materialization operations
    pub max_batch_size: usize,
}

impl Default for RecurrenceSettings {
    fn default() -> Self {
        Self {
            lookahead_days: 30,
            sweep_interval_minutes: 60,
            max_batch_size: 100,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            recurrence: RecurrenceSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Merges `cadence.toml` with `CADENCE_`-prefixed environment
    /// variables; the environment wins.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("cadence.toml"))
            .merge(Env::prefixed("CADENCE_"))
            .extract()
    }
}
