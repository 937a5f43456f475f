use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::patterns::types::PatternKind;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ExocortexConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub mining: MiningConfig,
    pub patterns: PatternConfig,
    pub prediction: PredictionConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Upper bound on a single storage call before it surfaces as unavailable.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MiningConfig {
    pub co_access_window_secs: u64,
    pub sequential_max_delay_secs: u64,
    pub frequency_window_days: u32,
    pub directory_max_files: usize,
    pub max_neighbors: usize,
    pub ignore_hidden: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PatternConfig {
    /// `k` in `n / (n + k)`. Keep fixed across a deployment so confidences stay comparable.
    pub decay_constant: f64,
    /// Per-day multiplier applied by `decay` since a pattern was last used.
    pub decay_factor: f64,
    pub confidence_floor: f64,
    pub frequency_rank_ratio: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PredictionConfig {
    pub default_max_results: usize,
    pub cache_ttl_secs: u64,
    pub cache_top_k: usize,
    pub min_score: f64,
    pub weights: KindWeights,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KindWeights {
    pub co_access: f64,
    pub sequential: f64,
    pub directory: f64,
    pub frequency: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub interval_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_exocortex_dir()
            .join("exocortex.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            timeout_ms: 5000,
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            co_access_window_secs: 300,
            sequential_max_delay_secs: 600,
            frequency_window_days: 30,
            directory_max_files: 50,
            max_neighbors: 32,
            ignore_hidden: true,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            decay_constant: 3.0,
            decay_factor: 0.99,
            confidence_floor: 0.05,
            frequency_rank_ratio: 0.8,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            default_max_results: 5,
            cache_ttl_secs: 600,
            cache_top_k: 20,
            min_score: 0.0,
            weights: KindWeights::default(),
        }
    }
}

impl Default for KindWeights {
    fn default() -> Self {
        Self {
            co_access: 1.0,
            sequential: 1.0,
            directory: 1.0,
            frequency: 1.0,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: 24,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MiningConfig {
    pub fn co_access_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.co_access_window_secs as i64)
    }

    pub fn sequential_max_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sequential_max_delay_secs as i64)
    }
}

impl PredictionConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs as i64)
    }
}

impl KindWeights {
    pub fn weight(&self, kind: PatternKind) -> f64 {
        match kind {
            PatternKind::CoAccess => self.co_access,
            PatternKind::Sequential => self.sequential,
            PatternKind::DirectoryAffinity => self.directory,
            PatternKind::Frequency => self.frequency,
        }
    }

    pub fn total(&self) -> f64 {
        PatternKind::ALL
            .iter()
            .map(|k| self.weight(*k).max(0.0))
            .sum()
    }
}

/// Returns `~/.exocortex/`
pub fn default_exocortex_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".exocortex")
}

/// Returns the default config file path: `~/.exocortex/config.toml`
pub fn default_config_path() -> PathBuf {
    default_exocortex_dir().join("config.toml")
}

impl ExocortexConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ExocortexConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (EXOCORTEX_DB, EXOCORTEX_LOG_LEVEL, EXOCORTEX_DECAY_CONSTANT).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("EXOCORTEX_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("EXOCORTEX_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("EXOCORTEX_DECAY_CONSTANT") {
            match val.parse::<f64>() {
                Ok(k) if k > 0.0 => self.patterns.decay_constant = k,
                _ => tracing::warn!(value = %val, "ignoring invalid EXOCORTEX_DECAY_CONSTANT"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExocortexConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.patterns.decay_constant, 3.0);
        assert_eq!(config.patterns.confidence_floor, 0.05);
        assert_eq!(config.prediction.cache_ttl_secs, 600);
        assert_eq!(config.mining.co_access_window_secs, 300);
        assert!(config.storage.db_path.ends_with("exocortex.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[prediction]
default_max_results = 10

[prediction.weights]
frequency = 0.5
"#;
        let config: ExocortexConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.prediction.default_max_results, 10);
        assert_eq!(config.prediction.weights.frequency, 0.5);
        // defaults still apply for unset fields
        assert_eq!(config.prediction.weights.co_access, 1.0);
        assert_eq!(config.storage.timeout_ms, 5000);
        assert_eq!(config.patterns.decay_factor, 0.99);
    }

    #[test]
    fn weights_total_sums_all_kinds() {
        let weights = KindWeights::default();
        assert_eq!(weights.total(), 4.0);
        assert_eq!(weights.weight(PatternKind::Sequential), 1.0);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ExocortexConfig::default();
        std::env::set_var("EXOCORTEX_DB", "/tmp/override.db");
        std::env::set_var("EXOCORTEX_LOG_LEVEL", "trace");
        std::env::set_var("EXOCORTEX_DECAY_CONSTANT", "5");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.patterns.decay_constant, 5.0);

        // Clean up
        std::env::remove_var("EXOCORTEX_DB");
        std::env::remove_var("EXOCORTEX_LOG_LEVEL");
        std::env::remove_var("EXOCORTEX_DECAY_CONSTANT");
    }
}
