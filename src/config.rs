//! Configuration management for the detection and aggregation engine
//!
//! Provides TOML-backed configuration for the Detection Coordinator's
//! timing parameters, the Evidence Aggregator's weight overrides, probe
//! enablement, and the Hourly Aggregator's namespace handling.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Detection Coordinator timing
    pub coordinator: CoordinatorConfig,
    /// Evidence Aggregator weighting
    pub aggregator: AggregatorConfig,
    /// Probe executor enablement and parameters
    pub probes: ProbesConfig,
    /// Hourly Aggregator behavior
    pub hourly: HourlyConfig,
}

/// Detection Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Delay before the first tick after workload discovery (seconds)
    #[serde(default = "default_init_delay_secs")]
    pub init_delay_secs: u64,
    /// Base backoff interval used in `10s * 2^(attempt-1)` (seconds)
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Maximum backoff interval (seconds)
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Per-probe timeout (seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Minimum pod ready duration before the process probe is dispatched (seconds)
    #[serde(default = "default_process_ready_secs")]
    pub process_ready_secs: u64,
    /// Max attempts per source before it stops being a dispatch candidate
    #[serde(default = "default_max_attempts_per_source")]
    pub max_attempts_per_source: u32,
}

/// Evidence Aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Overrides for the fixed source-weight table (source name -> weight)
    #[serde(default)]
    pub weight_overrides: std::collections::HashMap<String, f64>,
    /// Fraction of the winner's total_score a runner-up must reach to be
    /// flagged as a conflict
    #[serde(default = "default_conflict_ratio")]
    pub conflict_ratio: f64,
    /// Multi-source confidence bonus cap
    #[serde(default = "default_multi_source_bonus_cap")]
    pub multi_source_bonus_cap: f64,
}

/// Probe executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbesConfig {
    /// Enable the process probe
    #[serde(default = "default_true")]
    pub process_enabled: bool,
    /// Enable the log-window probe
    #[serde(default = "default_true")]
    pub log_enabled: bool,
    /// Enable the image probe
    #[serde(default = "default_true")]
    pub image_enabled: bool,
    /// Enable the label probe
    #[serde(default = "default_true")]
    pub label_enabled: bool,
    /// Additional label keys (beyond `app.kubernetes.io/name`) mapped to
    /// candidate frameworks by the label probe
    #[serde(default)]
    pub custom_label_keys: Vec<String>,
    /// Additional annotation keys consulted by the label probe
    #[serde(default)]
    pub custom_annotation_keys: Vec<String>,
}

/// Hourly Aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyConfig {
    /// System namespaces excluded from namespace/label backfill
    #[serde(default = "default_system_namespaces")]
    pub excluded_namespaces: Vec<String>,
    /// Opt-in to include excluded namespaces anyway
    #[serde(default)]
    pub include_system_namespaces: bool,
}

fn default_init_delay_secs() -> u64 {
    30
}
fn default_backoff_base_secs() -> u64 {
    10
}
fn default_backoff_max_secs() -> u64 {
    60
}
fn default_probe_timeout_secs() -> u64 {
    60
}
fn default_process_ready_secs() -> u64 {
    30
}
fn default_max_attempts_per_source() -> u32 {
    5
}
fn default_conflict_ratio() -> f64 {
    0.70
}
fn default_multi_source_bonus_cap() -> f64 {
    0.15
}
fn default_true() -> bool {
    true
}
fn default_system_namespaces() -> Vec<String> {
    vec![
        "kube-system".to_string(),
        "kube-public".to_string(),
        "kube-node-lease".to_string(),
    ]
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            init_delay_secs: default_init_delay_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            process_ready_secs: default_process_ready_secs(),
            max_attempts_per_source: default_max_attempts_per_source(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            weight_overrides: std::collections::HashMap::new(),
            conflict_ratio: default_conflict_ratio(),
            multi_source_bonus_cap: default_multi_source_bonus_cap(),
        }
    }
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            process_enabled: true,
            log_enabled: true,
            image_enabled: true,
            label_enabled: true,
            custom_label_keys: Vec::new(),
            custom_annotation_keys: Vec::new(),
        }
    }
}

impl Default for HourlyConfig {
    fn default() -> Self {
        Self {
            excluded_namespaces: default_system_namespaces(),
            include_system_namespaces: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            aggregator: AggregatorConfig::default(),
            probes: ProbesConfig::default(),
            hourly: HourlyConfig::default(),
        }
    }
}

impl Config {
    /// Get the default configuration file path: `~/.config/mlwarden/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        Ok(config_dir.join("mlwarden"))
    }

    /// Load configuration from the default path, falling back to defaults
    /// if no file exists
    pub fn load() -> Result<Self> {
        let config_dir = Self::default_path()?;
        let config_file = config_dir.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_file)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path()?;
        std::fs::create_dir_all(&config_dir)?;

        let config_file = config_dir.join("config.toml");
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("failed to serialize config: {}", e)))?;

        std::fs::write(&config_file, contents)?;
        Ok(())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let config = Config::default();
        assert_eq!(config.coordinator.init_delay_secs, 30);
        assert_eq!(config.coordinator.backoff_base_secs, 10);
        assert_eq!(config.coordinator.backoff_max_secs, 60);
        assert_eq!(config.coordinator.max_attempts_per_source, 5);
        assert_eq!(config.aggregator.conflict_ratio, 0.70);
        assert_eq!(
            config.hourly.excluded_namespaces,
            vec!["kube-system", "kube-public", "kube-node-lease"]
        );
        assert!(!config.hourly.include_system_namespaces);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.coordinator.backoff_base_secs,
            config.coordinator.backoff_base_secs
        );
    }
}
