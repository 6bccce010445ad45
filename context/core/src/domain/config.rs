// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Context Configuration Types
//
// Defines the configuration schema for the context awareness subsystem:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Per-component cadence, thresholds and capacities
// - Optimizer parameter bounds table
// - Adaptation rate limiting
// - Observability settings
//
// Every field has a serde default so a manifest may specify only what it
// overrides. `validate()` is the only place a structural misconfiguration is
// surfaced; all runtime paths assume a validated config.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::decision::Criterion;
use super::optimization::{AdaptationMode, ParameterBounds};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "ContextConfig";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} = {value} is outside {expected}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Invalid bound for {parameter}: {reason}")]
    InvalidBound { parameter: String, reason: String },
}

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ContextConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub adaptation: AdaptationConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Capture cadence
    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound on each telemetry call
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Multiplier on the base change thresholds (lower is more sensitive)
    #[serde(default = "default_sensitivity")]
    pub change_sensitivity: f64,

    /// Changes at or below this significance are not kept in history
    #[serde(default = "default_significance_cutoff")]
    pub change_significance_cutoff: f64,

    #[serde(default = "default_snapshot_capacity")]
    pub snapshot_capacity: usize,

    #[serde(default = "default_change_capacity")]
    pub change_capacity: usize,

    #[serde(default = "default_relationship_capacity")]
    pub relationship_capacity: usize,

    /// Applications unseen for this long are forgotten
    #[serde(default = "default_inactivity_window", with = "humantime_serde")]
    pub app_inactivity_window: Duration,

    /// Per-application activity samples retained for co-occurrence
    #[serde(default = "default_activity_window")]
    pub activity_window: usize,

    /// Used for the load-vs-cores check when telemetry omits core count
    #[serde(default = "default_cpu_cores")]
    pub default_cpu_cores: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Optimization cycle cadence
    #[serde(default = "default_optimizer_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Minimum decision confidence for the loop to apply a decision
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Let the learning rate drift with recent success
    #[serde(default = "default_true")]
    pub adaptive_learning_rate: bool,

    #[serde(default = "default_optimizer_similarity")]
    pub pattern_similarity_threshold: f64,

    /// Learned parameters are reused only above this success rate
    #[serde(default = "default_pattern_success_threshold")]
    pub pattern_success_threshold: f64,

    #[serde(default = "default_pattern_capacity")]
    pub pattern_capacity: usize,

    #[serde(default = "default_decision_capacity")]
    pub decision_capacity: usize,

    #[serde(default)]
    pub mode: AdaptationMode,

    #[serde(default)]
    pub parameter_bounds: ParameterBounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Standalone engine cycle cadence
    #[serde(default = "default_decision_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Minimum confidence for the engine loop to execute a decision
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_decision_similarity")]
    pub pattern_similarity_threshold: f64,

    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,

    /// Feedback at or below this score does not move weights
    #[serde(default = "default_feedback_threshold")]
    pub feedback_threshold: f64,

    #[serde(default = "default_decision_capacity")]
    pub decision_capacity: usize,

    #[serde(default = "default_pattern_capacity")]
    pub pattern_capacity: usize,

    /// Decisions considered by insights()
    #[serde(default = "default_insight_window")]
    pub insight_window: usize,

    /// Initial weights; omitted criteria keep their defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_weights: Option<BTreeMap<Criterion, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Recording cadence
    #[serde(default = "default_history_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_detection_interval", with = "humantime_serde")]
    pub pattern_detection_interval: Duration,

    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    /// Samples required before mining
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    #[serde(default = "default_history_pattern_capacity")]
    pub pattern_capacity: usize,

    #[serde(default = "default_prediction_capacity")]
    pub prediction_capacity: usize,

    #[serde(default = "default_prediction_horizon", with = "humantime_serde")]
    pub prediction_horizon: Duration,

    /// Wait past a prediction's target before scoring it
    #[serde(default = "default_prediction_grace", with = "humantime_serde")]
    pub prediction_grace: Duration,

    /// Samples within this distance of the target are inspected
    #[serde(default = "default_prediction_grace", with = "humantime_serde")]
    pub prediction_window: Duration,

    #[serde(default = "default_prediction_retention", with = "humantime_serde")]
    pub prediction_retention: Duration,

    /// Persist every N tracker cycles (0 disables periodic saves)
    #[serde(default = "default_save_every")]
    pub save_every_cycles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Applications allowed per kind per rolling minute
    #[serde(default = "default_rate_limit")]
    pub max_per_minute: u32,

    /// Minimum spacing between suggestions of the same kind
    #[serde(default = "default_suggestion_cooldown", with = "humantime_serde")]
    pub suggestion_cooldown: Duration,

    /// Turn detected changes into adaptations automatically while running
    #[serde(default = "default_true")]
    pub auto_adapt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Bounded join on stop()
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_true() -> bool {
    true
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_sensitivity() -> f64 {
    1.0
}

fn default_significance_cutoff() -> f64 {
    0.3
}

fn default_snapshot_capacity() -> usize {
    120
}

fn default_change_capacity() -> usize {
    500
}

fn default_relationship_capacity() -> usize {
    1000
}

fn default_inactivity_window() -> Duration {
    Duration::from_secs(300)
}

fn default_activity_window() -> usize {
    20
}

fn default_cpu_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn default_optimizer_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_optimizer_similarity() -> f64 {
    0.7
}

fn default_pattern_success_threshold() -> f64 {
    0.7
}

fn default_pattern_capacity() -> usize {
    200
}

fn default_decision_capacity() -> usize {
    1000
}

fn default_decision_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_decision_similarity() -> f64 {
    0.8
}

fn default_max_alternatives() -> usize {
    5
}

fn default_feedback_threshold() -> f64 {
    0.3
}

fn default_insight_window() -> usize {
    20
}

fn default_history_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_detection_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_history_capacity() -> usize {
    10_000
}

fn default_min_samples() -> usize {
    50
}

fn default_confidence_floor() -> f64 {
    0.7
}

fn default_history_pattern_capacity() -> usize {
    500
}

fn default_prediction_capacity() -> usize {
    1000
}

fn default_prediction_horizon() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_prediction_grace() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_prediction_retention() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_save_every() -> u32 {
    10
}

fn default_rate_limit() -> u32 {
    10
}

fn default_suggestion_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_event_bus_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_monitor_interval(),
            probe_timeout: default_probe_timeout(),
            change_sensitivity: default_sensitivity(),
            change_significance_cutoff: default_significance_cutoff(),
            snapshot_capacity: default_snapshot_capacity(),
            change_capacity: default_change_capacity(),
            relationship_capacity: default_relationship_capacity(),
            app_inactivity_window: default_inactivity_window(),
            activity_window: default_activity_window(),
            default_cpu_cores: default_cpu_cores(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            interval: default_optimizer_interval(),
            confidence_threshold: default_confidence_threshold(),
            learning_rate: default_learning_rate(),
            adaptive_learning_rate: true,
            pattern_similarity_threshold: default_optimizer_similarity(),
            pattern_success_threshold: default_pattern_success_threshold(),
            pattern_capacity: default_pattern_capacity(),
            decision_capacity: default_decision_capacity(),
            mode: AdaptationMode::default(),
            parameter_bounds: ParameterBounds::default(),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            interval: default_decision_interval(),
            confidence_threshold: default_confidence_threshold(),
            learning_rate: default_learning_rate(),
            pattern_similarity_threshold: default_decision_similarity(),
            max_alternatives: default_max_alternatives(),
            feedback_threshold: default_feedback_threshold(),
            decision_capacity: default_decision_capacity(),
            pattern_capacity: default_pattern_capacity(),
            insight_window: default_insight_window(),
            criteria_weights: None,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            interval: default_history_interval(),
            pattern_detection_interval: default_detection_interval(),
            capacity: default_history_capacity(),
            min_samples: default_min_samples(),
            confidence_floor: default_confidence_floor(),
            pattern_capacity: default_history_pattern_capacity(),
            prediction_capacity: default_prediction_capacity(),
            prediction_horizon: default_prediction_horizon(),
            prediction_grace: default_prediction_grace(),
            prediction_window: default_prediction_grace(),
            prediction_retention: default_prediction_retention(),
            save_every_cycles: default_save_every(),
        }
    }
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            max_per_minute: default_rate_limit(),
            suggestion_cooldown: default_suggestion_cooldown(),
            auto_adapt: true,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: default_shutdown_timeout(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ContextConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aegis-context".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ContextConfig::default(),
        }
    }
}

fn non_zero_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

fn non_zero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "[0, 1]",
        });
    }
    Ok(())
}

fn learning_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "(0, 1]",
        });
    }
    Ok(())
}

impl ContextConfig {
    /// Validate every section. The first violation is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitor = &self.monitor;
        non_zero_duration("monitor.interval", monitor.interval)?;
        non_zero_duration("monitor.probe_timeout", monitor.probe_timeout)?;
        non_zero_duration("monitor.app_inactivity_window", monitor.app_inactivity_window)?;
        if !monitor.change_sensitivity.is_finite()
            || monitor.change_sensitivity <= 0.0
            || monitor.change_sensitivity > 10.0
        {
            return Err(ConfigError::OutOfRange {
                field: "monitor.change_sensitivity",
                value: monitor.change_sensitivity,
                expected: "(0, 10]",
            });
        }
        unit_interval("monitor.change_significance_cutoff", monitor.change_significance_cutoff)?;
        if monitor.snapshot_capacity < 2 {
            return Err(ConfigError::OutOfRange {
                field: "monitor.snapshot_capacity",
                value: monitor.snapshot_capacity as f64,
                expected: ">= 2",
            });
        }
        non_zero("monitor.change_capacity", monitor.change_capacity)?;
        non_zero("monitor.relationship_capacity", monitor.relationship_capacity)?;
        non_zero("monitor.activity_window", monitor.activity_window)?;
        non_zero("monitor.default_cpu_cores", monitor.default_cpu_cores as usize)?;

        let optimizer = &self.optimizer;
        non_zero_duration("optimizer.interval", optimizer.interval)?;
        unit_interval("optimizer.confidence_threshold", optimizer.confidence_threshold)?;
        learning_rate("optimizer.learning_rate", optimizer.learning_rate)?;
        unit_interval(
            "optimizer.pattern_similarity_threshold",
            optimizer.pattern_similarity_threshold,
        )?;
        unit_interval(
            "optimizer.pattern_success_threshold",
            optimizer.pattern_success_threshold,
        )?;
        non_zero("optimizer.pattern_capacity", optimizer.pattern_capacity)?;
        non_zero("optimizer.decision_capacity", optimizer.decision_capacity)?;
        optimizer.parameter_bounds.validate()?;

        let decision = &self.decision;
        non_zero_duration("decision.interval", decision.interval)?;
        unit_interval("decision.confidence_threshold", decision.confidence_threshold)?;
        learning_rate("decision.learning_rate", decision.learning_rate)?;
        unit_interval(
            "decision.pattern_similarity_threshold",
            decision.pattern_similarity_threshold,
        )?;
        unit_interval("decision.feedback_threshold", decision.feedback_threshold)?;
        non_zero("decision.max_alternatives", decision.max_alternatives)?;
        non_zero("decision.decision_capacity", decision.decision_capacity)?;
        non_zero("decision.pattern_capacity", decision.pattern_capacity)?;
        non_zero("decision.insight_window", decision.insight_window)?;
        if let Some(weights) = &decision.criteria_weights {
            for (criterion, weight) in weights {
                if !weight.is_finite() || *weight < 0.0 {
                    return Err(ConfigError::InvalidManifest(format!(
                        "criteria weight for {} must be a non-negative number",
                        criterion
                    )));
                }
            }
        }

        let history = &self.history;
        non_zero_duration("history.interval", history.interval)?;
        non_zero_duration(
            "history.pattern_detection_interval",
            history.pattern_detection_interval,
        )?;
        non_zero("history.capacity", history.capacity)?;
        non_zero("history.min_samples", history.min_samples)?;
        unit_interval("history.confidence_floor", history.confidence_floor)?;
        non_zero("history.pattern_capacity", history.pattern_capacity)?;
        non_zero("history.prediction_capacity", history.prediction_capacity)?;

        non_zero("adaptation.max_per_minute", self.adaptation.max_per_minute as usize)?;
        non_zero_duration("lifecycle.shutdown_timeout", self.lifecycle.shutdown_timeout)?;
        non_zero("lifecycle.event_bus_capacity", self.lifecycle.event_bus_capacity)?;

        match self.observability.log_format.as_str() {
            "compact" | "json" => Ok(()),
            other => Err(ConfigError::InvalidManifest(format!(
                "observability.log_format '{}' must be 'compact' or 'json'",
                other
            ))),
        }
    }
}

impl ContextConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_CONTEXT_CONFIG_PATH environment variable
    /// 2. ./aegis-context.yaml (working directory)
    /// 3. ~/.aegis/context.yaml (user home)
    /// 4. /etc/aegis/context.yaml (system, Unix) or C:\ProgramData\Aegis\context.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_CONTEXT_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-context.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("context.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/aegis/context.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Aegis\\context.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_CONTEXT_MONITOR_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => {
                    tracing::info!("Environment override: AEGIS_CONTEXT_MONITOR_INTERVAL_SECS={}", secs);
                    self.spec.monitor.interval = Duration::from_secs(secs);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_CONTEXT_MONITOR_INTERVAL_SECS: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("AEGIS_CONTEXT_RATE_LIMIT") {
            match val.parse::<u32>() {
                Ok(limit) => {
                    tracing::info!("Environment override: AEGIS_CONTEXT_RATE_LIMIT={}", limit);
                    self.spec.adaptation.max_per_minute = limit;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_CONTEXT_RATE_LIMIT: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("AEGIS_CONTEXT_LEARNING_RATE") {
            match val.parse::<f64>() {
                Ok(rate) => {
                    tracing::info!("Environment override: AEGIS_CONTEXT_LEARNING_RATE={}", rate);
                    self.spec.optimizer.learning_rate = rate;
                    self.spec.decision.learning_rate = rate;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AEGIS_CONTEXT_LEARNING_RATE: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("AEGIS_CONTEXT_LOG_LEVEL") {
            self.spec.observability.log_level = val;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::InvalidManifest(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            )));
        }
        if self.kind != KIND {
            return Err(ConfigError::InvalidManifest(format!(
                "kind '{}' must be '{}'",
                self.kind, KIND
            )));
        }
        if self.metadata.name.trim().is_empty() {
            return Err(ConfigError::InvalidManifest(
                "metadata.name cannot be empty".to_string(),
            ));
        }
        self.spec.validate()
    }
}
