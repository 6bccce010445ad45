// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Optimization Domain
//!
//! Context classification, strategy ladder, bounded parameter sets and the
//! learned patterns the optimizer keeps per context signature.
//!
//! # Load score
//!
//! `0.45 * cpu% + 0.45 * memory% + 0.10 * min(5 * active_apps, 100)`
//!
//! | Score | State |
//! |-------|-------|
//! | < 15 | idle |
//! | < 35 | light |
//! | < 55 | moderate |
//! | < 75 | heavy |
//! | >= 75 | critical |
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Optimizer value objects and parameter bounds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::config::ConfigError;
use super::snapshot::{ContextSnapshot, HealthStatus, ResourceMetrics, SystemSnapshot};

/// Ordinal load classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    Idle,
    Light,
    Moderate,
    Heavy,
    Critical,
}

impl ContextState {
    pub const ALL: [ContextState; 5] = [
        ContextState::Idle,
        ContextState::Light,
        ContextState::Moderate,
        ContextState::Heavy,
        ContextState::Critical,
    ];

    pub fn from_load_score(score: f64) -> Self {
        if score < 15.0 {
            ContextState::Idle
        } else if score < 35.0 {
            ContextState::Light
        } else if score < 55.0 {
            ContextState::Moderate
        } else if score < 75.0 {
            ContextState::Heavy
        } else {
            ContextState::Critical
        }
    }

    pub fn classify(snapshot: &SystemSnapshot) -> Self {
        Self::from_load_score(load_score(snapshot))
    }

    pub fn classify_context(context: &ContextSnapshot) -> Self {
        Self::from_load_score(weighted_load(&context.metrics, context.applications.len()))
    }

    /// Default strategy before health escalation.
    pub fn default_strategy(&self) -> Strategy {
        match self {
            ContextState::Idle => Strategy::Conservative,
            ContextState::Light => Strategy::Efficiency,
            ContextState::Moderate => Strategy::Balanced,
            ContextState::Heavy => Strategy::Performance,
            ContextState::Critical => Strategy::Aggressive,
        }
    }

    pub fn signature(&self) -> String {
        format!("state:{}", self.as_str())
    }

    /// Adjacency similarity between states.
    pub fn similarity(&self, other: &ContextState) -> f64 {
        use ContextState::*;
        match (self, other) {
            (a, b) if a == b => 1.0,
            (Idle, Light) | (Light, Idle) => 0.7,
            (Light, Moderate) | (Moderate, Light) => 0.8,
            (Moderate, Heavy) | (Heavy, Moderate) => 0.8,
            (Heavy, Critical) | (Critical, Heavy) => 0.7,
            _ => 0.0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ContextState::Heavy | ContextState::Critical)
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self, ContextState::Idle | ContextState::Light)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextState::Idle => "idle",
            ContextState::Light => "light",
            ContextState::Moderate => "moderate",
            ContextState::Heavy => "heavy",
            ContextState::Critical => "critical",
        }
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContextState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown context state '{}'", s))
    }
}

/// Weighted load score in [0,100].
pub fn load_score(snapshot: &SystemSnapshot) -> f64 {
    weighted_load(&snapshot.metrics, snapshot.active_application_count())
}

pub fn weighted_load(metrics: &ResourceMetrics, application_count: usize) -> f64 {
    let apps = (application_count as f64 * 5.0).min(100.0);
    let score = 0.45 * metrics.cpu() + 0.45 * metrics.memory() + 0.10 * apps;
    score.clamp(0.0, 100.0)
}

/// Strategy ladder, least to most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Conservative,
    Efficiency,
    Balanced,
    Performance,
    Aggressive,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Conservative,
        Strategy::Efficiency,
        Strategy::Balanced,
        Strategy::Performance,
        Strategy::Aggressive,
    ];

    /// One step up the ladder; Aggressive stays Aggressive.
    pub fn escalate(&self) -> Strategy {
        match self {
            Strategy::Conservative => Strategy::Efficiency,
            Strategy::Efficiency => Strategy::Balanced,
            Strategy::Balanced => Strategy::Performance,
            Strategy::Performance | Strategy::Aggressive => Strategy::Aggressive,
        }
    }

    /// State default, escalated once on degraded health.
    pub fn select(state: ContextState, health: HealthStatus) -> Strategy {
        let strategy = state.default_strategy();
        if health.is_degraded() {
            strategy.escalate()
        } else {
            strategy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Conservative => "conservative",
            Strategy::Efficiency => "efficiency",
            Strategy::Balanced => "balanced",
            Strategy::Performance => "performance",
            Strategy::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("unknown strategy '{}'", s))
    }
}

/// Tunable knob names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    MonitoringFrequency,
    ProcessingIntensity,
    MemoryUsageTarget,
    CpuUsageTarget,
    ResponseTimeTarget,
    BackgroundTaskPriority,
    CacheSizeMultiplier,
    ParallelProcessingFactor,
}

impl Parameter {
    pub const ALL: [Parameter; 8] = [
        Parameter::MonitoringFrequency,
        Parameter::ProcessingIntensity,
        Parameter::MemoryUsageTarget,
        Parameter::CpuUsageTarget,
        Parameter::ResponseTimeTarget,
        Parameter::BackgroundTaskPriority,
        Parameter::CacheSizeMultiplier,
        Parameter::ParallelProcessingFactor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::MonitoringFrequency => "monitoring_frequency",
            Parameter::ProcessingIntensity => "processing_intensity",
            Parameter::MemoryUsageTarget => "memory_usage_target",
            Parameter::CpuUsageTarget => "cpu_usage_target",
            Parameter::ResponseTimeTarget => "response_time_target",
            Parameter::BackgroundTaskPriority => "background_task_priority",
            Parameter::CacheSizeMultiplier => "cache_size_multiplier",
            Parameter::ParallelProcessingFactor => "parallel_processing_factor",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Seconds between monitoring passes
    pub monitoring_frequency: f64,
    pub processing_intensity: f64,
    pub memory_usage_target: f64,
    pub cpu_usage_target: f64,
    /// Seconds
    pub response_time_target: f64,
    pub background_task_priority: f64,
    pub cache_size_multiplier: f64,
    pub parallel_processing_factor: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            monitoring_frequency: 5.0,
            processing_intensity: 1.0,
            memory_usage_target: 0.7,
            cpu_usage_target: 0.6,
            response_time_target: 1.0,
            background_task_priority: 0.3,
            cache_size_multiplier: 1.0,
            parallel_processing_factor: 1.0,
        }
    }
}

impl ParameterSet {
    /// Base template for a context state (unclamped).
    pub fn template(state: ContextState) -> Self {
        let base = Self::default();
        match state {
            ContextState::Critical => Self {
                monitoring_frequency: 2.0,
                processing_intensity: 0.5,
                memory_usage_target: 0.5,
                cpu_usage_target: 0.4,
                background_task_priority: 0.1,
                cache_size_multiplier: 0.7,
                ..base
            },
            ContextState::Heavy => Self {
                monitoring_frequency: 3.0,
                processing_intensity: 0.8,
                memory_usage_target: 0.6,
                cpu_usage_target: 0.5,
                background_task_priority: 0.2,
                parallel_processing_factor: 1.5,
                ..base
            },
            ContextState::Moderate => base,
            ContextState::Light => Self {
                monitoring_frequency: 10.0,
                processing_intensity: 1.2,
                memory_usage_target: 0.8,
                cpu_usage_target: 0.7,
                background_task_priority: 0.5,
                cache_size_multiplier: 1.3,
                ..base
            },
            ContextState::Idle => Self {
                monitoring_frequency: 15.0,
                processing_intensity: 1.5,
                memory_usage_target: 0.9,
                cpu_usage_target: 0.8,
                background_task_priority: 0.8,
                cache_size_multiplier: 1.5,
                ..base
            },
        }
    }

    pub fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::MonitoringFrequency => self.monitoring_frequency,
            Parameter::ProcessingIntensity => self.processing_intensity,
            Parameter::MemoryUsageTarget => self.memory_usage_target,
            Parameter::CpuUsageTarget => self.cpu_usage_target,
            Parameter::ResponseTimeTarget => self.response_time_target,
            Parameter::BackgroundTaskPriority => self.background_task_priority,
            Parameter::CacheSizeMultiplier => self.cache_size_multiplier,
            Parameter::ParallelProcessingFactor => self.parallel_processing_factor,
        }
    }

    pub fn set(&mut self, parameter: Parameter, value: f64) {
        let slot = match parameter {
            Parameter::MonitoringFrequency => &mut self.monitoring_frequency,
            Parameter::ProcessingIntensity => &mut self.processing_intensity,
            Parameter::MemoryUsageTarget => &mut self.memory_usage_target,
            Parameter::CpuUsageTarget => &mut self.cpu_usage_target,
            Parameter::ResponseTimeTarget => &mut self.response_time_target,
            Parameter::BackgroundTaskPriority => &mut self.background_task_priority,
            Parameter::CacheSizeMultiplier => &mut self.cache_size_multiplier,
            Parameter::ParallelProcessingFactor => &mut self.parallel_processing_factor,
        };
        *slot = value;
    }

    /// Clamp every field into its bound. Non-finite values snap to the lower bound.
    pub fn clamped(&self, bounds: &ParameterBounds) -> Self {
        let mut out = *self;
        for parameter in Parameter::ALL {
            let bound = bounds.get(parameter);
            out.set(parameter, bound.clamp(self.get(parameter)));
        }
        out
    }

    pub fn within(&self, bounds: &ParameterBounds) -> bool {
        Parameter::ALL
            .into_iter()
            .all(|parameter| bounds.get(parameter).contains(self.get(parameter)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    pub min: f64,
    pub max: f64,
}

impl ParameterBound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.max(self.min).min(self.max)
        } else {
            self.min
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-parameter bounds table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    #[serde(default = "default_monitoring_frequency_bound")]
    pub monitoring_frequency: ParameterBound,
    #[serde(default = "default_processing_intensity_bound")]
    pub processing_intensity: ParameterBound,
    #[serde(default = "default_memory_usage_target_bound")]
    pub memory_usage_target: ParameterBound,
    #[serde(default = "default_cpu_usage_target_bound")]
    pub cpu_usage_target: ParameterBound,
    #[serde(default = "default_response_time_target_bound")]
    pub response_time_target: ParameterBound,
    #[serde(default = "default_background_task_priority_bound")]
    pub background_task_priority: ParameterBound,
    #[serde(default = "default_cache_size_multiplier_bound")]
    pub cache_size_multiplier: ParameterBound,
    #[serde(default = "default_parallel_processing_factor_bound")]
    pub parallel_processing_factor: ParameterBound,
}

fn default_monitoring_frequency_bound() -> ParameterBound {
    ParameterBound::new(1.0, 60.0)
}

fn default_processing_intensity_bound() -> ParameterBound {
    ParameterBound::new(0.1, 2.0)
}

fn default_memory_usage_target_bound() -> ParameterBound {
    ParameterBound::new(0.3, 0.9)
}

fn default_cpu_usage_target_bound() -> ParameterBound {
    ParameterBound::new(0.2, 0.8)
}

fn default_response_time_target_bound() -> ParameterBound {
    ParameterBound::new(0.1, 5.0)
}

fn default_background_task_priority_bound() -> ParameterBound {
    ParameterBound::new(0.1, 1.0)
}

fn default_cache_size_multiplier_bound() -> ParameterBound {
    ParameterBound::new(0.5, 3.0)
}

fn default_parallel_processing_factor_bound() -> ParameterBound {
    ParameterBound::new(0.5, 4.0)
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            monitoring_frequency: default_monitoring_frequency_bound(),
            processing_intensity: default_processing_intensity_bound(),
            memory_usage_target: default_memory_usage_target_bound(),
            cpu_usage_target: default_cpu_usage_target_bound(),
            response_time_target: default_response_time_target_bound(),
            background_task_priority: default_background_task_priority_bound(),
            cache_size_multiplier: default_cache_size_multiplier_bound(),
            parallel_processing_factor: default_parallel_processing_factor_bound(),
        }
    }
}

impl ParameterBounds {
    pub fn get(&self, parameter: Parameter) -> ParameterBound {
        match parameter {
            Parameter::MonitoringFrequency => self.monitoring_frequency,
            Parameter::ProcessingIntensity => self.processing_intensity,
            Parameter::MemoryUsageTarget => self.memory_usage_target,
            Parameter::CpuUsageTarget => self.cpu_usage_target,
            Parameter::ResponseTimeTarget => self.response_time_target,
            Parameter::BackgroundTaskPriority => self.background_task_priority,
            Parameter::CacheSizeMultiplier => self.cache_size_multiplier,
            Parameter::ParallelProcessingFactor => self.parallel_processing_factor,
        }
    }

    /// Reject non-finite, inverted or non-positive bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for parameter in Parameter::ALL {
            let bound = self.get(parameter);
            if !bound.min.is_finite() || !bound.max.is_finite() {
                return Err(ConfigError::InvalidBound {
                    parameter: parameter.to_string(),
                    reason: "bounds must be finite".to_string(),
                });
            }
            if bound.min > bound.max {
                return Err(ConfigError::InvalidBound {
                    parameter: parameter.to_string(),
                    reason: format!("min {} exceeds max {}", bound.min, bound.max),
                });
            }
            if bound.min <= 0.0 {
                return Err(ConfigError::InvalidBound {
                    parameter: parameter.to_string(),
                    reason: format!("min {} must be positive", bound.min),
                });
            }
        }
        Ok(())
    }
}

/// How eagerly the optimizer applies its own decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationMode {
    /// Apply when the classified state changes
    #[default]
    Reactive,
    /// Apply when a rising load trend is detected
    Predictive,
    /// Apply every confident decision
    Proactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptimizationId(pub Uuid);

impl OptimizationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OptimizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OptimizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationDecision {
    pub id: OptimizationId,
    pub state: ContextState,
    pub strategy: Strategy,
    pub parameters: ParameterSet,
    pub reasoning: Vec<String>,
    pub confidence: f64,
    pub expected_impact: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    pub applied: bool,
    pub actual_impact: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameter set remembered for a context signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: PatternId,
    pub signature: String,
    pub state: ContextState,
    pub parameters: ParameterSet,
    pub success_rate: f64,
    pub usage_frequency: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub resource_profile: BTreeMap<String, f64>,
    #[serde(default)]
    pub outcome_profile: BTreeMap<String, f64>,
}
