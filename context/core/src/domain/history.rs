// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context History Domain
//!
//! Compact history samples, mined patterns and the predictions derived from
//! them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects for the context history tracker

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::snapshot::{ContextSnapshot, HealthStatus};

/// Active application ids retained per sample
pub const MAX_SAMPLE_APPS: usize = 10;

/// Lightweight record of one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    /// Total bytes moved, if known
    pub network_bytes: Option<u64>,
    pub active_apps: Vec<String>,
    pub activity_level: f64,
    pub health: HealthStatus,
}

impl HistorySample {
    pub fn from_context(context: &ContextSnapshot) -> Self {
        let cpu = context.metrics.cpu();
        let active_apps: Vec<String> = context
            .applications
            .iter()
            .take(MAX_SAMPLE_APPS)
            .map(|app| app.name.clone())
            .collect();
        Self {
            timestamp: context.timestamp,
            cpu_percent: cpu,
            memory_percent: context.metrics.memory(),
            disk_percent: context.metrics.disk(),
            network_bytes: context
                .metrics
                .network
                .map(|n| n.bytes_sent.saturating_add(n.bytes_received)),
            activity_level: activity_level(cpu, context.applications.len(), context.recent_changes.len()),
            active_apps,
            health: context.health,
        }
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Activity estimate in [0,1] from cpu load, app count and change churn.
pub fn activity_level(cpu_percent: f64, app_count: usize, change_count: usize) -> f64 {
    let mut level: f64 = 0.0;
    if cpu_percent > 20.0 {
        level += (cpu_percent / 100.0).min(0.4);
    }
    level += (app_count as f64 / 10.0).min(0.3);
    level += (change_count as f64 / 5.0).min(0.3);
    level.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Temporal,
    Usage,
    Resource,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternKind::Temporal => "temporal",
            PatternKind::Usage => "usage",
            PatternKind::Resource => "resource",
        })
    }
}

/// Condition under which a mined pattern is expected to recur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum PatternTrigger {
    PeakHour { hour: u32 },
    CoOccurrence { apps: [String; 2] },
    HighLoad { cpu_threshold: f64 },
}

impl PatternTrigger {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternTrigger::PeakHour { .. } => PatternKind::Temporal,
            PatternTrigger::CoOccurrence { .. } => PatternKind::Usage,
            PatternTrigger::HighLoad { .. } => PatternKind::Resource,
        }
    }

    /// Deterministic pattern id. The first app name is length-prefixed so
    /// names containing the separator cannot collide.
    pub fn pattern_id(&self) -> String {
        match self {
            PatternTrigger::PeakHour { hour } => format!("temporal/peak_hour_{}", hour),
            PatternTrigger::CoOccurrence { apps } => {
                format!("usage/cooccur_{}:{}_{}", apps[0].len(), apps[0], apps[1])
            }
            PatternTrigger::HighLoad { .. } => "resource/high_cpu_usage".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFrequency {
    Rare,
    Occasional,
    Frequent,
    Common,
    Dominant,
}

impl PatternFrequency {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 0.8 {
            PatternFrequency::Dominant
        } else if ratio > 0.5 {
            PatternFrequency::Common
        } else if ratio > 0.2 {
            PatternFrequency::Frequent
        } else if ratio > 0.05 {
            PatternFrequency::Occasional
        } else {
            PatternFrequency::Rare
        }
    }
}

/// Recurring pattern mined from the history buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinedPattern {
    pub id: String,
    pub trigger: PatternTrigger,
    pub description: String,
    pub frequency: PatternFrequency,
    pub confidence: f64,
    pub occurrence_count: u64,
    pub first_detected: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Hit ratio of predictions issued from this pattern
    pub prediction_accuracy: Option<f64>,
}

impl MinedPattern {
    pub fn new(
        trigger: PatternTrigger,
        description: impl Into<String>,
        frequency: PatternFrequency,
        confidence: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: trigger.pattern_id(),
            trigger,
            description: description.into(),
            frequency,
            confidence: confidence.clamp(0.0, 1.0),
            occurrence_count: 1,
            first_detected: detected_at,
            last_seen: detected_at,
            prediction_accuracy: None,
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.trigger.kind()
    }

    /// Fold a fresh detection of the same pattern into this one.
    pub fn merge(&mut self, candidate: &MinedPattern) {
        self.confidence = ((self.confidence + candidate.confidence) / 2.0).clamp(0.0, 1.0);
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        self.frequency = candidate.frequency;
        self.description = candidate.description.clone();
        self.trigger = candidate.trigger.clone();
        if candidate.last_seen > self.last_seen {
            self.last_seen = candidate.last_seen;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictionId(pub Uuid);

impl PredictionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PredictionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    Pending,
    Hit,
    Miss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub pattern_id: String,
    pub kind: PatternKind,
    pub target_time: DateTime<Utc>,
    pub description: String,
    pub confidence: f64,
    pub made_at: DateTime<Utc>,
    pub outcome: PredictionOutcome,
}
