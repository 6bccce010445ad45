// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! System Snapshot Domain
//!
//! Immutable per-cycle view of host resources and active applications, plus
//! the health classification derived from it.
//!
//! Health is scored by starting at 100 and subtracting stepped penalties:
//!
//! | Metric | Penalties |
//! |--------|-----------|
//! | cpu % | >90: 30, >70: 15, >50: 5 |
//! | memory % | >95: 25, >80: 10, >60: 3 |
//! | disk % | >95: 20, >85: 8, >70: 2 |
//! | 1m load | >2x cores: 15, >cores: 5 |
//!
//! A missing metric contributes no penalty.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Snapshot value objects and health assessment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::change::EnvironmentChange;

/// Five-level ordinal health class. Ordering runs from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthStatus::Excellent
        } else if score >= 75.0 {
            HealthStatus::Good
        } else if score >= 50.0 {
            HealthStatus::Fair
        } else if score >= 25.0 {
            HealthStatus::Poor
        } else {
            HealthStatus::Critical
        }
    }

    /// True for Poor and Critical.
    pub fn is_degraded(&self) -> bool {
        *self >= HealthStatus::Poor
    }

    /// Normalized goodness in [0,1] used by evaluators and feature vectors.
    pub fn goodness(&self) -> f64 {
        match self {
            HealthStatus::Excellent => 1.0,
            HealthStatus::Good => 0.8,
            HealthStatus::Fair => 0.6,
            HealthStatus::Poor => 0.4,
            HealthStatus::Critical => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Excellent => "excellent",
            HealthStatus::Good => "good",
            HealthStatus::Fair => "fair",
            HealthStatus::Poor => "poor",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
}

/// Raw resource metrics. Every field is optional because each probe may fail
/// independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub network: Option<NetworkCounters>,
    /// 1, 5 and 15 minute load averages
    pub load_average: Option<[f64; 3]>,
    pub process_count: Option<u32>,
    pub thread_count: Option<u32>,
    pub cpu_cores: Option<u32>,
}

impl ResourceMetrics {
    pub fn cpu(&self) -> f64 {
        self.cpu_percent.unwrap_or(0.0)
    }

    pub fn memory(&self) -> f64 {
        self.memory_percent.unwrap_or(0.0)
    }

    pub fn disk(&self) -> f64 {
        self.disk_percent.unwrap_or(0.0)
    }
}

/// Compute the 0..=100 health score for a set of metrics.
pub fn health_score(metrics: &ResourceMetrics, default_cores: u32) -> f64 {
    let mut score: f64 = 100.0;

    if let Some(cpu) = metrics.cpu_percent {
        score -= if cpu > 90.0 {
            30.0
        } else if cpu > 70.0 {
            15.0
        } else if cpu > 50.0 {
            5.0
        } else {
            0.0
        };
    }

    if let Some(memory) = metrics.memory_percent {
        score -= if memory > 95.0 {
            25.0
        } else if memory > 80.0 {
            10.0
        } else if memory > 60.0 {
            3.0
        } else {
            0.0
        };
    }

    if let Some(disk) = metrics.disk_percent {
        score -= if disk > 95.0 {
            20.0
        } else if disk > 85.0 {
            8.0
        } else if disk > 70.0 {
            2.0
        } else {
            0.0
        };
    }

    if let Some([load_1m, _, _]) = metrics.load_average {
        let cores = f64::from(metrics.cpu_cores.unwrap_or(default_cores).max(1));
        score -= if load_1m > cores * 2.0 {
            15.0
        } else if load_1m > cores {
            5.0
        } else {
            0.0
        };
    }

    score.clamp(0.0, 100.0)
}

/// Score and classify in one step.
pub fn assess_health(metrics: &ResourceMetrics, default_cores: u32) -> (f64, HealthStatus) {
    let score = health_score(metrics, default_cores);
    (score, HealthStatus::from_score(score))
}

/// Network endpoint of an application connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub local: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// Stable application identifier, `name:pid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub String);

impl AppId {
    pub fn new(name: &str, pid: u32) -> Self {
        Self(format!("{}:{}", name, pid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: AppId,
    pub name: String,
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    #[serde(default)]
    pub open_resources: Vec<String>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Normalized pressure per resource, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePressure {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub overall: f64,
}

impl ResourcePressure {
    pub fn from_metrics(metrics: &ResourceMetrics) -> Self {
        let cpu = (metrics.cpu() / 100.0).clamp(0.0, 1.0);
        let memory = (metrics.memory() / 100.0).clamp(0.0, 1.0);
        let disk = (metrics.disk() / 100.0).clamp(0.0, 1.0);
        Self {
            cpu,
            memory,
            disk,
            overall: (cpu * 0.4 + memory * 0.4 + disk * 0.2).clamp(0.0, 1.0),
        }
    }
}

/// One capture cycle. Never mutated after the monitor publishes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: ResourceMetrics,
    pub health: HealthStatus,
    pub health_score: f64,
    pub applications: Vec<ApplicationRecord>,
    /// Probes that failed or timed out during this capture
    #[serde(default)]
    pub degraded_probes: Vec<String>,
}

impl SystemSnapshot {
    /// Build a snapshot, deriving health from the metrics.
    pub fn new(
        timestamp: DateTime<Utc>,
        metrics: ResourceMetrics,
        applications: Vec<ApplicationRecord>,
        default_cores: u32,
    ) -> Self {
        let (health_score, health) = assess_health(&metrics, default_cores);
        Self {
            timestamp,
            metrics,
            health,
            health_score,
            applications,
            degraded_probes: Vec::new(),
        }
    }

    pub fn active_application_count(&self) -> usize {
        self.applications.len()
    }

    pub fn pressure(&self) -> ResourcePressure {
        ResourcePressure::from_metrics(&self.metrics)
    }
}

/// Read model handed to the rest of the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: ResourceMetrics,
    pub applications: Vec<ApplicationRecord>,
    pub health: HealthStatus,
    pub health_score: f64,
    pub recent_changes: Vec<EnvironmentChange>,
    pub resource_pressure: ResourcePressure,
    pub relationship_count: usize,
}

impl ContextSnapshot {
    pub fn from_snapshot(
        snapshot: &SystemSnapshot,
        recent_changes: Vec<EnvironmentChange>,
        relationship_count: usize,
    ) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            metrics: snapshot.metrics.clone(),
            applications: snapshot.applications.clone(),
            health: snapshot.health,
            health_score: snapshot.health_score,
            recent_changes,
            resource_pressure: snapshot.pressure(),
            relationship_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub status: HealthStatus,
    pub score: f64,
    pub recommendations: Vec<String>,
    /// Change in health score across the retained snapshot window
    pub score_trend: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cpu: f64, memory: f64) -> ResourceMetrics {
        ResourceMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            disk_percent: Some(40.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_idle_host_is_excellent() {
        let (score, status) = assess_health(&metrics(10.0, 20.0), 4);
        assert_eq!(score, 100.0);
        assert_eq!(status, HealthStatus::Excellent);
    }

    #[test]
    fn test_missing_metrics_contribute_nothing() {
        let (score, status) = assess_health(&ResourceMetrics::default(), 4);
        assert_eq!(score, 100.0);
        assert_eq!(status, HealthStatus::Excellent);
    }

    #[test]
    fn test_load_over_core_count_penalized() {
        let mut m = metrics(10.0, 20.0);
        m.load_average = Some([9.0, 4.0, 2.0]);
        m.cpu_cores = Some(4);
        assert_eq!(health_score(&m, 1), 85.0);
        m.load_average = Some([5.0, 4.0, 2.0]);
        assert_eq!(health_score(&m, 1), 95.0);
    }

    #[test]
    fn test_saturated_host_is_critical_or_poor() {
        let m = ResourceMetrics {
            cpu_percent: Some(99.0),
            memory_percent: Some(99.0),
            disk_percent: Some(99.0),
            load_average: Some([64.0, 32.0, 16.0]),
            cpu_cores: Some(4),
            ..Default::default()
        };
        let (score, status) = assess_health(&m, 4);
        assert_eq!(score, 10.0);
        assert_eq!(status, HealthStatus::Critical);
    }

    #[test]
    fn test_health_ordering_best_to_worst() {
        assert!(HealthStatus::Excellent < HealthStatus::Good);
        assert!(HealthStatus::Poor.is_degraded());
        assert!(HealthStatus::Critical.is_degraded());
        assert!(!HealthStatus::Fair.is_degraded());
    }

    #[test]
    fn test_app_id_format() {
        assert_eq!(AppId::new("editor", 42).as_str(), "editor:42");
    }
}
