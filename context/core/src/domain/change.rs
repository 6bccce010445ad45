// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Environment Change
//!
//! Provides environment change functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements internal responsibilities for environment change

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub Uuid);

impl ChangeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Resource,
    Application,
    Relationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_significance(significance: f64) -> Self {
        if significance >= 0.8 {
            Severity::Critical
        } else if significance >= 0.6 {
            Severity::High
        } else if significance >= 0.3 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Value observed on either side of a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentChange {
    pub id: ChangeId,
    pub change_type: ChangeType,
    /// Metric name, application id or relationship key
    pub subject: String,
    pub description: String,
    pub severity: Severity,
    pub before: Option<ChangeValue>,
    pub after: Option<ChangeValue>,
    pub significance: f64,
    pub detected_at: DateTime<Utc>,
}

impl EnvironmentChange {
    /// Significance is clamped to [0,1] and severity derived from it.
    pub fn new(
        change_type: ChangeType,
        subject: impl Into<String>,
        description: impl Into<String>,
        before: Option<ChangeValue>,
        after: Option<ChangeValue>,
        significance: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let significance = if significance.is_finite() {
            significance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            id: ChangeId::new(),
            change_type,
            subject: subject.into(),
            description: description.into(),
            severity: Severity::from_significance(significance),
            before,
            after,
            significance,
            detected_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_significance(0.1), Severity::Low);
        assert_eq!(Severity::from_significance(0.3), Severity::Medium);
        assert_eq!(Severity::from_significance(0.65), Severity::High);
        assert_eq!(Severity::from_significance(0.95), Severity::Critical);
    }

    #[test]
    fn test_significance_clamped() {
        let change = EnvironmentChange::new(
            ChangeType::Resource,
            "cpu_percent",
            "spike",
            None,
            None,
            3.0,
            Utc::now(),
        );
        assert_eq!(change.significance, 1.0);
        assert_eq!(change.severity, Severity::Critical);

        let change = EnvironmentChange::new(
            ChangeType::Resource,
            "cpu_percent",
            "nan",
            None,
            None,
            f64::NAN,
            Utc::now(),
        );
        assert_eq!(change.significance, 0.0);
    }
}
