// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptation
//!
//! Provides adaptation functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements internal responsibilities for adaptation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::change::{ChangeId, Severity};
use super::optimization::{ParameterSet, Strategy};

/// Kinds of adaptation the agent can be told about. Rate limits apply per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationKind {
    ParameterTuning,
    StrategySwitch,
    ResourceRelief,
    MonitoringBoost,
    FocusShift,
    RelationshipUpdate,
}

impl AdaptationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationKind::ParameterTuning => "parameter_tuning",
            AdaptationKind::StrategySwitch => "strategy_switch",
            AdaptationKind::ResourceRelief => "resource_relief",
            AdaptationKind::MonitoringBoost => "monitoring_boost",
            AdaptationKind::FocusShift => "focus_shift",
            AdaptationKind::RelationshipUpdate => "relationship_update",
        }
    }
}

impl fmt::Display for AdaptationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdaptationId(pub Uuid);

impl AdaptationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AdaptationId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum AdaptationPayload {
    Parameters { parameters: ParameterSet },
    Strategy { strategy: Strategy },
    Change { change_id: ChangeId, subject: String, severity: Severity },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adaptation {
    pub id: AdaptationId,
    pub kind: AdaptationKind,
    pub description: String,
    pub payload: AdaptationPayload,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl Adaptation {
    pub fn new(
        kind: AdaptationKind,
        description: impl Into<String>,
        payload: AdaptationPayload,
        confidence: f64,
    ) -> Self {
        Self {
            id: AdaptationId::new(),
            kind,
            description: description.into(),
            payload,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }
}

/// Result of a single dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdaptationOutcome {
    Applied { callbacks: usize },
    RateLimited,
    NoHandler,
    Rejected { failures: usize, callbacks: usize },
}

impl AdaptationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, AdaptationOutcome::Applied { .. })
    }
}
