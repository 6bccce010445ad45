// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context Domain Events
//!
//! Events published by the context components on the in-process event bus.
//! Consumers (the service's adaptation listener, the CLI, tests) subscribe
//! and never block publishers.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Observable facts emitted by the context subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::adaptation::{AdaptationKind, AdaptationOutcome};
use super::change::EnvironmentChange;
use super::decision::{ConfidenceTier, DecisionId};
use super::optimization::{ContextState, OptimizationId, Strategy};
use super::relationship::RelationshipKey;
use super::snapshot::HealthStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextEvent {
    SnapshotCaptured {
        health: HealthStatus,
        application_count: usize,
        degraded_probes: Vec<String>,
        captured_at: DateTime<Utc>,
    },
    ChangeDetected {
        change: EnvironmentChange,
    },
    RelationshipDiscovered {
        key: RelationshipKey,
        strength: f64,
        discovered_at: DateTime<Utc>,
    },
    OptimizationDecided {
        decision_id: OptimizationId,
        state: ContextState,
        strategy: Strategy,
        confidence: f64,
        decided_at: DateTime<Utc>,
    },
    OptimizationApplied {
        decision_id: OptimizationId,
        success: bool,
        applied_at: DateTime<Utc>,
    },
    PatternLearned {
        signature: String,
        success_rate: f64,
        learned_at: DateTime<Utc>,
    },
    DecisionMade {
        decision_id: DecisionId,
        decision_type: String,
        selected: String,
        confidence_tier: ConfidenceTier,
        decided_at: DateTime<Utc>,
    },
    DecisionExecuted {
        decision_id: DecisionId,
        success: bool,
        executed_at: DateTime<Utc>,
    },
    FeedbackRecorded {
        decision_id: DecisionId,
        score: f64,
        weights_adapted: bool,
        recorded_at: DateTime<Utc>,
    },
    PatternsMined {
        detected: usize,
        total_patterns: usize,
        mined_at: DateTime<Utc>,
    },
    PredictionsScored {
        scored: usize,
        accuracy: Option<f64>,
        scored_at: DateTime<Utc>,
    },
    AdaptationDispatched {
        kind: AdaptationKind,
        outcome: AdaptationOutcome,
        dispatched_at: DateTime<Utc>,
    },
}

impl ContextEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ContextEvent::SnapshotCaptured { captured_at, .. } => *captured_at,
            ContextEvent::ChangeDetected { change } => change.detected_at,
            ContextEvent::RelationshipDiscovered { discovered_at, .. } => *discovered_at,
            ContextEvent::OptimizationDecided { decided_at, .. } => *decided_at,
            ContextEvent::OptimizationApplied { applied_at, .. } => *applied_at,
            ContextEvent::PatternLearned { learned_at, .. } => *learned_at,
            ContextEvent::DecisionMade { decided_at, .. } => *decided_at,
            ContextEvent::DecisionExecuted { executed_at, .. } => *executed_at,
            ContextEvent::FeedbackRecorded { recorded_at, .. } => *recorded_at,
            ContextEvent::PatternsMined { mined_at, .. } => *mined_at,
            ContextEvent::PredictionsScored { scored_at, .. } => *scored_at,
            ContextEvent::AdaptationDispatched { dispatched_at, .. } => *dispatched_at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ContextEvent::SnapshotCaptured { .. } => "SnapshotCaptured",
            ContextEvent::ChangeDetected { .. } => "ChangeDetected",
            ContextEvent::RelationshipDiscovered { .. } => "RelationshipDiscovered",
            ContextEvent::OptimizationDecided { .. } => "OptimizationDecided",
            ContextEvent::OptimizationApplied { .. } => "OptimizationApplied",
            ContextEvent::PatternLearned { .. } => "PatternLearned",
            ContextEvent::DecisionMade { .. } => "DecisionMade",
            ContextEvent::DecisionExecuted { .. } => "DecisionExecuted",
            ContextEvent::FeedbackRecorded { .. } => "FeedbackRecorded",
            ContextEvent::PatternsMined { .. } => "PatternsMined",
            ContextEvent::PredictionsScored { .. } => "PredictionsScored",
            ContextEvent::AdaptationDispatched { .. } => "AdaptationDispatched",
        }
    }
}
