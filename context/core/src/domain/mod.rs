// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod adaptation;
pub mod bounded;
pub mod change;
pub mod config;
pub mod decision;
pub mod events;
pub mod history;
pub mod optimization;
pub mod persistence;
pub mod relationship;
pub mod snapshot;
pub mod telemetry;

pub use adaptation::{Adaptation, AdaptationId, AdaptationKind, AdaptationOutcome, AdaptationPayload};
pub use bounded::BoundedHistory;
pub use change::{ChangeId, ChangeType, ChangeValue, EnvironmentChange, Severity};
pub use config::{ConfigError, ContextConfig, ContextConfigManifest};
pub use decision::{
    Alternative, ConfidenceTier, ContextualDecision, CriteriaWeights, Criterion, DecisionFeedback,
    DecisionId, DecisionPattern, ScoredAlternative,
};
pub use events::ContextEvent;
pub use history::{
    HistorySample, MinedPattern, PatternFrequency, PatternKind, PatternTrigger, Prediction,
    PredictionOutcome,
};
pub use optimization::{
    AdaptationMode, ContextState, LearnedPattern, OptimizationDecision, OptimizationId, Parameter,
    ParameterBound, ParameterBounds, ParameterSet, Strategy,
};
pub use persistence::{PersistenceError, PersistenceStore};
pub use relationship::{ApplicationRelationship, RelationshipKey, RelationshipKind};
pub use snapshot::{
    AppId, ApplicationRecord, Connection, ContextSnapshot, HealthAssessment, HealthStatus,
    NetworkCounters, ResourceMetrics, ResourcePressure, SystemSnapshot,
};
pub use telemetry::{ProbeError, ProcessEntry, RawSystemMetrics, TelemetryProvider};
