// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements mod

pub mod adaptation_registry;
pub mod context_optimizer;
pub mod context_service;
pub mod decision_engine;
pub mod environment_monitor;
pub mod estimators;
pub mod evaluators;
pub mod history_tracker;
pub mod periodic;
pub mod rate_limiter;

pub use adaptation_registry::{AdaptationCallback, AdaptationRegistry, AdaptationStats};
pub use context_optimizer::{ContextOptimizer, OptimizerStats};
pub use context_service::{ContextAwarenessService, ContextError, ContextInsights};
pub use decision_engine::{
    AdaptiveDecisionEngine, DecisionInsights, EngineStats, FeedbackOutcome, OPTIMIZATION_DECISION,
    RESOURCE_ALLOCATION_DECISION,
};
pub use environment_monitor::{EnvironmentMonitor, MonitorStats};
pub use estimators::{StaticStrategyTable, StrategyEstimator};
pub use evaluators::{AlternativeGenerator, CriterionEvaluator, DecisionExecutor, EvaluationContext};
pub use history_tracker::{ContextHistoryTracker, HistoryStats};
pub use rate_limiter::AdaptationRateLimiter;
