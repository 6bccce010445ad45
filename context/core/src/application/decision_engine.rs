// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptive Decision Engine
//!
//! Multi-criteria selection among alternatives for a named decision type.
//!
//! # Decide
//!
//! 1. Resolve the context (explicit argument, else the monitor's latest
//!    environment). No context means a `no_action` decision.
//! 2. Generate alternatives: a registered generator for the decision type,
//!    else strategy alternatives for the built-in types, ordered by the
//!    optimizer's strategy priorities. Truncate to `max_alternatives`.
//! 3. Score every alternative against all seven criteria. A missing,
//!    panicking or non-finite evaluator scores 0.5.
//! 4. Select the highest weighted score; derive confidence from the gap to
//!    the runner-up, system health and decision-pattern similarity.
//!
//! # Feedback
//!
//! Feedback above `feedback_threshold` nudges the weights of criteria the
//! selected alternative scored well on, then rebalances the weight vector
//! (sum 1, each weight within [0.01, 0.8]).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Scoring, selection, execution and weight learning

use chrono::{DateTime, Timelike, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::context_optimizer::ContextOptimizer;
use super::environment_monitor::EnvironmentMonitor;
use super::estimators::{StaticStrategyTable, StrategyEstimator};
use super::evaluators::{
    builtin_evaluators, AlternativeGenerator, CriterionEvaluator, DecisionExecutor,
    EvaluationContext,
};
use super::periodic::LoopHandle;
use crate::domain::bounded::BoundedHistory;
use crate::domain::config::DecisionConfig;
use crate::domain::decision::{
    cosine_similarity, Alternative, ConfidenceTier, ContextualDecision, CriteriaWeights,
    Criterion, DecisionFeedback, DecisionId, DecisionPattern, ScoredAlternative,
};
use crate::domain::events::ContextEvent;
use crate::domain::optimization::Strategy;
use crate::domain::snapshot::{ContextSnapshot, HealthStatus};
use crate::infrastructure::event_bus::EventBus;

/// Built-in decision type driven by strategy alternatives.
pub const OPTIMIZATION_DECISION: &str = "optimization";
/// Built-in decision type for resource allocation, also strategy-driven.
pub const RESOURCE_ALLOCATION_DECISION: &str = "resource_allocation";

const SUCCESS_THRESHOLD: f64 = 0.7;
const WELL_SCORED: f64 = 0.6;
const FEATURE_MOVEMENT: f64 = 0.1;

/// Feature vector describing a context:
/// cpu, memory, disk, apps/20, health, hour/24, business hours, change activity.
pub fn context_features(context: &ContextSnapshot) -> Vec<f64> {
    let hour = context.timestamp.hour();
    vec![
        (context.metrics.cpu() / 100.0).clamp(0.0, 1.0),
        (context.metrics.memory() / 100.0).clamp(0.0, 1.0),
        (context.metrics.disk() / 100.0).clamp(0.0, 1.0),
        (context.applications.len() as f64 / 20.0).min(1.0),
        context.health.goodness(),
        f64::from(hour) / 24.0,
        if (9..17).contains(&hour) { 1.0 } else { 0.0 },
        (context.recent_changes.len() as f64 / 5.0).min(1.0),
    ]
}

fn level(percent: f64) -> &'static str {
    if percent < 30.0 {
        "low"
    } else if percent < 70.0 {
        "medium"
    } else {
        "high"
    }
}

/// Coarse context signature, e.g. `cpu_low_mem_medium_apps_few_health_good`.
pub fn context_signature(context: &ContextSnapshot) -> String {
    format!(
        "cpu_{}_mem_{}_apps_{}_health_{}",
        level(context.metrics.cpu()),
        level(context.metrics.memory()),
        if context.applications.len() < 10 { "few" } else { "many" },
        if context.health.is_degraded() { "poor" } else { "good" },
    )
}

fn health_bonus(health: HealthStatus) -> f64 {
    match health {
        HealthStatus::Excellent => 0.2,
        HealthStatus::Good => 0.1,
        HealthStatus::Fair => 0.0,
        HealthStatus::Poor => -0.1,
        HealthStatus::Critical => -0.2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Recorded { weights_adapted: bool },
    UnknownDecision,
    AlreadyRecorded,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub decisions_made: u64,
    pub fallback_decisions: u64,
    pub executed: u64,
    pub failed_executions: u64,
    pub feedback_received: u64,
    pub successful_decisions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionInsight {
    pub average_score: f64,
    pub weight: f64,
}

/// Read-only aggregate over the most recent decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionInsights {
    pub window: usize,
    pub decisions_considered: usize,
    /// Share of decisions with feedback above 0.7, among those with feedback
    pub success_rate: Option<f64>,
    pub average_confidence: Option<f64>,
    pub executed: usize,
    pub confidence_tiers: BTreeMap<ConfidenceTier, usize>,
    pub criteria: BTreeMap<Criterion, CriterionInsight>,
    pub decision_patterns: usize,
    pub stats: EngineStats,
}

struct EngineState {
    weights: CriteriaWeights,
    decisions: BoundedHistory<ContextualDecision>,
    features: HashMap<DecisionId, Vec<f64>>,
    patterns: HashMap<String, DecisionPattern>,
    last_features: Option<Vec<f64>>,
    stats: EngineStats,
}

pub struct AdaptiveDecisionEngine {
    config: DecisionConfig,
    monitor: Arc<EnvironmentMonitor>,
    optimizer: Option<Arc<ContextOptimizer>>,
    estimator: Arc<dyn StrategyEstimator>,
    evaluators: RwLock<BTreeMap<Criterion, Arc<dyn CriterionEvaluator>>>,
    generators: RwLock<HashMap<String, Arc<dyn AlternativeGenerator>>>,
    executors: RwLock<HashMap<String, Arc<dyn DecisionExecutor>>>,
    event_bus: EventBus,
    state: Mutex<EngineState>,
    lifecycle: LoopHandle,
}

impl AdaptiveDecisionEngine {
    pub fn new(config: DecisionConfig, monitor: Arc<EnvironmentMonitor>, event_bus: EventBus) -> Self {
        let weights = config
            .criteria_weights
            .as_ref()
            .map(CriteriaWeights::from_raw)
            .unwrap_or_default();
        let state = EngineState {
            weights,
            decisions: BoundedHistory::new(config.decision_capacity),
            features: HashMap::new(),
            patterns: HashMap::new(),
            last_features: None,
            stats: EngineStats::default(),
        };
        Self {
            config,
            monitor,
            optimizer: None,
            estimator: Arc::new(StaticStrategyTable),
            evaluators: RwLock::new(builtin_evaluators()),
            generators: RwLock::new(HashMap::new()),
            executors: RwLock::new(HashMap::new()),
            event_bus,
            state: Mutex::new(state),
            lifecycle: LoopHandle::new("decision_engine"),
        }
    }

    /// Order strategy alternatives by the optimizer's learned priorities and
    /// share its estimator.
    pub fn with_optimizer(mut self, optimizer: Arc<ContextOptimizer>) -> Self {
        self.estimator = optimizer.estimator();
        self.optimizer = Some(optimizer);
        self
    }

    pub fn register_evaluator<E>(&self, criterion: Criterion, evaluator: E)
    where
        E: CriterionEvaluator + 'static,
    {
        self.evaluators.write().insert(criterion, Arc::new(evaluator));
        debug!(%criterion, "Registered criterion evaluator");
    }

    /// Drop the evaluator for `criterion`; it then scores 0.5.
    pub fn remove_evaluator(&self, criterion: Criterion) {
        self.evaluators.write().remove(&criterion);
    }

    pub fn register_generator<G>(&self, decision_type: impl Into<String>, generator: G)
    where
        G: AlternativeGenerator + 'static,
    {
        let decision_type = decision_type.into();
        debug!(decision_type = %decision_type, "Registered alternative generator");
        self.generators.write().insert(decision_type, Arc::new(generator));
    }

    pub fn register_executor<X>(&self, decision_type: impl Into<String>, executor: X)
    where
        X: DecisionExecutor + 'static,
    {
        let decision_type = decision_type.into();
        debug!(decision_type = %decision_type, "Registered decision executor");
        self.executors.write().insert(decision_type, Arc::new(executor));
    }

    pub fn start(self: &Arc<Self>) -> bool {
        let engine = Arc::clone(self);
        self.lifecycle.start(self.config.interval, move || {
            let engine = Arc::clone(&engine);
            async move {
                engine.run_cycle();
                Ok::<_, anyhow::Error>(())
            }
        })
    }

    pub async fn stop(&self, join_timeout: Duration) -> bool {
        self.lifecycle.stop(join_timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn weights(&self) -> CriteriaWeights {
        self.state.lock().weights.clone()
    }

    pub fn decision(&self, id: DecisionId) -> Option<ContextualDecision> {
        self.state
            .lock()
            .decisions
            .iter()
            .rev()
            .find(|decision| decision.id == id)
            .cloned()
    }

    /// The `limit` most recent decisions, oldest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<ContextualDecision> {
        self.state.lock().decisions.recent(limit).cloned().collect()
    }

    pub fn decision_patterns(&self) -> Vec<DecisionPattern> {
        let state = self.state.lock();
        let mut patterns: Vec<_> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
        patterns
    }

    fn strategy_alternatives(&self, context: &EvaluationContext) -> Vec<Alternative> {
        let ranked: Vec<Strategy> = match &self.optimizer {
            Some(optimizer) => optimizer
                .ranked_strategies(context.state)
                .into_iter()
                .map(|(strategy, _)| strategy)
                .collect(),
            None => Strategy::ALL.to_vec(),
        };
        ranked
            .into_iter()
            .map(|strategy| self.estimator.estimate_alternative(strategy, &context.environment))
            .collect()
    }

    fn generate_alternatives(&self, decision_type: &str, context: &EvaluationContext) -> Vec<Alternative> {
        let generator = self.generators.read().get(decision_type).cloned();
        let mut alternatives = match generator {
            Some(generator) => match catch_unwind(AssertUnwindSafe(|| generator.generate(context))) {
                Ok(alternatives) => alternatives,
                Err(_) => {
                    warn!(decision_type, "Alternative generator panicked");
                    Vec::new()
                }
            },
            None if decision_type == OPTIMIZATION_DECISION
                || decision_type == RESOURCE_ALLOCATION_DECISION =>
            {
                self.strategy_alternatives(context)
            }
            None => Vec::new(),
        };
        alternatives.truncate(self.config.max_alternatives);
        alternatives
    }

    fn score(&self, alternative: &Alternative, context: &EvaluationContext) -> BTreeMap<Criterion, f64> {
        let evaluators = self.evaluators.read().clone();
        Criterion::ALL
            .into_iter()
            .map(|criterion| {
                let score = match evaluators.get(&criterion) {
                    Some(evaluator) => {
                        match catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(alternative, context))) {
                            Ok(value) if value.is_finite() => value.clamp(0.0, 1.0),
                            Ok(_) => 0.5,
                            Err(_) => {
                                warn!(%criterion, alternative = %alternative.id, "Criterion evaluator panicked");
                                0.5
                            }
                        }
                    }
                    None => 0.5,
                };
                (criterion, score)
            })
            .collect()
    }

    /// Choose among generated alternatives. Never fails; without context or
    /// alternatives the result is a `no_action` decision.
    pub fn decide(&self, decision_type: &str, context: Option<ContextSnapshot>) -> ContextualDecision {
        let Some(environment) = context.or_else(|| self.monitor.get_current_environment()) else {
            return self.fallback(decision_type, None, "No environment snapshot available");
        };

        let signature = context_signature(&environment);
        let features = context_features(&environment);
        let health = environment.health;
        let context = EvaluationContext::new(environment);

        let alternatives = self.generate_alternatives(decision_type, &context);
        if alternatives.is_empty() {
            return self.fallback(
                decision_type,
                Some((signature, features)),
                "No alternatives available",
            );
        }

        let weights = self.state.lock().weights.clone();
        let scored: Vec<ScoredAlternative> = alternatives
            .into_iter()
            .map(|alternative| {
                let criteria_scores = self.score(&alternative, &context);
                let overall_score = weights.weighted_score(&criteria_scores);
                ScoredAlternative {
                    alternative,
                    criteria_scores,
                    overall_score,
                }
            })
            .collect();

        // Highest score first; ties keep generation order.
        let mut order: Vec<usize> = (0..scored.len()).collect();
        order.sort_by(|&a, &b| scored[b].overall_score.total_cmp(&scored[a].overall_score));
        let selected = order[0];
        let best = scored[selected].overall_score;

        let mut reasoning = vec![format!(
            "Selected {} with weighted score {:.3} among {} alternatives",
            scored[selected].alternative.id,
            best,
            scored.len()
        )];

        let mut state = self.state.lock();
        let confidence = if scored.len() < 2 {
            0.5
        } else {
            let runner_up = &scored[order[1]];
            let gap = best - runner_up.overall_score;
            reasoning.push(format!(
                "Runner-up {} trails by {:.3}",
                runner_up.alternative.id, gap
            ));

            let bonus = health_bonus(health);
            if bonus != 0.0 {
                reasoning.push(format!("{} health adjusts confidence by {:+.1}", health, bonus));
            }

            let prefix = format!("{}/", decision_type);
            let matched = state
                .patterns
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, pattern)| (cosine_similarity(&features, &pattern.features), pattern))
                .filter(|(similarity, _)| *similarity > self.config.pattern_similarity_threshold)
                .max_by(|(a, _), (b, _)| a.total_cmp(b));
            let pattern_bonus = match matched {
                Some((similarity, pattern)) => {
                    reasoning.push(format!(
                        "Context resembles pattern {} (similarity {:.2})",
                        pattern.signature, similarity
                    ));
                    0.1
                }
                None => 0.0,
            };

            ((2.0 * gap).min(1.0) + bonus + pattern_bonus).clamp(0.0, 1.0)
        };

        let chosen = &scored[selected].alternative;
        let mut expected_outcomes = BTreeMap::from([
            ("performance_gain".to_string(), chosen.performance_gain),
            ("resource_efficiency".to_string(), chosen.resource_efficiency),
            ("risk".to_string(), chosen.risk),
            ("responsiveness_gain".to_string(), chosen.responsiveness_gain),
            ("user_disruption".to_string(), chosen.user_disruption),
        ]);
        expected_outcomes.extend(chosen.attributes.clone());

        let selected_id = scored[selected].alternative.id.clone();

        let decision = ContextualDecision {
            id: DecisionId::new(),
            decision_type: decision_type.to_string(),
            context_signature: signature,
            alternatives: scored,
            selected,
            overall_score: best,
            confidence,
            confidence_tier: ConfidenceTier::from_confidence(confidence),
            reasoning,
            expected_outcomes,
            timestamp: Utc::now(),
            executed: false,
            feedback: None,
        };

        self.store_decision(&mut state, &decision, features);
        state.stats.decisions_made += 1;
        drop(state);

        debug!(
            decision_id = %decision.id,
            decision_type,
            selected = %selected_id,
            confidence = decision.confidence,
            "Decision made"
        );
        self.publish_made(&decision);
        decision
    }

    fn fallback(
        &self,
        decision_type: &str,
        context: Option<(String, Vec<f64>)>,
        reason: &str,
    ) -> ContextualDecision {
        let (signature, features) = context.unwrap_or_else(|| ("unknown".to_string(), Vec::new()));
        let alternative = Alternative::no_action();
        let decision = ContextualDecision {
            id: DecisionId::new(),
            decision_type: decision_type.to_string(),
            context_signature: signature,
            alternatives: vec![ScoredAlternative {
                alternative,
                criteria_scores: BTreeMap::new(),
                overall_score: 0.0,
            }],
            selected: 0,
            overall_score: 0.0,
            confidence: 0.5,
            confidence_tier: ConfidenceTier::from_confidence(0.5),
            reasoning: vec![reason.to_string()],
            expected_outcomes: BTreeMap::new(),
            timestamp: Utc::now(),
            executed: false,
            feedback: None,
        };

        let mut state = self.state.lock();
        self.store_decision(&mut state, &decision, features);
        state.stats.decisions_made += 1;
        state.stats.fallback_decisions += 1;
        drop(state);

        debug!(decision_id = %decision.id, decision_type, reason, "Fallback decision");
        self.publish_made(&decision);
        decision
    }

    fn store_decision(&self, state: &mut EngineState, decision: &ContextualDecision, features: Vec<f64>) {
        if let Some(evicted) = state.decisions.push(decision.clone()) {
            state.features.remove(&evicted.id);
        }
        state.features.insert(decision.id, features);
    }

    fn publish_made(&self, decision: &ContextualDecision) {
        let selected = decision
            .selected_alternative()
            .map(|scored| scored.alternative.id.clone())
            .unwrap_or_else(|| Alternative::NO_ACTION.to_string());
        self.event_bus.publish(ContextEvent::DecisionMade {
            decision_id: decision.id,
            decision_type: decision.decision_type.clone(),
            selected,
            confidence_tier: decision.confidence_tier,
            decided_at: decision.timestamp,
        });
    }

    /// Run the executor registered for the decision's type. `no_action`
    /// decisions succeed without dispatch.
    pub fn execute(&self, decision: &ContextualDecision) -> bool {
        let success = if decision.is_no_action() {
            debug!(decision_id = %decision.id, "Nothing to execute for no_action decision");
            true
        } else {
            let executor = self.executors.read().get(&decision.decision_type).cloned();
            match executor {
                None => {
                    warn!(decision_id = %decision.id, decision_type = %decision.decision_type, "No executor registered");
                    false
                }
                Some(executor) => match catch_unwind(AssertUnwindSafe(|| executor.execute(decision))) {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        warn!(decision_id = %decision.id, "Decision executor failed: {:#}", e);
                        false
                    }
                    Err(_) => {
                        warn!(decision_id = %decision.id, "Decision executor panicked");
                        false
                    }
                },
            }
        };

        {
            let mut state = self.state.lock();
            if success {
                state.stats.executed += 1;
                if let Some(stored) = state.decisions.iter_mut().rev().find(|d| d.id == decision.id) {
                    stored.executed = true;
                }
            } else {
                state.stats.failed_executions += 1;
            }
        }

        self.event_bus.publish(ContextEvent::DecisionExecuted {
            decision_id: decision.id,
            success,
            executed_at: Utc::now(),
        });
        success
    }

    /// Attach feedback to a stored decision and adapt criteria weights.
    pub fn feedback(
        &self,
        decision_id: DecisionId,
        score: f64,
        outcomes: BTreeMap<String, f64>,
    ) -> FeedbackOutcome {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        let now = Utc::now();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(decision) = state.decisions.iter_mut().rev().find(|d| d.id == decision_id) else {
            debug!(%decision_id, "Feedback for unknown decision");
            return FeedbackOutcome::UnknownDecision;
        };
        if decision.feedback.is_some() {
            return FeedbackOutcome::AlreadyRecorded;
        }
        decision.feedback = Some(DecisionFeedback {
            score,
            outcomes,
            received_at: now,
        });
        let decision = decision.clone();

        let mut weights_adapted = false;
        if score > self.config.feedback_threshold {
            if let Some(selected) = decision.selected_alternative() {
                let step = self.config.learning_rate * (score - 0.5) * 0.1;
                for (criterion, criterion_score) in &selected.criteria_scores {
                    if *criterion_score > WELL_SCORED {
                        state.weights.nudge(*criterion, step);
                        weights_adapted = true;
                    }
                }
                if weights_adapted {
                    state.weights.rebalance();
                }
            }
        }

        state.stats.feedback_received += 1;
        if score > SUCCESS_THRESHOLD {
            state.stats.successful_decisions += 1;
        }

        if let Some(features) = state.features.get(&decision.id).cloned() {
            if !features.is_empty() {
                self.update_pattern(state, &decision, features, score, now);
            }
        }
        drop(guard);

        info!(%decision_id, score, weights_adapted, "Decision feedback recorded");
        self.event_bus.publish(ContextEvent::FeedbackRecorded {
            decision_id,
            score,
            weights_adapted,
            recorded_at: now,
        });
        FeedbackOutcome::Recorded { weights_adapted }
    }

    fn update_pattern(
        &self,
        state: &mut EngineState,
        decision: &ContextualDecision,
        features: Vec<f64>,
        score: f64,
        now: DateTime<Utc>,
    ) {
        let key = format!("{}/{}", decision.decision_type, decision.context_signature);
        let selected = decision
            .selected_alternative()
            .map(|scored| scored.alternative.id.clone())
            .unwrap_or_else(|| Alternative::NO_ACTION.to_string());
        let lr = self.config.learning_rate;

        match state.patterns.get_mut(&key) {
            Some(pattern) => {
                let n = pattern.occurrences as f64;
                if pattern.features.len() == features.len() {
                    for (stored, observed) in pattern.features.iter_mut().zip(&features) {
                        *stored = (*stored * n + observed) / (n + 1.0);
                    }
                } else {
                    pattern.features = features;
                }
                pattern.success_rate = pattern.success_rate * (1.0 - lr) + score * lr;
                pattern.occurrences = pattern.occurrences.saturating_add(1);
                if score > SUCCESS_THRESHOLD {
                    pattern.best_alternative = selected;
                }
                pattern.last_updated = now;
            }
            None => {
                if state.patterns.len() >= self.config.pattern_capacity {
                    let stalest = state
                        .patterns
                        .iter()
                        .min_by(|a, b| a.1.last_updated.cmp(&b.1.last_updated).then_with(|| a.0.cmp(b.0)))
                        .map(|(key, _)| key.clone());
                    if let Some(stalest) = stalest {
                        state.patterns.remove(&stalest);
                    }
                }
                state.patterns.insert(
                    key,
                    DecisionPattern {
                        signature: decision.context_signature.clone(),
                        features,
                        success_rate: score,
                        occurrences: 1,
                        best_alternative: selected,
                        last_updated: now,
                    },
                );
            }
        }
    }

    /// Aggregates over the last `insight_window` decisions.
    pub fn insights(&self) -> DecisionInsights {
        let state = self.state.lock();
        let window = self.config.insight_window;
        let recent: Vec<&ContextualDecision> = state.decisions.recent(window).collect();

        let with_feedback: Vec<f64> = recent
            .iter()
            .filter_map(|d| d.feedback.as_ref().map(|f| f.score))
            .collect();
        let success_rate = (!with_feedback.is_empty()).then(|| {
            with_feedback.iter().filter(|s| **s > SUCCESS_THRESHOLD).count() as f64
                / with_feedback.len() as f64
        });
        let average_confidence = (!recent.is_empty())
            .then(|| recent.iter().map(|d| d.confidence).sum::<f64>() / recent.len() as f64);

        let mut confidence_tiers = BTreeMap::new();
        for decision in &recent {
            *confidence_tiers.entry(decision.confidence_tier).or_insert(0) += 1;
        }

        let criteria = state
            .weights
            .iter()
            .map(|(criterion, weight)| {
                let scores: Vec<f64> = recent
                    .iter()
                    .copied()
                    .filter_map(|d| d.selected_alternative())
                    .filter_map(|s| s.criteria_scores.get(&criterion).copied())
                    .collect();
                let average_score = if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                };
                (criterion, CriterionInsight { average_score, weight })
            })
            .collect();

        DecisionInsights {
            window,
            decisions_considered: recent.len(),
            success_rate,
            average_confidence,
            executed: recent.iter().filter(|d| d.executed).count(),
            confidence_tiers,
            criteria,
            decision_patterns: state.patterns.len(),
            stats: state.stats.clone(),
        }
    }

    /// Standalone cycle: decide `optimization` when the context moved and
    /// execute confident decisions.
    pub fn run_cycle(&self) {
        let Some(environment) = self.monitor.get_current_environment() else {
            debug!("No environment yet; skipping decision cycle");
            return;
        };
        let features = context_features(&environment);

        let moved = {
            let mut state = self.state.lock();
            let moved = match &state.last_features {
                None => true,
                Some(previous) => {
                    let distance: f64 = previous
                        .iter()
                        .zip(&features)
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                        .sqrt();
                    distance > FEATURE_MOVEMENT
                }
            };
            if moved {
                state.last_features = Some(features);
            }
            moved
        };
        if !moved {
            return;
        }

        let decision = self.decide(OPTIMIZATION_DECISION, Some(environment));
        if decision.confidence >= self.config.confidence_threshold && !decision.is_no_action() {
            self.execute(&decision);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::MonitorConfig;
    use crate::domain::snapshot::{ResourceMetrics, SystemSnapshot};
    use crate::infrastructure::telemetry::StaticTelemetryProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(config: DecisionConfig) -> AdaptiveDecisionEngine {
        let bus = EventBus::new(64);
        let monitor = Arc::new(EnvironmentMonitor::new(
            MonitorConfig::default(),
            Arc::new(StaticTelemetryProvider::default()),
            bus.clone(),
        ));
        AdaptiveDecisionEngine::new(config, monitor, bus)
    }

    fn environment(cpu: f64, memory: f64) -> ContextSnapshot {
        let metrics = ResourceMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            ..Default::default()
        };
        let snapshot = SystemSnapshot::new(Utc::now(), metrics, vec![], 4);
        ContextSnapshot::from_snapshot(&snapshot, vec![], 0)
    }

    fn alternative(id: &str, performance: f64) -> Alternative {
        Alternative {
            id: id.to_string(),
            description: id.to_string(),
            strategy: None,
            performance_gain: performance,
            resource_efficiency: 0.5,
            risk: 0.2,
            responsiveness_gain: 0.2,
            user_disruption: 0.1,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_no_context_falls_back_to_no_action() {
        let engine = engine(DecisionConfig::default());
        let decision = engine.decide(OPTIMIZATION_DECISION, None);
        assert!(decision.is_no_action());
        assert_eq!(decision.confidence, 0.5);
        assert_eq!(decision.confidence_tier, ConfidenceTier::Moderate);
        assert_eq!(engine.insights().stats.fallback_decisions, 1);
    }

    #[test]
    fn test_unknown_type_without_generator_falls_back() {
        let engine = engine(DecisionConfig::default());
        let decision = engine.decide("ui_layout", Some(environment(10.0, 20.0)));
        assert!(decision.is_no_action());
        assert_eq!(decision.context_signature, "cpu_low_mem_low_apps_few_health_good");
    }

    #[test]
    fn test_strategy_alternatives_scored_and_selected() {
        let engine = engine(DecisionConfig::default());
        let decision = engine.decide(OPTIMIZATION_DECISION, Some(environment(10.0, 20.0)));
        assert_eq!(decision.alternatives.len(), 5);
        let best = decision
            .alternatives
            .iter()
            .map(|a| a.overall_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(decision.overall_score, best);
        assert!((0.0..=1.0).contains(&decision.confidence));
        for scored in &decision.alternatives {
            assert_eq!(scored.criteria_scores.len(), 7);
            assert!(scored.criteria_scores.values().all(|s| (0.0..=1.0).contains(s)));
        }
        assert_eq!(decision.confidence_tier, ConfidenceTier::from_confidence(decision.confidence));
    }

    #[test]
    fn test_max_alternatives_truncates() {
        let engine = engine(DecisionConfig {
            max_alternatives: 2,
            ..DecisionConfig::default()
        });
        let decision = engine.decide(OPTIMIZATION_DECISION, Some(environment(50.0, 50.0)));
        assert_eq!(decision.alternatives.len(), 2);
    }

    #[test]
    fn test_single_alternative_confidence_is_neutral() {
        let engine = engine(DecisionConfig::default());
        engine.register_generator("cache", |_ctx: &EvaluationContext| vec![alternative("grow", 0.9)]);
        let decision = engine.decide("cache", Some(environment(10.0, 20.0)));
        assert_eq!(decision.confidence, 0.5);
        assert!(!decision.is_no_action());
    }

    #[test]
    fn test_confidence_from_gap_and_health() {
        let engine = engine(DecisionConfig::default());
        engine.register_generator("cache", |_ctx: &EvaluationContext| {
            vec![alternative("weak", 0.0), alternative("strong", 1.0)]
        });
        let decision = engine.decide("cache", Some(environment(10.0, 20.0)));
        assert_eq!(decision.selected_alternative().unwrap().alternative.id, "strong");

        // Only the performance criterion differs: gap = 0.25, doubled = 0.5,
        // plus 0.2 for excellent health.
        let weight = engine.weights().get(Criterion::Performance);
        let expected = (2.0 * weight).min(1.0) + 0.2;
        assert!((decision.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_faulty_evaluators_score_neutral() {
        let engine = engine(DecisionConfig::default());
        engine.register_evaluator(Criterion::Performance, |_a: &Alternative, _c: &EvaluationContext| f64::NAN);
        engine.register_evaluator(Criterion::Efficiency, |_a: &Alternative, _c: &EvaluationContext| -> f64 {
            panic!("evaluator bug")
        });
        engine.remove_evaluator(Criterion::Reliability);

        let decision = engine.decide(OPTIMIZATION_DECISION, Some(environment(10.0, 20.0)));
        for scored in &decision.alternatives {
            assert_eq!(scored.criteria_scores[&Criterion::Performance], 0.5);
            assert_eq!(scored.criteria_scores[&Criterion::Efficiency], 0.5);
            assert_eq!(scored.criteria_scores[&Criterion::Reliability], 0.5);
        }
    }

    #[test]
    fn test_execute_uses_registered_executor() {
        let engine = engine(DecisionConfig::default());
        let decision = engine.decide(OPTIMIZATION_DECISION, Some(environment(10.0, 20.0)));
        assert!(!engine.execute(&decision));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        engine.register_executor(OPTIMIZATION_DECISION, move |_d: &ContextualDecision| -> anyhow::Result<bool> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        assert!(engine.execute(&decision));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(engine.decision(decision.id).unwrap().executed);
    }

    #[test]
    fn test_feedback_adapts_weights_within_bounds() {
        let engine = engine(DecisionConfig {
            learning_rate: 0.5,
            ..DecisionConfig::default()
        });
        let before = engine.weights();

        for _ in 0..200 {
            let decision = engine.decide(OPTIMIZATION_DECISION, Some(environment(10.0, 20.0)));
            let outcome = engine.feedback(decision.id, 0.95, BTreeMap::new());
            assert_eq!(outcome, FeedbackOutcome::Recorded { weights_adapted: true });
            let weights = engine.weights();
            assert!((weights.sum() - 1.0).abs() < 1e-6);
            assert!(weights.iter().all(|(_, w)| (0.01 - 1e-9..=0.8 + 1e-9).contains(&w)));
        }
        assert_ne!(before, engine.weights());

        let insights = engine.insights();
        assert_eq!(insights.decisions_considered, 20);
        assert_eq!(insights.success_rate, Some(1.0));
        assert_eq!(engine.decision_patterns().len(), 1);
    }

    #[test]
    fn test_low_feedback_keeps_weights() {
        let engine = engine(DecisionConfig::default());
        let decision = engine.decide(OPTIMIZATION_DECISION, Some(environment(10.0, 20.0)));
        let before = engine.weights();
        assert_eq!(
            engine.feedback(decision.id, 0.2, BTreeMap::new()),
            FeedbackOutcome::Recorded { weights_adapted: false }
        );
        assert_eq!(before, engine.weights());
        assert_eq!(
            engine.feedback(decision.id, 0.9, BTreeMap::new()),
            FeedbackOutcome::AlreadyRecorded
        );
        assert_eq!(
            engine.feedback(DecisionId::new(), 0.9, BTreeMap::new()),
            FeedbackOutcome::UnknownDecision
        );
    }

    #[test]
    fn test_pattern_match_adds_confidence() {
        let engine = engine(DecisionConfig::default());
        engine.register_generator("cache", |_ctx: &EvaluationContext| {
            vec![alternative("weak", 0.0), alternative("strong", 0.2)]
        });
        let first = engine.decide("cache", Some(environment(10.0, 20.0)));
        engine.feedback(first.id, 0.9, BTreeMap::new());
        let second = engine.decide("cache", Some(environment(10.0, 20.0)));
        assert!(second.confidence > first.confidence);
        assert!(second.reasoning.iter().any(|r| r.contains("resembles pattern")));
    }

    #[test]
    fn test_insights_are_read_only() {
        let engine = engine(DecisionConfig::default());
        engine.decide(OPTIMIZATION_DECISION, Some(environment(10.0, 20.0)));
        let a = engine.insights();
        let b = engine.insights();
        assert_eq!(a, b);
        assert_eq!(a.decisions_considered, 1);
        assert_eq!(a.success_rate, None);
    }
}
