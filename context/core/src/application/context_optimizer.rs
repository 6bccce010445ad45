// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context-Driven Optimizer
//!
//! Classifies the current load into a [`ContextState`], selects a
//! [`Strategy`], produces a bounded [`ParameterSet`] and learns which
//! parameter sets worked for recurring contexts.
//!
//! # Learning
//!
//! Each outcome is reduced to a success score in `[0,1]` by comparing the
//! observed impact against the decision's expected impact
//! (see [`success_score`]). The score then:
//!
//! - smooths the learned pattern for the decision's context signature
//!   (`new = old * (1 - lr) + score * lr`), creating it if absent;
//! - smooths the priority of the (state, strategy) pair;
//! - feeds learning-rate self-tuning when enabled.
//!
//! # Cycle
//!
//! The optimizer loop reads the monitor's latest snapshot, evaluates the
//! previously applied decision against it, makes a fresh decision and applies
//! it when the adaptation mode and confidence threshold allow.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Strategy selection, parameter tuning, pattern learning

use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::adaptation_registry::AdaptationRegistry;
use super::environment_monitor::EnvironmentMonitor;
use super::estimators::{
    StaticStrategyTable, StrategyEstimator, PERFORMANCE_IMPROVEMENT, RESOURCE_EFFICIENCY,
    RESPONSE_TIME_IMPROVEMENT, SYSTEM_STABILITY,
};
use super::periodic::LoopHandle;
use crate::domain::adaptation::{Adaptation, AdaptationKind, AdaptationPayload};
use crate::domain::bounded::BoundedHistory;
use crate::domain::config::OptimizerConfig;
use crate::domain::events::ContextEvent;
use crate::domain::optimization::{
    load_score, AdaptationMode, ContextState, LearnedPattern, OptimizationDecision,
    OptimizationId, ParameterSet, PatternId, Strategy,
};
use crate::domain::persistence::PersistenceStore;
use crate::domain::snapshot::SystemSnapshot;
use crate::infrastructure::event_bus::EventBus;

pub const PATTERNS_KEY: &str = "context_optimizer.patterns";
pub const PRIORITIES_KEY: &str = "context_optimizer.priorities";

const INITIAL_PRIORITY: f64 = 0.5;
const TREND_WINDOW: usize = 5;
const TREND_RISE: f64 = 5.0;
const OUTCOME_WINDOW: usize = 10;
const MIN_OUTCOMES_FOR_TUNING: usize = 3;
const MIN_LEARNING_RATE: f64 = 0.05;
const MAX_LEARNING_RATE: f64 = 0.2;

/// Mean over shared keys of `min(1, actual / expected)`.
///
/// - expected 0: 1 if actual >= 0, else 0
/// - negative ratio: 0
/// - no shared keys: 0.5
pub fn success_score(expected: &BTreeMap<String, f64>, actual: &BTreeMap<String, f64>) -> f64 {
    let scores: Vec<f64> = actual
        .iter()
        .filter_map(|(key, actual)| {
            let expected = expected.get(key)?;
            if !actual.is_finite() || !expected.is_finite() {
                return None;
            }
            let score = if *expected == 0.0 {
                if *actual >= 0.0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                let ratio = actual / expected;
                if ratio < 0.0 {
                    0.0
                } else {
                    ratio.min(1.0)
                }
            };
            Some(score)
        })
        .collect();

    if scores.is_empty() {
        0.5
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Impact actually observed between two snapshots, keyed like the
/// estimator's expected impact.
pub fn observed_impact(before: &SystemSnapshot, after: &SystemSnapshot) -> BTreeMap<String, f64> {
    BTreeMap::from([
        (
            PERFORMANCE_IMPROVEMENT.to_string(),
            (before.metrics.cpu() - after.metrics.cpu()) / 100.0,
        ),
        (
            RESOURCE_EFFICIENCY.to_string(),
            (before.metrics.memory() - after.metrics.memory()) / 100.0,
        ),
        (
            RESPONSE_TIME_IMPROVEMENT.to_string(),
            (load_score(before) - load_score(after)) / 100.0,
        ),
        (
            SYSTEM_STABILITY.to_string(),
            (after.health_score - before.health_score) / 100.0,
        ),
    ])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub decisions_made: u64,
    pub decisions_applied: u64,
    pub failed_applications: u64,
    pub outcomes_learned: u64,
    pub learned_patterns: usize,
    pub learning_rate: f64,
    pub current_state: Option<ContextState>,
    pub current_strategy: Option<Strategy>,
}

struct PendingEvaluation {
    decision: OptimizationDecision,
    baseline: Arc<SystemSnapshot>,
}

struct OptimizerState {
    learning_rate: f64,
    patterns: HashMap<String, LearnedPattern>,
    priorities: BTreeMap<ContextState, BTreeMap<Strategy, f64>>,
    decisions: BoundedHistory<OptimizationDecision>,
    recent_scores: BoundedHistory<f64>,
    load_trend: BoundedHistory<f64>,
    last_applied_state: Option<ContextState>,
    pending: Option<PendingEvaluation>,
    stats: OptimizerStats,
}

pub struct ContextOptimizer {
    config: OptimizerConfig,
    monitor: Arc<EnvironmentMonitor>,
    registry: Arc<AdaptationRegistry>,
    estimator: Arc<dyn StrategyEstimator>,
    store: Arc<dyn PersistenceStore>,
    event_bus: EventBus,
    state: Mutex<OptimizerState>,
    lifecycle: LoopHandle,
}

impl ContextOptimizer {
    pub fn new(
        config: OptimizerConfig,
        monitor: Arc<EnvironmentMonitor>,
        registry: Arc<AdaptationRegistry>,
        store: Arc<dyn PersistenceStore>,
        event_bus: EventBus,
    ) -> Self {
        let state = OptimizerState {
            learning_rate: config.learning_rate,
            patterns: HashMap::new(),
            priorities: BTreeMap::new(),
            decisions: BoundedHistory::new(config.decision_capacity),
            recent_scores: BoundedHistory::new(OUTCOME_WINDOW),
            load_trend: BoundedHistory::new(TREND_WINDOW),
            last_applied_state: None,
            pending: None,
            stats: OptimizerStats {
                learning_rate: config.learning_rate,
                ..Default::default()
            },
        };
        Self {
            config,
            monitor,
            registry,
            estimator: Arc::new(StaticStrategyTable),
            store,
            event_bus,
            state: Mutex::new(state),
            lifecycle: LoopHandle::new("context_optimizer"),
        }
    }

    /// Replace the default impact table.
    pub fn with_estimator(mut self, estimator: Arc<dyn StrategyEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn estimator(&self) -> Arc<dyn StrategyEstimator> {
        Arc::clone(&self.estimator)
    }

    pub fn start(self: &Arc<Self>) -> bool {
        let optimizer = Arc::clone(self);
        self.lifecycle.start(self.config.interval, move || {
            let optimizer = Arc::clone(&optimizer);
            async move { optimizer.run_cycle().await }
        })
    }

    pub async fn stop(&self, join_timeout: Duration) -> bool {
        self.lifecycle.stop(join_timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Learned pattern usable for `state`: exact signature first, then the
    /// most similar adjacent state above the similarity threshold.
    fn matching_pattern(
        &self,
        patterns: &HashMap<String, LearnedPattern>,
        state: ContextState,
    ) -> Option<LearnedPattern> {
        let qualifies =
            |pattern: &&LearnedPattern| pattern.success_rate > self.config.pattern_success_threshold;

        if let Some(exact) = patterns.get(&state.signature()).filter(qualifies) {
            return Some(exact.clone());
        }

        patterns
            .values()
            .filter(qualifies)
            .map(|pattern| (state.similarity(&pattern.state), pattern))
            .filter(|(similarity, _)| *similarity >= self.config.pattern_similarity_threshold)
            .max_by(|(a, pa), (b, pb)| {
                a.total_cmp(b)
                    .then_with(|| pa.success_rate.total_cmp(&pb.success_rate))
            })
            .map(|(_, pattern)| pattern.clone())
    }

    /// Parameters for the snapshot's context, always within bounds.
    pub fn get_optimal_parameters(&self, snapshot: &SystemSnapshot) -> ParameterSet {
        let state = ContextState::classify(snapshot);
        let matched = {
            let guard = self.state.lock();
            self.matching_pattern(&guard.patterns, state)
        };
        let parameters = matched
            .map(|pattern| pattern.parameters)
            .unwrap_or_else(|| ParameterSet::template(state));
        parameters.clamped(&self.config.parameter_bounds)
    }

    /// Classify, select a strategy and assemble a decision.
    pub fn make_decision(&self, snapshot: &SystemSnapshot) -> OptimizationDecision {
        let load = load_score(snapshot);
        let state = ContextState::from_load_score(load);
        let base_strategy = state.default_strategy();
        let strategy = Strategy::select(state, snapshot.health);
        let cpu = snapshot.metrics.cpu();
        let memory = snapshot.metrics.memory();
        let now = Utc::now();

        let mut guard = self.state.lock();
        let matched = self.matching_pattern(&guard.patterns, state);

        let mut reasoning = vec![format!(
            "Load score {:.1} classifies the context as {}",
            load, state
        )];
        let mut confidence: f64 = 0.5;

        if state.is_loaded() && (cpu > 80.0 || memory > 85.0) {
            confidence += 0.3;
            if cpu > 80.0 {
                reasoning.push(format!("CPU usage is high at {:.1}%", cpu));
            }
            if memory > 85.0 {
                reasoning.push(format!("Memory usage is high at {:.1}%", memory));
            }
        }
        if state.is_quiet() && cpu < 20.0 && memory < 40.0 {
            confidence += 0.2;
            reasoning.push(format!(
                "Resources are mostly idle (CPU {:.1}%, memory {:.1}%)",
                cpu, memory
            ));
        }
        if strategy != base_strategy {
            reasoning.push(format!(
                "{} health escalates the strategy from {} to {}",
                snapshot.health, base_strategy, strategy
            ));
        }

        let parameters = match &matched {
            Some(pattern) => {
                confidence += 0.2;
                reasoning.push(format!(
                    "Learned pattern {} (success rate {:.2}) supplied the parameters",
                    pattern.signature, pattern.success_rate
                ));
                if let Some(stored) = guard.patterns.get_mut(&pattern.signature) {
                    stored.usage_frequency = stored.usage_frequency.saturating_add(1);
                    stored.last_used = now;
                }
                pattern.parameters
            }
            None => ParameterSet::template(state),
        }
        .clamped(&self.config.parameter_bounds);

        reasoning.push(format!("Selected the {} strategy", strategy));

        let decision = OptimizationDecision {
            id: OptimizationId::new(),
            state,
            strategy,
            parameters,
            reasoning,
            confidence: confidence.min(1.0),
            expected_impact: self.estimator.expected_impact(strategy),
            timestamp: now,
            applied: false,
            actual_impact: None,
        };

        guard.decisions.push(decision.clone());
        guard.stats.decisions_made += 1;
        guard.stats.current_state = Some(state);
        drop(guard);

        debug!(
            decision_id = %decision.id,
            state = %state,
            strategy = %strategy,
            confidence = decision.confidence,
            "Optimization decision made"
        );
        self.event_bus.publish(ContextEvent::OptimizationDecided {
            decision_id: decision.id,
            state,
            strategy,
            confidence: decision.confidence,
            decided_at: now,
        });

        decision
    }

    /// Dispatch the decision's parameters to the parameter-tuning callbacks.
    /// Success requires at least one callback and every callback succeeding.
    pub fn apply(&self, decision: &mut OptimizationDecision) -> bool {
        let adaptation = Adaptation::new(
            AdaptationKind::ParameterTuning,
            format!(
                "Apply {} parameters for a {} context",
                decision.strategy, decision.state
            ),
            AdaptationPayload::Parameters {
                parameters: decision.parameters.clamped(&self.config.parameter_bounds),
            },
            decision.confidence,
        );

        let outcome = self.registry.dispatch(&adaptation);
        let success = outcome.is_applied();
        decision.applied = success;

        {
            let mut guard = self.state.lock();
            if let Some(stored) = guard.decisions.iter_mut().rev().find(|d| d.id == decision.id) {
                stored.applied = success;
            }
            if success {
                guard.stats.decisions_applied += 1;
                guard.stats.current_strategy = Some(decision.strategy);
                guard.last_applied_state = Some(decision.state);
            } else {
                guard.stats.failed_applications += 1;
            }
        }

        if success {
            info!(decision_id = %decision.id, strategy = %decision.strategy, "Optimization applied");
        } else {
            warn!(decision_id = %decision.id, outcome = ?outcome, "Optimization not applied");
        }
        self.event_bus.publish(ContextEvent::OptimizationApplied {
            decision_id: decision.id,
            success,
            applied_at: Utc::now(),
        });

        success
    }

    /// Fold an observed outcome into patterns and priorities. Returns the
    /// success score.
    pub fn learn(&self, decision: &OptimizationDecision, outcome: &BTreeMap<String, f64>) -> f64 {
        let score = success_score(&decision.expected_impact, outcome);
        let signature = decision.state.signature();
        let now = Utc::now();

        let mut guard = self.state.lock();
        let lr = guard.learning_rate;

        let success_rate = match guard.patterns.get_mut(&signature) {
            Some(pattern) => {
                pattern.success_rate = pattern.success_rate * (1.0 - lr) + score * lr;
                pattern.usage_frequency = pattern.usage_frequency.saturating_add(1);
                pattern.last_used = now;
                if score > pattern.success_rate {
                    pattern.parameters = decision.parameters;
                }
                pattern.outcome_profile = outcome.clone();
                pattern.success_rate
            }
            None => {
                if guard.patterns.len() >= self.config.pattern_capacity {
                    evict_least_recently_used(&mut guard.patterns);
                }
                let pattern = LearnedPattern {
                    id: PatternId::new(),
                    signature: signature.clone(),
                    state: decision.state,
                    parameters: decision.parameters,
                    success_rate: score,
                    usage_frequency: 1,
                    created_at: now,
                    last_used: now,
                    resource_profile: decision.expected_impact.clone(),
                    outcome_profile: outcome.clone(),
                };
                guard.patterns.insert(signature.clone(), pattern);
                score
            }
        };

        let priority = guard
            .priorities
            .entry(decision.state)
            .or_default()
            .entry(decision.strategy)
            .or_insert(INITIAL_PRIORITY);
        *priority = *priority * (1.0 - lr) + score * lr;

        if let Some(stored) = guard.decisions.iter_mut().rev().find(|d| d.id == decision.id) {
            stored.actual_impact = Some(outcome.clone());
        }

        guard.recent_scores.push(score);
        guard.stats.outcomes_learned += 1;
        guard.stats.learned_patterns = guard.patterns.len();

        if self.config.adaptive_learning_rate {
            self.tune_learning_rate(&mut guard);
        }
        drop(guard);

        debug!(signature = %signature, score, success_rate, "Optimization outcome learned");
        self.event_bus.publish(ContextEvent::PatternLearned {
            signature,
            success_rate,
            learned_at: now,
        });

        score
    }

    fn tune_learning_rate(&self, state: &mut OptimizerState) {
        if state.recent_scores.len() < MIN_OUTCOMES_FOR_TUNING {
            return;
        }
        let average = state.recent_scores.iter().sum::<f64>() / state.recent_scores.len() as f64;
        let current = state.learning_rate;
        let tuned = if average > 0.8 {
            (current * 1.1).min(MAX_LEARNING_RATE)
        } else if average < 0.5 {
            (current * 0.9).max(MIN_LEARNING_RATE)
        } else {
            current
        };
        if (tuned - current).abs() > f64::EPSILON {
            debug!(from = current, to = tuned, average, "Learning rate adjusted");
        }
        state.learning_rate = tuned;
        state.stats.learning_rate = tuned;
    }

    /// All strategies for `state`, highest priority first. Ties keep ladder
    /// order.
    pub fn ranked_strategies(&self, state: ContextState) -> Vec<(Strategy, f64)> {
        let guard = self.state.lock();
        let priorities = guard.priorities.get(&state);
        let mut ranked: Vec<(Strategy, f64)> = Strategy::ALL
            .into_iter()
            .map(|strategy| {
                let priority = priorities
                    .and_then(|p| p.get(&strategy).copied())
                    .unwrap_or(INITIAL_PRIORITY);
                (strategy, priority)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Learned patterns ordered by signature.
    pub fn patterns(&self) -> Vec<LearnedPattern> {
        let guard = self.state.lock();
        let mut patterns: Vec<_> = guard.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
        patterns
    }

    /// The `limit` most recent decisions, oldest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<OptimizationDecision> {
        self.state.lock().decisions.recent(limit).cloned().collect()
    }

    pub fn learning_rate(&self) -> f64 {
        self.state.lock().learning_rate
    }

    pub fn stats(&self) -> OptimizerStats {
        let guard = self.state.lock();
        let mut stats = guard.stats.clone();
        stats.learned_patterns = guard.patterns.len();
        stats
    }

    /// One optimization cycle against the monitor's latest snapshot.
    pub async fn run_cycle(&self) -> anyhow::Result<()> {
        let Some(snapshot) = self.monitor.latest_snapshot() else {
            debug!("No snapshot captured yet; skipping optimization cycle");
            return Ok(());
        };

        let pending = self.state.lock().pending.take();
        if let Some(PendingEvaluation { decision, baseline }) = pending {
            if !Arc::ptr_eq(&baseline, &snapshot) {
                let observed = observed_impact(&baseline, &snapshot);
                self.learn(&decision, &observed);
            } else {
                self.state.lock().pending = Some(PendingEvaluation { decision, baseline });
            }
        }

        let load = load_score(&snapshot);
        let mut decision = self.make_decision(&snapshot);

        let should_apply = {
            let mut guard = self.state.lock();
            guard.load_trend.push(load);
            let triggered = match self.config.mode {
                AdaptationMode::Reactive => guard.last_applied_state != Some(decision.state),
                AdaptationMode::Predictive => rising_trend(&guard.load_trend),
                AdaptationMode::Proactive => true,
            };
            triggered && decision.confidence >= self.config.confidence_threshold
        };

        if should_apply && self.apply(&mut decision) {
            self.state.lock().pending = Some(PendingEvaluation {
                decision,
                baseline: snapshot,
            });
        }

        Ok(())
    }

    /// Persist learned patterns and strategy priorities.
    pub async fn save(&self) -> anyhow::Result<()> {
        let (patterns, priorities) = {
            let guard = self.state.lock();
            let mut patterns: Vec<LearnedPattern> = guard.patterns.values().cloned().collect();
            patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
            (patterns, guard.priorities.clone())
        };

        let count = patterns.len();
        self.store
            .put(PATTERNS_KEY, serde_json::to_vec(&patterns)?)
            .await
            .context("Failed to persist learned patterns")?;
        self.store
            .put(PRIORITIES_KEY, serde_json::to_vec(&priorities)?)
            .await
            .context("Failed to persist strategy priorities")?;

        info!(patterns = count, "Optimizer state saved");
        Ok(())
    }

    /// Restore learned patterns and strategy priorities. Missing or corrupt
    /// data leaves the current state untouched. Returns the pattern count.
    pub async fn load(&self) -> usize {
        let patterns = match self.store.get(PATTERNS_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<LearnedPattern>>(&bytes) {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    warn!("Ignoring corrupt learned patterns: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read learned patterns: {}", e);
                None
            }
        };

        let priorities = match self.store.get(PRIORITIES_KEY).await {
            Ok(Some(bytes)) => {
                match serde_json::from_slice::<BTreeMap<ContextState, BTreeMap<Strategy, f64>>>(&bytes) {
                    Ok(priorities) => Some(priorities),
                    Err(e) => {
                        warn!("Ignoring corrupt strategy priorities: {}", e);
                        None
                    }
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read strategy priorities: {}", e);
                None
            }
        };

        let mut guard = self.state.lock();
        if let Some(patterns) = patterns {
            guard.patterns = patterns
                .into_iter()
                .filter(|pattern| pattern.success_rate.is_finite())
                .map(|mut pattern| {
                    pattern.success_rate = pattern.success_rate.clamp(0.0, 1.0);
                    (pattern.signature.clone(), pattern)
                })
                .collect();
            while guard.patterns.len() > self.config.pattern_capacity {
                evict_least_recently_used(&mut guard.patterns);
            }
        }
        if let Some(priorities) = priorities {
            guard.priorities = priorities;
        }
        guard.stats.learned_patterns = guard.patterns.len();

        info!(patterns = guard.patterns.len(), "Optimizer state loaded");
        guard.patterns.len()
    }
}

/// Total rise across a full trend window.
fn rising_trend(trend: &BoundedHistory<f64>) -> bool {
    if trend.len() < TREND_WINDOW {
        return false;
    }
    match (trend.oldest(), trend.latest()) {
        (Some(first), Some(last)) => last - first > TREND_RISE,
        _ => false,
    }
}

fn evict_least_recently_used(patterns: &mut HashMap<String, LearnedPattern>) {
    let victim = patterns
        .values()
        .min_by(|a, b| {
            a.last_used
                .cmp(&b.last_used)
                .then_with(|| a.signature.cmp(&b.signature))
        })
        .map(|pattern| pattern.signature.clone());
    if let Some(signature) = victim {
        debug!(signature = %signature, "Evicting least recently used pattern");
        patterns.remove(&signature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::MonitorConfig;
    use crate::domain::optimization::Parameter;
    use crate::domain::telemetry::RawSystemMetrics;
    use crate::infrastructure::persistence::InMemoryPersistenceStore;
    use crate::infrastructure::telemetry::StaticTelemetryProvider;
    use crate::domain::snapshot::ResourceMetrics;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(cpu: f64, memory: f64) -> SystemSnapshot {
        let metrics = ResourceMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            ..Default::default()
        };
        SystemSnapshot::new(Utc::now(), metrics, vec![], 4)
    }

    fn raw(cpu: f64, memory: f64) -> RawSystemMetrics {
        RawSystemMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            ..Default::default()
        }
    }

    struct Fixture {
        optimizer: ContextOptimizer,
        monitor: Arc<EnvironmentMonitor>,
        provider: Arc<StaticTelemetryProvider>,
        registry: Arc<AdaptationRegistry>,
        store: Arc<InMemoryPersistenceStore>,
    }

    fn fixture(config: OptimizerConfig) -> Fixture {
        let bus = EventBus::new(64);
        let provider = Arc::new(StaticTelemetryProvider::new(raw(10.0, 20.0), vec![]));
        let monitor = Arc::new(EnvironmentMonitor::new(
            MonitorConfig::default(),
            provider.clone(),
            bus.clone(),
        ));
        let registry = Arc::new(AdaptationRegistry::new(10));
        let store = Arc::new(InMemoryPersistenceStore::new());
        let optimizer = ContextOptimizer::new(config, monitor.clone(), registry.clone(), store.clone(), bus);
        Fixture {
            optimizer,
            monitor,
            provider,
            registry,
            store,
        }
    }

    #[test]
    fn test_success_score_rules() {
        let expected = BTreeMap::from([("perf".to_string(), 0.5)]);
        let actual = BTreeMap::from([("perf".to_string(), 0.4)]);
        assert!((success_score(&expected, &actual) - 0.8).abs() < 1e-12);

        let zero = BTreeMap::from([("x".to_string(), 0.0)]);
        assert_eq!(success_score(&zero, &BTreeMap::from([("x".to_string(), 0.1)])), 1.0);
        assert_eq!(success_score(&zero, &BTreeMap::from([("x".to_string(), -0.1)])), 0.0);
        assert_eq!(success_score(&expected, &BTreeMap::from([("perf".to_string(), -0.2)])), 0.0);
        assert_eq!(success_score(&expected, &BTreeMap::from([("other".to_string(), 1.0)])), 0.5);
        assert_eq!(success_score(&expected, &BTreeMap::from([("perf".to_string(), 2.0)])), 1.0);
    }

    #[test]
    fn test_idle_and_critical_decisions() {
        let f = fixture(OptimizerConfig::default());

        let idle = f.optimizer.make_decision(&snapshot(10.0, 20.0));
        assert_eq!(idle.state, ContextState::Idle);
        assert_eq!(idle.strategy, Strategy::Conservative);
        assert!((idle.confidence - 0.7).abs() < 1e-12);

        let critical = f.optimizer.make_decision(&snapshot(85.0, 90.0));
        assert_eq!(critical.state, ContextState::Critical);
        assert_eq!(critical.strategy, Strategy::Aggressive);
        assert!((critical.confidence - 0.8).abs() < 1e-12);
        assert!(critical.confidence > idle.confidence);
        assert!(critical.reasoning.iter().any(|r| r.contains("CPU usage is high")));
        assert_eq!(f.optimizer.stats().decisions_made, 2);
    }

    #[test]
    fn test_parameters_always_within_bounds() {
        let mut config = OptimizerConfig::default();
        config.parameter_bounds.monitoring_frequency.min = 3.0;
        config.parameter_bounds.monitoring_frequency.max = 4.0;
        config.parameter_bounds.processing_intensity.max = 0.6;
        let bounds = config.parameter_bounds.clone();
        let f = fixture(config);

        for (cpu, memory) in [(0.0, 0.0), (30.0, 40.0), (60.0, 60.0), (99.0, 99.0)] {
            let parameters = f.optimizer.get_optimal_parameters(&snapshot(cpu, memory));
            assert!(parameters.within(&bounds));
            for parameter in Parameter::ALL {
                assert!(bounds.get(parameter).contains(parameters.get(parameter)));
            }
        }
    }

    #[test]
    fn test_learning_creates_and_smooths_pattern() {
        let f = fixture(OptimizerConfig {
            adaptive_learning_rate: false,
            ..OptimizerConfig::default()
        });
        let decision = f.optimizer.make_decision(&snapshot(10.0, 20.0));
        let good = decision.expected_impact.clone();

        assert_eq!(f.optimizer.learn(&decision, &good), 1.0);
        let pattern = &f.optimizer.patterns()[0];
        assert_eq!(pattern.signature, "state:idle");
        assert_eq!(pattern.success_rate, 1.0);

        let bad: BTreeMap<String, f64> = good.keys().map(|k| (k.clone(), -1.0)).collect();
        assert_eq!(f.optimizer.learn(&decision, &bad), 0.0);
        let pattern = &f.optimizer.patterns()[0];
        assert!((pattern.success_rate - 0.9).abs() < 1e-12);
        assert_eq!(pattern.usage_frequency, 2);

        let ranked = f.optimizer.ranked_strategies(ContextState::Idle);
        assert_eq!(ranked[0].0, Strategy::Efficiency);
        assert_eq!(ranked.last().map(|r| r.0), Some(Strategy::Conservative));
    }

    #[test]
    fn test_learned_pattern_supplies_parameters_and_confidence() {
        let f = fixture(OptimizerConfig::default());
        let mut decision = f.optimizer.make_decision(&snapshot(10.0, 20.0));
        decision.parameters.cache_size_multiplier = 1.5;
        f.optimizer.learn(&decision, &decision.expected_impact.clone());

        let next = f.optimizer.make_decision(&snapshot(11.0, 19.0));
        assert_eq!(next.parameters.cache_size_multiplier, 1.5);
        assert!((next.confidence - 0.9).abs() < 1e-12);

        // Light is adjacent to idle (0.7 similarity).
        let light = f.optimizer.get_optimal_parameters(&snapshot(30.0, 30.0));
        assert_eq!(light.cache_size_multiplier, 1.5);
    }

    #[test]
    fn test_apply_requires_callback() {
        let f = fixture(OptimizerConfig::default());
        let mut decision = f.optimizer.make_decision(&snapshot(10.0, 20.0));
        assert!(!f.optimizer.apply(&mut decision));
        assert!(!decision.applied);

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        f.registry.register(AdaptationKind::ParameterTuning, move |adaptation| {
            assert!(matches!(adaptation.payload, AdaptationPayload::Parameters { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        assert!(f.optimizer.apply(&mut decision));
        assert!(decision.applied);
        assert_eq!(received.load(Ordering::SeqCst), 1);

        let stats = f.optimizer.stats();
        assert_eq!(stats.decisions_applied, 1);
        assert_eq!(stats.failed_applications, 1);
        assert_eq!(stats.current_strategy, Some(Strategy::Conservative));
    }

    #[test]
    fn test_learning_rate_self_tuning() {
        let f = fixture(OptimizerConfig::default());
        let decision = f.optimizer.make_decision(&snapshot(10.0, 20.0));
        let good = decision.expected_impact.clone();
        for _ in 0..20 {
            f.optimizer.learn(&decision, &good);
        }
        assert!((f.optimizer.learning_rate() - MAX_LEARNING_RATE).abs() < 1e-12);

        let bad: BTreeMap<String, f64> = good.keys().map(|k| (k.clone(), -1.0)).collect();
        for _ in 0..60 {
            f.optimizer.learn(&decision, &bad);
        }
        assert!((f.optimizer.learning_rate() - MIN_LEARNING_RATE).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_reactive_cycle_applies_on_state_change_only() {
        let f = fixture(OptimizerConfig::default());
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = applied.clone();
        f.registry.register(AdaptationKind::ParameterTuning, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        f.optimizer.run_cycle().await.unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 0);

        f.monitor.capture().await;
        f.optimizer.run_cycle().await.unwrap();
        f.monitor.capture().await;
        f.optimizer.run_cycle().await.unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 1);

        f.provider.set_metrics(raw(85.0, 90.0));
        f.monitor.capture().await;
        f.optimizer.run_cycle().await.unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 2);
        assert!(f.optimizer.stats().outcomes_learned >= 1);
    }

    #[tokio::test]
    async fn test_predictive_mode_waits_for_rising_trend() {
        let f = fixture(OptimizerConfig {
            mode: AdaptationMode::Predictive,
            confidence_threshold: 0.0,
            ..OptimizerConfig::default()
        });
        f.registry.register(AdaptationKind::ParameterTuning, |_| Ok(true));

        for cpu in [10.0, 10.0, 10.0, 10.0, 10.0] {
            f.provider.set_metrics(raw(cpu, 20.0));
            f.monitor.capture().await;
            f.optimizer.run_cycle().await.unwrap();
        }
        assert_eq!(f.optimizer.stats().decisions_applied, 0);

        for cpu in [20.0, 30.0, 40.0, 50.0, 60.0] {
            f.provider.set_metrics(raw(cpu, 20.0));
            f.monitor.capture().await;
            f.optimizer.run_cycle().await.unwrap();
        }
        assert!(f.optimizer.stats().decisions_applied > 0);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let f = fixture(OptimizerConfig::default());
        for (cpu, memory) in [(10.0, 20.0), (50.0, 50.0), (85.0, 90.0)] {
            let decision = f.optimizer.make_decision(&snapshot(cpu, memory));
            f.optimizer.learn(&decision, &decision.expected_impact.clone());
        }
        f.optimizer.save().await.unwrap();

        let restored = ContextOptimizer::new(
            OptimizerConfig::default(),
            f.monitor.clone(),
            f.registry.clone(),
            f.store.clone(),
            EventBus::new(8),
        );
        assert_eq!(restored.load().await, 3);

        let original = f.optimizer.patterns();
        let loaded = restored.patterns();
        assert_eq!(original.len(), loaded.len());
        for (a, b) in original.iter().zip(&loaded) {
            assert_eq!(a.signature, b.signature);
            assert!((a.success_rate - b.success_rate).abs() < 1e-9);
        }
        let before = f.optimizer.ranked_strategies(ContextState::Critical);
        let after = restored.ranked_strategies(ContextState::Critical);
        for ((s1, p1), (s2, p2)) in before.iter().zip(&after) {
            assert_eq!(s1, s2);
            assert!((p1 - p2).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_load_tolerates_corrupt_data() {
        let f = fixture(OptimizerConfig::default());
        f.store.put(PATTERNS_KEY, b"not json".to_vec()).await.unwrap();
        assert_eq!(f.optimizer.load().await, 0);
    }

    #[test]
    fn test_pattern_capacity_evicts_least_recently_used() {
        let f = fixture(OptimizerConfig {
            pattern_capacity: 2,
            ..OptimizerConfig::default()
        });
        for (cpu, memory) in [(10.0, 20.0), (50.0, 50.0), (85.0, 90.0)] {
            let decision = f.optimizer.make_decision(&snapshot(cpu, memory));
            f.optimizer.learn(&decision, &decision.expected_impact.clone());
        }
        let signatures: Vec<String> = f.optimizer.patterns().into_iter().map(|p| p.signature).collect();
        assert_eq!(signatures.len(), 2);
        assert!(!signatures.contains(&"state:idle".to_string()));
    }
}
