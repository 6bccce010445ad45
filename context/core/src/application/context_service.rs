// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context Awareness Service
//!
//! Facade the rest of the agent talks to. Owns the environment monitor,
//! optimizer, decision engine, history tracker and the adaptation registry,
//! and wires them together:
//!
//! - `optimization` decisions are executed by switching strategy through the
//!   registry (a `strategy_switch` adaptation).
//! - While running, detected environment changes are turned into suggested
//!   adaptations and dispatched.
//! - `stop()` persists history and learned optimizer state.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Composition root and public interface of the context core

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adaptation_registry::{AdaptationRegistry, AdaptationStats};
use super::context_optimizer::{ContextOptimizer, OptimizerStats};
use super::decision_engine::{
    AdaptiveDecisionEngine, DecisionInsights, FeedbackOutcome, OPTIMIZATION_DECISION,
};
use super::environment_monitor::{EnvironmentMonitor, MonitorStats};
use super::history_tracker::{ContextHistoryTracker, HistoryStats};
use crate::domain::adaptation::{Adaptation, AdaptationKind, AdaptationOutcome, AdaptationPayload};
use crate::domain::change::{ChangeType, EnvironmentChange, Severity};
use crate::domain::config::{ConfigError, ContextConfig};
use crate::domain::decision::{ContextualDecision, DecisionId};
use crate::domain::events::ContextEvent;
use crate::domain::persistence::{PersistenceError, PersistenceStore};
use crate::domain::snapshot::{ContextSnapshot, HealthAssessment};
use crate::domain::telemetry::TelemetryProvider;
use crate::infrastructure::event_bus::{EventBus, EventReceiver};
use crate::infrastructure::persistence::LocalDirectoryStore;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence unavailable: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Failed to save learned state: {0:#}")]
    Save(anyhow::Error),
}

/// Read-only statistics across all components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInsights {
    pub generated_at: DateTime<Utc>,
    pub health: Option<HealthAssessment>,
    pub monitor: MonitorStats,
    pub optimizer: OptimizerStats,
    pub decisions: DecisionInsights,
    pub history: HistoryStats,
    pub adaptations: AdaptationStats,
}

/// Change-to-adaptation mapping with a per-kind cooldown, plus dispatch.
struct AdaptationPlanner {
    registry: Arc<AdaptationRegistry>,
    event_bus: EventBus,
    cooldown: std::time::Duration,
    last_applied: Mutex<HashMap<AdaptationKind, Instant>>,
}

impl AdaptationPlanner {
    fn suggest(&self, change: &EnvironmentChange) -> Option<Adaptation> {
        if change.severity == Severity::Low {
            return None;
        }
        let kind = match change.change_type {
            ChangeType::Resource if change.severity >= Severity::High => AdaptationKind::ResourceRelief,
            ChangeType::Resource => AdaptationKind::MonitoringBoost,
            ChangeType::Application => AdaptationKind::FocusShift,
            ChangeType::Relationship => AdaptationKind::RelationshipUpdate,
        };

        if let Some(previous) = self.last_applied.lock().get(&kind) {
            if Instant::now().saturating_duration_since(*previous) < self.cooldown {
                debug!(%kind, "Adaptation suggestion suppressed by cooldown");
                return None;
            }
        }

        Some(Adaptation::new(
            kind,
            format!("{} after: {}", kind, change.description),
            AdaptationPayload::Change {
                change_id: change.id,
                subject: change.subject.clone(),
                severity: change.severity,
            },
            change.significance,
        ))
    }

    /// Dispatch, starting the kind's cooldown only once a handler accepted it.
    fn apply(&self, adaptation: &Adaptation) -> AdaptationOutcome {
        let outcome = dispatch_and_publish(&self.registry, &self.event_bus, adaptation);
        if outcome.is_applied() {
            self.last_applied.lock().insert(adaptation.kind, Instant::now());
        }
        outcome
    }
}

fn dispatch_and_publish(
    registry: &AdaptationRegistry,
    event_bus: &EventBus,
    adaptation: &Adaptation,
) -> AdaptationOutcome {
    let outcome = registry.dispatch(adaptation);
    if outcome.is_applied() {
        info!(kind = %adaptation.kind, adaptation_id = ?adaptation.id, "Adaptation applied");
    } else {
        debug!(kind = %adaptation.kind, outcome = ?outcome, "Adaptation not applied");
    }
    event_bus.publish(ContextEvent::AdaptationDispatched {
        kind: adaptation.kind,
        outcome: outcome.clone(),
        dispatched_at: Utc::now(),
    });
    outcome
}

struct ChangeListener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ContextAwarenessService {
    config: ContextConfig,
    event_bus: EventBus,
    monitor: Arc<EnvironmentMonitor>,
    optimizer: Arc<ContextOptimizer>,
    engine: Arc<AdaptiveDecisionEngine>,
    history: Arc<ContextHistoryTracker>,
    registry: Arc<AdaptationRegistry>,
    planner: Arc<AdaptationPlanner>,
    listener: Mutex<Option<ChangeListener>>,
}

impl ContextAwarenessService {
    /// Validate the configuration and assemble all components. An invalid
    /// configuration is the only construction failure.
    pub fn new(
        config: ContextConfig,
        telemetry: Arc<dyn TelemetryProvider>,
        store: Arc<dyn PersistenceStore>,
    ) -> Result<Self, ContextError> {
        config.validate()?;

        let event_bus = EventBus::new(config.lifecycle.event_bus_capacity);
        let registry = Arc::new(AdaptationRegistry::new(config.adaptation.max_per_minute));

        let monitor = Arc::new(EnvironmentMonitor::new(
            config.monitor.clone(),
            telemetry,
            event_bus.clone(),
        ));
        let optimizer = Arc::new(ContextOptimizer::new(
            config.optimizer.clone(),
            monitor.clone(),
            registry.clone(),
            store.clone(),
            event_bus.clone(),
        ));
        let engine = AdaptiveDecisionEngine::new(config.decision.clone(), monitor.clone(), event_bus.clone())
            .with_optimizer(optimizer.clone());
        let history = Arc::new(ContextHistoryTracker::new(
            config.history.clone(),
            monitor.clone(),
            store,
            event_bus.clone(),
        ));

        let executor_registry = registry.clone();
        let executor_bus = event_bus.clone();
        engine.register_executor(
            OPTIMIZATION_DECISION,
            move |decision: &ContextualDecision| -> anyhow::Result<bool> {
                let Some(strategy) = decision
                    .selected_alternative()
                    .and_then(|selected| selected.alternative.strategy)
                else {
                    return Ok(false);
                };
                let adaptation = Adaptation::new(
                    AdaptationKind::StrategySwitch,
                    format!("Switch to the {} strategy", strategy),
                    AdaptationPayload::Strategy { strategy },
                    decision.confidence,
                );
                Ok(dispatch_and_publish(&executor_registry, &executor_bus, &adaptation).is_applied())
            },
        );

        let planner = Arc::new(AdaptationPlanner {
            registry: registry.clone(),
            event_bus: event_bus.clone(),
            cooldown: config.adaptation.suggestion_cooldown,
            last_applied: Mutex::new(HashMap::new()),
        });

        Ok(Self {
            config,
            event_bus,
            monitor,
            optimizer,
            engine: Arc::new(engine),
            history,
            registry,
            planner,
            listener: Mutex::new(None),
        })
    }

    /// Build the service with learned state kept under `directory`.
    pub fn with_local_store(
        config: ContextConfig,
        telemetry: Arc<dyn TelemetryProvider>,
        directory: impl Into<PathBuf>,
    ) -> Result<Self, ContextError> {
        let store = LocalDirectoryStore::new(directory)?;
        Self::new(config, telemetry, Arc::new(store))
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn events(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn monitor(&self) -> &Arc<EnvironmentMonitor> {
        &self.monitor
    }

    pub fn optimizer(&self) -> &Arc<ContextOptimizer> {
        &self.optimizer
    }

    pub fn decision_engine(&self) -> &Arc<AdaptiveDecisionEngine> {
        &self.engine
    }

    pub fn history(&self) -> &Arc<ContextHistoryTracker> {
        &self.history
    }

    /// Restore learned state, then start the monitor, optimizer and history
    /// loops and, with `auto_adapt`, the change listener.
    pub async fn start(&self) {
        let samples = self.history.load().await;
        let patterns = self.optimizer.load().await;
        info!(samples, patterns, "Starting context awareness service");

        self.monitor.start();
        self.optimizer.start();
        self.history.start();
        if self.config.adaptation.auto_adapt {
            self.start_change_listener();
        }
    }

    fn start_change_listener(&self) {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let mut changes = self.event_bus.subscribe_changes();
        let planner = Arc::clone(&self.planner);

        let handle = tokio::spawn(async move {
            debug!("Change listener started");
            loop {
                tokio::select! {
                    received = changes.recv() => match received {
                        Ok(change) => {
                            if let Some(adaptation) = planner.suggest(&change) {
                                planner.apply(&adaptation);
                            }
                        }
                        Err(e) => {
                            info!("Change listener stopping: {}", e);
                            break;
                        }
                    },
                    _ = child.cancelled() => break,
                }
            }
            debug!("Change listener stopped");
        });

        *listener = Some(ChangeListener { token, handle });
    }

    /// Stop all loops with the configured join timeout, then persist history
    /// and optimizer state. Returns false if a loop had to be aborted or
    /// saving failed.
    pub async fn stop(&self) -> bool {
        let timeout = self.config.lifecycle.shutdown_timeout;
        let mut clean = true;

        let listener = self.listener.lock().take();
        if let Some(ChangeListener { token, mut handle }) = listener {
            token.cancel();
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("Change listener did not stop in time; aborting");
                handle.abort();
                clean = false;
            }
        }

        clean &= self.monitor.stop(timeout).await;
        clean &= self.optimizer.stop(timeout).await;
        clean &= self.history.stop(timeout).await;
        clean &= self.engine.stop(timeout).await;

        if let Err(e) = self.save().await {
            warn!("{}", e);
            clean = false;
        }
        info!(clean, "Context awareness service stopped");
        clean
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running() || self.optimizer.is_running() || self.history.is_running()
    }

    pub async fn save(&self) -> Result<(), ContextError> {
        self.history.save().await.map_err(ContextError::Save)?;
        self.optimizer.save().await.map_err(ContextError::Save)?;
        Ok(())
    }

    /// Latest environment view; `None` until the first capture.
    pub fn get_current_environment(&self) -> Option<ContextSnapshot> {
        self.monitor.get_current_environment()
    }

    pub fn make_decision(&self, decision_type: &str, context: Option<ContextSnapshot>) -> ContextualDecision {
        self.engine.decide(decision_type, context)
    }

    pub fn apply(&self, decision: &ContextualDecision) -> bool {
        self.engine.execute(decision)
    }

    pub fn provide_feedback(
        &self,
        decision_id: DecisionId,
        score: f64,
        outcomes: BTreeMap<String, f64>,
    ) -> FeedbackOutcome {
        self.engine.feedback(decision_id, score, outcomes)
    }

    pub fn register_adaptation_callback<F>(&self, kind: AdaptationKind, callback: F)
    where
        F: Fn(&Adaptation) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.registry.register(kind, callback);
    }

    /// Adaptation for a detected change, if one is warranted. Low-severity
    /// changes and repeats of a kind within the cooldown yield nothing.
    pub fn suggest_adaptation(&self, change: &EnvironmentChange) -> Option<Adaptation> {
        self.planner.suggest(change)
    }

    pub fn apply_adaptation(&self, adaptation: &Adaptation) -> AdaptationOutcome {
        self.planner.apply(adaptation)
    }

    pub fn get_insights(&self) -> ContextInsights {
        ContextInsights {
            generated_at: Utc::now(),
            health: self.monitor.health_assessment(),
            monitor: self.monitor.stats(),
            optimizer: self.optimizer.stats(),
            decisions: self.engine.insights(),
            history: self.history.stats(),
            adaptations: self.registry.stats(),
        }
    }

    /// Drive one foreground cycle without the background loops: capture,
    /// adapt to the changes it produced, run the optimizer and history
    /// cycles, then decide and (when confident) execute an `optimization`
    /// decision.
    pub async fn run_once(&self) -> anyhow::Result<ContextualDecision> {
        let before = self.monitor.stats().changes_recorded;
        self.monitor.capture().await;
        let fresh = self.monitor.stats().changes_recorded.saturating_sub(before) as usize;

        if self.config.adaptation.auto_adapt && fresh > 0 {
            for change in self.monitor.recent_changes(fresh) {
                if let Some(adaptation) = self.planner.suggest(&change) {
                    self.planner.apply(&adaptation);
                }
            }
        }

        self.optimizer.run_cycle().await?;
        self.history.run_cycle().await?;

        let decision = self.engine.decide(OPTIMIZATION_DECISION, None);
        if decision.confidence >= self.config.decision.confidence_threshold && !decision.is_no_action() {
            self.engine.execute(&decision);
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::RawSystemMetrics;
    use crate::infrastructure::persistence::InMemoryPersistenceStore;
    use crate::infrastructure::telemetry::StaticTelemetryProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn idle() -> RawSystemMetrics {
        RawSystemMetrics {
            cpu_percent: Some(10.0),
            memory_percent: Some(20.0),
            disk_percent: Some(30.0),
            cpu_cores: Some(4),
            ..Default::default()
        }
    }

    fn service(config: ContextConfig) -> (ContextAwarenessService, Arc<InMemoryPersistenceStore>) {
        let telemetry = Arc::new(StaticTelemetryProvider::new(idle(), vec![]));
        let store = Arc::new(InMemoryPersistenceStore::new());
        let service = ContextAwarenessService::new(config, telemetry, store.clone()).unwrap();
        (service, store)
    }

    fn change(change_type: ChangeType, significance: f64) -> EnvironmentChange {
        EnvironmentChange::new(
            change_type,
            "cpu_percent",
            "cpu jumped",
            None,
            None,
            significance,
            Utc::now(),
        )
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ContextConfig::default();
        config.adaptation.max_per_minute = 0;
        let result = ContextAwarenessService::new(
            config,
            Arc::new(StaticTelemetryProvider::default()),
            Arc::new(InMemoryPersistenceStore::new()),
        );
        assert!(matches!(result, Err(ContextError::Config(_))));
    }

    #[tokio::test]
    async fn test_decision_applied_through_strategy_switch() {
        let (service, _) = service(ContextConfig::default());
        assert!(service.get_current_environment().is_none());
        service.monitor().capture().await;
        assert!(service.get_current_environment().is_some());

        let decision = service.make_decision(OPTIMIZATION_DECISION, None);
        assert!(!decision.is_no_action());
        // No strategy_switch handler yet.
        assert!(!service.apply(&decision));

        let switches = Arc::new(AtomicUsize::new(0));
        let counter = switches.clone();
        service.register_adaptation_callback(AdaptationKind::StrategySwitch, move |adaptation| {
            assert!(matches!(adaptation.payload, AdaptationPayload::Strategy { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        assert!(service.apply(&decision));
        assert_eq!(switches.load(Ordering::SeqCst), 1);

        assert_eq!(
            service.provide_feedback(decision.id, 0.9, BTreeMap::new()),
            FeedbackOutcome::Recorded { weights_adapted: true }
        );
        let insights = service.get_insights();
        assert_eq!(insights.decisions.stats.feedback_received, 1);
        assert_eq!(insights.adaptations.applied, 1);
        assert_eq!(insights.adaptations.no_handler, 1);
    }

    #[test]
    fn test_suggestions_follow_change_kind_and_cooldown() {
        let (service, _) = service(ContextConfig::default());

        assert!(service.suggest_adaptation(&change(ChangeType::Resource, 0.1)).is_none());

        service.register_adaptation_callback(AdaptationKind::ResourceRelief, |_| Ok(true));
        let relief = service.suggest_adaptation(&change(ChangeType::Resource, 0.9)).unwrap();
        assert_eq!(relief.kind, AdaptationKind::ResourceRelief);
        assert!(service.apply_adaptation(&relief).is_applied());
        assert!(service.suggest_adaptation(&change(ChangeType::Resource, 0.95)).is_none());

        let boost = service.suggest_adaptation(&change(ChangeType::Resource, 0.4)).unwrap();
        assert_eq!(boost.kind, AdaptationKind::MonitoringBoost);
        let focus = service.suggest_adaptation(&change(ChangeType::Application, 0.5)).unwrap();
        assert_eq!(focus.kind, AdaptationKind::FocusShift);
        let relation = service.suggest_adaptation(&change(ChangeType::Relationship, 0.5)).unwrap();
        assert_eq!(relation.kind, AdaptationKind::RelationshipUpdate);
    }

    #[test]
    fn test_cooldown_starts_only_after_applied_dispatch() {
        let mut config = ContextConfig::default();
        config.adaptation.max_per_minute = 1;
        let (service, _) = service(config);
        let spike = change(ChangeType::Application, 0.5);

        // No handler: the kind stays eligible.
        let focus = service.suggest_adaptation(&spike).unwrap();
        assert_eq!(service.apply_adaptation(&focus), AdaptationOutcome::NoHandler);
        let focus = service.suggest_adaptation(&spike).unwrap();

        service.register_adaptation_callback(AdaptationKind::FocusShift, |_| Ok(false));
        assert!(matches!(
            service.apply_adaptation(&focus),
            AdaptationOutcome::Rejected { .. }
        ));
        let focus = service.suggest_adaptation(&spike).unwrap();

        // The rejected attempt used up the single slot for this minute.
        assert_eq!(service.apply_adaptation(&focus), AdaptationOutcome::RateLimited);
        assert!(service.suggest_adaptation(&spike).is_some());
    }

    #[test]
    fn test_apply_adaptation_is_rate_limited() {
        let mut config = ContextConfig::default();
        config.adaptation.max_per_minute = 2;
        let (service, _) = service(config);
        let mut events = service.events();

        let adaptation = Adaptation::new(
            AdaptationKind::MonitoringBoost,
            "boost",
            AdaptationPayload::Change {
                change_id: change(ChangeType::Resource, 0.4).id,
                subject: "cpu_percent".to_string(),
                severity: Severity::Medium,
            },
            0.4,
        );
        assert_eq!(service.apply_adaptation(&adaptation), AdaptationOutcome::NoHandler);

        service.register_adaptation_callback(AdaptationKind::MonitoringBoost, |_| Ok(true));
        assert!(service.apply_adaptation(&adaptation).is_applied());
        assert!(service.apply_adaptation(&adaptation).is_applied());
        assert_eq!(service.apply_adaptation(&adaptation), AdaptationOutcome::RateLimited);

        let mut dispatched = 0;
        while let Ok(event) = events.try_recv() {
            if let ContextEvent::AdaptationDispatched { .. } = event {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 4);
    }

    #[tokio::test]
    async fn test_listener_adapts_to_published_changes_and_stop_saves() {
        let (service, store) = service(ContextConfig::default());
        let reliefs = Arc::new(AtomicUsize::new(0));
        let counter = reliefs.clone();
        service.register_adaptation_callback(AdaptationKind::ResourceRelief, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });

        service.start().await;
        assert!(service.is_running());

        service.event_bus().publish(ContextEvent::ChangeDetected {
            change: change(ChangeType::Resource, 0.9),
        });
        for _ in 0..100 {
            if reliefs.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reliefs.load(Ordering::SeqCst), 1);

        assert!(service.stop().await);
        assert!(!service.is_running());
        assert!(store
            .get(crate::application::history_tracker::SAMPLES_KEY)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get(crate::application::context_optimizer::PATTERNS_KEY)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_run_once_produces_decision() {
        let (service, _) = service(ContextConfig::default());
        let decision = service.run_once().await.unwrap();
        assert_eq!(decision.decision_type, OPTIMIZATION_DECISION);
        assert!(!decision.is_no_action());
        assert_eq!(service.get_insights().monitor.captures, 1);
        assert_eq!(service.history().sample_count(), 1);
    }
}
