// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Learned state survives a save/load cycle through both store backends.

use aegis_context::application::context_optimizer::PATTERNS_KEY;
use aegis_context::application::estimators::PERFORMANCE_IMPROVEMENT;
use aegis_context::application::{
    AdaptationRegistry, ContextAwarenessService, ContextHistoryTracker, ContextOptimizer,
    EnvironmentMonitor,
};
use aegis_context::domain::config::{HistoryConfig, MonitorConfig, OptimizerConfig};
use aegis_context::infrastructure::{
    EventBus, InMemoryPersistenceStore, LocalDirectoryStore, StaticTelemetryProvider,
};
use aegis_context::{
    ContextConfig, ContextState, HealthStatus, HistorySample, MinedPattern, PatternFrequency,
    PatternTrigger, PersistenceStore, RawSystemMetrics, ResourceMetrics, SystemSnapshot,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn monitor() -> Arc<EnvironmentMonitor> {
    Arc::new(EnvironmentMonitor::new(
        MonitorConfig::default(),
        Arc::new(StaticTelemetryProvider::default()),
        EventBus::new(64),
    ))
}

fn optimizer(store: Arc<dyn PersistenceStore>) -> ContextOptimizer {
    ContextOptimizer::new(
        OptimizerConfig::default(),
        monitor(),
        Arc::new(AdaptationRegistry::new(10)),
        store,
        EventBus::new(64),
    )
}

fn snapshot(cpu: f64, memory: f64) -> SystemSnapshot {
    let metrics = ResourceMetrics {
        cpu_percent: Some(cpu),
        memory_percent: Some(memory),
        ..Default::default()
    };
    SystemSnapshot::new(Utc::now(), metrics, vec![], 4)
}

async fn assert_optimizer_round_trip(store: Arc<dyn PersistenceStore>) {
    let original = optimizer(store.clone());
    for (cpu, memory, gain) in [(10.0, 20.0, 0.3), (85.0, 90.0, 0.5), (85.0, 90.0, 0.1)] {
        let decision = original.make_decision(&snapshot(cpu, memory));
        let outcome = BTreeMap::from([(PERFORMANCE_IMPROVEMENT.to_string(), gain)]);
        original.learn(&decision, &outcome);
    }
    original.save().await.expect("save optimizer state");

    let restored = optimizer(store);
    assert_eq!(restored.load().await, 2);

    let summary = |o: &ContextOptimizer| {
        let mut patterns: Vec<_> = o
            .patterns()
            .into_iter()
            .map(|p| (p.signature, p.usage_frequency, p.success_rate))
            .collect();
        patterns.sort_by(|a, b| a.0.cmp(&b.0));
        patterns
    };
    let before = summary(&original);
    let after = summary(&restored);
    assert_eq!(before.len(), after.len());
    for ((sig1, uses1, rate1), (sig2, uses2, rate2)) in before.iter().zip(after.iter()) {
        assert_eq!(sig1, sig2);
        assert_eq!(uses1, uses2);
        assert!((rate1 - rate2).abs() < 1e-9);
    }

    for state in [ContextState::Idle, ContextState::Critical] {
        let before = original.ranked_strategies(state);
        let after = restored.ranked_strategies(state);
        assert_eq!(before.len(), after.len());
        for ((s1, p1), (s2, p2)) in before.iter().zip(after.iter()) {
            assert_eq!(s1, s2);
            assert!((p1 - p2).abs() < 1e-9);
        }
    }
}

#[tokio::test]
async fn test_optimizer_round_trip_in_memory() {
    assert_optimizer_round_trip(Arc::new(InMemoryPersistenceStore::new())).await;
}

#[tokio::test]
async fn test_optimizer_round_trip_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LocalDirectoryStore::new(dir.path()).unwrap());
    assert_optimizer_round_trip(store).await;
    assert!(dir.path().join(format!("{}.json", PATTERNS_KEY)).exists());
}

#[tokio::test]
async fn test_history_round_trip_on_disk() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn PersistenceStore> = Arc::new(LocalDirectoryStore::new(dir.path()).unwrap());
    let tracker = |store: Arc<dyn PersistenceStore>| {
        ContextHistoryTracker::new(HistoryConfig::default(), monitor(), store, EventBus::new(64))
    };

    let original = tracker(store.clone());
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    for i in 0..25 {
        original.record_sample(HistorySample {
            timestamp: start + ChronoDuration::minutes(i),
            cpu_percent: 40.0 + i as f64,
            memory_percent: 50.0,
            disk_percent: 60.0,
            network_bytes: Some(1024 * i as u64),
            active_apps: vec!["editor".to_string()],
            activity_level: 0.5,
            health: HealthStatus::Good,
        });
    }
    original.insert_pattern(MinedPattern::new(
        PatternTrigger::PeakHour { hour: 9 },
        "activity peak at 09:00",
        PatternFrequency::Frequent,
        0.9,
        start,
    ));
    original.save().await.expect("save history");

    let restored = tracker(store);
    assert_eq!(restored.load().await, 25);
    assert_eq!(restored.sample_count(), 25);
    assert_eq!(
        restored.recent_samples(1)[0].timestamp,
        start + ChronoDuration::minutes(24)
    );
    let ids: Vec<String> = restored.patterns().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![PatternTrigger::PeakHour { hour: 9 }.pattern_id()]);
}

#[tokio::test]
async fn test_service_restores_state_on_start() {
    let dir = TempDir::new().unwrap();
    let telemetry = || {
        Arc::new(StaticTelemetryProvider::new(
            RawSystemMetrics {
                cpu_percent: Some(20.0),
                memory_percent: Some(30.0),
                ..Default::default()
            },
            vec![],
        ))
    };

    let first =
        ContextAwarenessService::with_local_store(ContextConfig::default(), telemetry(), dir.path())
            .unwrap();
    first.run_once().await.unwrap();
    first.run_once().await.unwrap();
    let recorded = first.history().sample_count();
    assert!(recorded >= 2);
    first.save().await.unwrap();

    let second =
        ContextAwarenessService::with_local_store(ContextConfig::default(), telemetry(), dir.path())
            .unwrap();
    assert_eq!(second.history().sample_count(), 0);
    second.start().await;
    assert!(second.history().sample_count() >= recorded);
    assert!(second.stop().await);
}
