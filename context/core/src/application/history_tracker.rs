// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Context History Tracker
//!
//! Keeps a rolling buffer of compact [`HistorySample`]s, mines recurring
//! patterns from it and issues predictions that are later scored against
//! what was actually recorded.
//!
//! Miners:
//!
//! - **temporal**: hours with at least 5 samples whose average activity
//!   exceeds 0.7
//! - **usage**: application pairs seen together in at least 10% of samples
//! - **resource**: cpu above 70% in at least 20% of samples
//!
//! Candidates below `confidence_floor` are dropped. Accepted candidates are
//! inserted, or merged into the existing pattern with the same id.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pattern mining, prediction and accuracy tracking

use anyhow::Context;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::environment_monitor::EnvironmentMonitor;
use super::periodic::LoopHandle;
use crate::domain::bounded::BoundedHistory;
use crate::domain::config::HistoryConfig;
use crate::domain::events::ContextEvent;
use crate::domain::history::{
    HistorySample, MinedPattern, PatternFrequency, PatternKind, PatternTrigger, Prediction,
    PredictionId, PredictionOutcome,
};
use crate::domain::persistence::PersistenceStore;
use crate::domain::snapshot::ContextSnapshot;
use crate::infrastructure::event_bus::EventBus;

pub const SAMPLES_KEY: &str = "context_history.samples";
pub const PATTERNS_KEY: &str = "context_history.patterns";

const MAX_PATTERN_CONFIDENCE: f64 = 0.9;

const PEAK_MIN_SAMPLES: usize = 5;
const PEAK_ACTIVITY: f64 = 0.7;
const USAGE_SUPPORT: f64 = 0.1;
const HIGH_CPU: f64 = 70.0;
const HIGH_CPU_FRACTION: f64 = 0.2;

const TEMPORAL_DISCOUNT: f64 = 0.8;
const USAGE_DISCOUNT: f64 = 0.7;
const RESOURCE_DISCOUNT: f64 = 0.6;
const RESOURCE_LOOKBACK: usize = 10;

/// Average activity around a temporal target that counts as a hit
const TEMPORAL_HIT_ACTIVITY: f64 = 0.6;

fn span(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Distance between two hours of the day, wrapping at midnight.
fn hour_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b) % 24;
    d.min(24 - d)
}

pub fn mine_temporal(samples: &[&HistorySample], now: DateTime<Utc>) -> Vec<MinedPattern> {
    let mut by_hour: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        by_hour.entry(sample.hour()).or_default().push(sample.activity_level);
    }

    by_hour
        .into_iter()
        .filter(|(_, levels)| levels.len() >= PEAK_MIN_SAMPLES)
        .filter_map(|(hour, levels)| {
            let average = levels.iter().sum::<f64>() / levels.len() as f64;
            (average > PEAK_ACTIVITY).then(|| {
                MinedPattern::new(
                    PatternTrigger::PeakHour { hour },
                    format!("High activity typically occurs at {:02}:00", hour),
                    PatternFrequency::from_ratio(levels.len() as f64 / samples.len() as f64),
                    average.min(MAX_PATTERN_CONFIDENCE),
                    now,
                )
            })
        })
        .collect()
}

pub fn mine_usage(samples: &[&HistorySample], now: DateTime<Utc>) -> Vec<MinedPattern> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut pairs: BTreeMap<(String, String), usize> = BTreeMap::new();
    for sample in samples {
        let mut apps: Vec<&String> = sample.active_apps.iter().collect();
        apps.sort();
        apps.dedup();
        for (i, first) in apps.iter().enumerate() {
            for second in &apps[i + 1..] {
                *pairs.entry(((*first).clone(), (*second).clone())).or_insert(0) += 1;
            }
        }
    }

    let total = samples.len() as f64;
    pairs
        .into_iter()
        .filter_map(|((first, second), count)| {
            let support = count as f64 / total;
            (support >= USAGE_SUPPORT).then(|| {
                MinedPattern::new(
                    PatternTrigger::CoOccurrence {
                        apps: [first.clone(), second.clone()],
                    },
                    format!("{} and {} are frequently used together", first, second),
                    PatternFrequency::from_ratio(support),
                    (2.0 * support).min(MAX_PATTERN_CONFIDENCE),
                    now,
                )
            })
        })
        .collect()
}

pub fn mine_resource(samples: &[&HistorySample], now: DateTime<Utc>) -> Vec<MinedPattern> {
    if samples.is_empty() {
        return Vec::new();
    }
    let high = samples.iter().filter(|s| s.cpu_percent > HIGH_CPU).count();
    let fraction = high as f64 / samples.len() as f64;
    if fraction < HIGH_CPU_FRACTION {
        return Vec::new();
    }
    vec![MinedPattern::new(
        PatternTrigger::HighLoad {
            cpu_threshold: HIGH_CPU,
        },
        "System frequently experiences high CPU usage",
        PatternFrequency::from_ratio(fraction),
        (2.0 * fraction).min(MAX_PATTERN_CONFIDENCE),
        now,
    )]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub samples_recorded: u64,
    pub buffered_samples: usize,
    pub patterns: usize,
    pub patterns_detected: u64,
    pub predictions_made: u64,
    pub predictions_scored: u64,
    pub prediction_hits: u64,
    pub pending_predictions: usize,
    pub last_detection: Option<DateTime<Utc>>,
}

impl HistoryStats {
    pub fn accuracy(&self) -> Option<f64> {
        (self.predictions_scored > 0)
            .then(|| self.prediction_hits as f64 / self.predictions_scored as f64)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PatternScore {
    scored: u64,
    hits: u64,
}

struct TrackerState {
    samples: BoundedHistory<HistorySample>,
    patterns: HashMap<String, MinedPattern>,
    predictions: BoundedHistory<Prediction>,
    pattern_scores: HashMap<String, PatternScore>,
    stats: HistoryStats,
    cycles: u64,
}

pub struct ContextHistoryTracker {
    config: HistoryConfig,
    monitor: Arc<EnvironmentMonitor>,
    store: Arc<dyn PersistenceStore>,
    event_bus: EventBus,
    state: Mutex<TrackerState>,
    lifecycle: LoopHandle,
}

impl ContextHistoryTracker {
    pub fn new(
        config: HistoryConfig,
        monitor: Arc<EnvironmentMonitor>,
        store: Arc<dyn PersistenceStore>,
        event_bus: EventBus,
    ) -> Self {
        let state = TrackerState {
            samples: BoundedHistory::new(config.capacity),
            patterns: HashMap::new(),
            predictions: BoundedHistory::new(config.prediction_capacity),
            pattern_scores: HashMap::new(),
            stats: HistoryStats::default(),
            cycles: 0,
        };
        Self {
            config,
            monitor,
            store,
            event_bus,
            state: Mutex::new(state),
            lifecycle: LoopHandle::new("history_tracker"),
        }
    }

    pub fn start(self: &Arc<Self>) -> bool {
        let tracker = Arc::clone(self);
        self.lifecycle.start(self.config.interval, move || {
            let tracker = Arc::clone(&tracker);
            async move { tracker.run_cycle().await }
        })
    }

    pub async fn stop(&self, join_timeout: Duration) -> bool {
        self.lifecycle.stop(join_timeout).await
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn record(&self, context: &ContextSnapshot) {
        self.record_sample(HistorySample::from_context(context));
    }

    pub fn record_sample(&self, sample: HistorySample) {
        let mut state = self.state.lock();
        state.samples.push(sample);
        state.stats.samples_recorded += 1;
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// The `limit` most recent samples, oldest first.
    pub fn recent_samples(&self, limit: usize) -> Vec<HistorySample> {
        self.state.lock().samples.recent(limit).cloned().collect()
    }

    pub fn patterns(&self) -> Vec<MinedPattern> {
        let state = self.state.lock();
        let mut patterns: Vec<_> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.id.cmp(&b.id));
        patterns
    }

    pub fn pattern(&self, id: &str) -> Option<MinedPattern> {
        self.state.lock().patterns.get(id).cloned()
    }

    /// Add or merge a pattern directly, bypassing the miners.
    pub fn insert_pattern(&self, pattern: MinedPattern) {
        let mut state = self.state.lock();
        self.upsert_pattern(&mut state, pattern);
    }

    fn upsert_pattern(&self, state: &mut TrackerState, candidate: MinedPattern) -> bool {
        if let Some(existing) = state.patterns.get_mut(&candidate.id) {
            existing.merge(&candidate);
            return false;
        }
        if state.patterns.len() >= self.config.pattern_capacity {
            let stalest = state
                .patterns
                .values()
                .min_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| a.id.cmp(&b.id)))
                .map(|pattern| pattern.id.clone());
            if let Some(id) = stalest {
                debug!(pattern_id = %id, "Evicting stalest pattern");
                state.patterns.remove(&id);
                state.pattern_scores.remove(&id);
            }
        }
        state.patterns.insert(candidate.id.clone(), candidate);
        true
    }

    pub fn detect_patterns(&self) -> Vec<MinedPattern> {
        self.detect_patterns_at(Utc::now())
    }

    /// Run all miners. Returns patterns that were not known before.
    pub fn detect_patterns_at(&self, now: DateTime<Utc>) -> Vec<MinedPattern> {
        let mut state = self.state.lock();
        if state.samples.len() < self.config.min_samples {
            debug!(
                samples = state.samples.len(),
                required = self.config.min_samples,
                "Not enough history to mine patterns"
            );
            return Vec::new();
        }

        let candidates: Vec<MinedPattern> = {
            let samples: Vec<&HistorySample> = state.samples.iter().collect();
            let mut candidates = mine_temporal(&samples, now);
            candidates.extend(mine_usage(&samples, now));
            candidates.extend(mine_resource(&samples, now));
            candidates
        };

        let mut detected = Vec::new();
        for candidate in candidates {
            if candidate.confidence < self.config.confidence_floor {
                continue;
            }
            if self.upsert_pattern(&mut state, candidate.clone()) {
                detected.push(candidate);
            }
        }

        state.stats.patterns_detected += detected.len() as u64;
        state.stats.last_detection = Some(now);
        let total_patterns = state.patterns.len();
        drop(state);

        if !detected.is_empty() {
            info!(detected = detected.len(), total_patterns, "Detected new context patterns");
        }
        self.event_bus.publish(ContextEvent::PatternsMined {
            detected: detected.len(),
            total_patterns,
            mined_at: now,
        });
        detected
    }

    pub fn predict(&self, horizon: Duration) -> Vec<Prediction> {
        self.predict_at(Utc::now(), horizon)
    }

    /// Predictions for `now + horizon` from every known pattern whose trigger
    /// holds at that time.
    pub fn predict_at(&self, now: DateTime<Utc>, horizon: Duration) -> Vec<Prediction> {
        let target = now + span(horizon);
        let mut state = self.state.lock();

        let current_apps: Vec<String> = state
            .samples
            .latest()
            .map(|sample| sample.active_apps.clone())
            .unwrap_or_default();
        let lookback: Vec<f64> = state
            .samples
            .recent(RESOURCE_LOOKBACK)
            .map(|sample| sample.cpu_percent)
            .collect();

        let mut patterns: Vec<&MinedPattern> = state.patterns.values().collect();
        patterns.sort_by(|a, b| a.id.cmp(&b.id));

        let predictions: Vec<Prediction> = patterns
            .into_iter()
            .filter_map(|pattern| {
                let (discount, description) = match &pattern.trigger {
                    PatternTrigger::PeakHour { hour } => {
                        if hour_distance(target.hour(), *hour) > 1 {
                            return None;
                        }
                        (
                            TEMPORAL_DISCOUNT,
                            format!("Expecting high activity around {}", target.format("%H:%M")),
                        )
                    }
                    PatternTrigger::CoOccurrence { apps } => {
                        if !apps.iter().any(|app| current_apps.contains(app)) {
                            return None;
                        }
                        (
                            USAGE_DISCOUNT,
                            format!("Expecting {} and {} to be used together", apps[0], apps[1]),
                        )
                    }
                    PatternTrigger::HighLoad { cpu_threshold } => {
                        let high = lookback.iter().filter(|cpu| **cpu > *cpu_threshold).count();
                        if lookback.is_empty() || high * 2 < lookback.len() {
                            return None;
                        }
                        (
                            RESOURCE_DISCOUNT,
                            format!("Expecting cpu above {:.0}% to persist", cpu_threshold),
                        )
                    }
                };
                Some(Prediction {
                    id: PredictionId::new(),
                    pattern_id: pattern.id.clone(),
                    kind: pattern.kind(),
                    target_time: target,
                    description,
                    confidence: (pattern.confidence * discount).clamp(0.0, 1.0),
                    made_at: now,
                    outcome: PredictionOutcome::Pending,
                })
            })
            .collect();

        state.predictions.extend(predictions.iter().cloned());
        state.stats.predictions_made += predictions.len() as u64;
        drop(state);

        if !predictions.is_empty() {
            debug!(count = predictions.len(), target = %target, "Predictions issued");
        }
        predictions
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.state.lock().predictions.iter().cloned().collect()
    }

    pub fn score_predictions(&self) -> usize {
        self.score_predictions_at(Utc::now())
    }

    /// Judge pending predictions whose grace period has passed and purge
    /// records older than the retention window. Returns the number scored.
    pub fn score_predictions_at(&self, now: DateTime<Utc>) -> usize {
        let grace = span(self.config.prediction_grace);
        let window = span(self.config.prediction_window);
        let retention = span(self.config.prediction_retention);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut verdicts: Vec<(String, bool)> = Vec::new();
        for prediction in state.predictions.iter_mut() {
            if prediction.outcome != PredictionOutcome::Pending || now <= prediction.target_time + grace {
                continue;
            }
            let (from, until) = (prediction.target_time - window, prediction.target_time + window);
            let around: Vec<&HistorySample> = state
                .samples
                .iter()
                .filter(|s| s.timestamp >= from && s.timestamp <= until)
                .collect();
            let trigger = state.patterns.get(&prediction.pattern_id).map(|p| &p.trigger);
            let hit = judge(prediction.kind, trigger, &around);
            prediction.outcome = if hit {
                PredictionOutcome::Hit
            } else {
                PredictionOutcome::Miss
            };
            verdicts.push((prediction.pattern_id.clone(), hit));
        }

        for (pattern_id, hit) in &verdicts {
            let score = state.pattern_scores.entry(pattern_id.clone()).or_default();
            score.scored += 1;
            if *hit {
                score.hits += 1;
            }
            let accuracy = score.hits as f64 / score.scored as f64;
            if let Some(pattern) = state.patterns.get_mut(pattern_id) {
                pattern.prediction_accuracy = Some(accuracy);
            }
            state.stats.predictions_scored += 1;
            if *hit {
                state.stats.prediction_hits += 1;
            }
        }

        let before = state.predictions.len();
        state.predictions.retain(|p| now - p.made_at <= retention);
        let purged = before - state.predictions.len();

        let scored = verdicts.len();
        let accuracy = state.stats.accuracy();
        drop(guard);

        if purged > 0 {
            debug!(purged, "Purged expired predictions");
        }
        if scored > 0 {
            info!(scored, accuracy = ?accuracy, "Predictions scored");
            self.event_bus.publish(ContextEvent::PredictionsScored {
                scored,
                accuracy,
                scored_at: now,
            });
        }
        scored
    }

    /// Hit ratio over all scored predictions.
    pub fn accuracy(&self) -> Option<f64> {
        self.state.lock().stats.accuracy()
    }

    pub fn stats(&self) -> HistoryStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.buffered_samples = state.samples.len();
        stats.patterns = state.patterns.len();
        stats.pending_predictions = state
            .predictions
            .iter()
            .filter(|p| p.outcome == PredictionOutcome::Pending)
            .count();
        stats
    }

    fn detection_due(&self, now: DateTime<Utc>) -> bool {
        match self.state.lock().stats.last_detection {
            None => true,
            Some(last) => now - last >= span(self.config.pattern_detection_interval),
        }
    }

    /// One tracker cycle: record the current environment, mine and predict
    /// on the detection cadence, score due predictions and periodically save.
    pub async fn run_cycle(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        match self.monitor.get_current_environment() {
            Some(environment) => self.record(&environment),
            None => debug!("No environment yet; nothing to record"),
        }

        let samples = self.sample_count();
        if samples >= self.config.min_samples && self.detection_due(now) {
            self.detect_patterns_at(now);
            self.predict_at(now, self.config.prediction_horizon);
        }
        self.score_predictions_at(now);

        let cycles = {
            let mut state = self.state.lock();
            state.cycles += 1;
            state.cycles
        };
        let every = u64::from(self.config.save_every_cycles);
        if every > 0 && cycles % every == 0 {
            self.save().await?;
        }
        Ok(())
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        let (samples, patterns) = {
            let state = self.state.lock();
            let samples = serde_json::to_vec(&state.samples)?;
            let mut patterns: Vec<&MinedPattern> = state.patterns.values().collect();
            patterns.sort_by(|a, b| a.id.cmp(&b.id));
            (samples, serde_json::to_vec(&patterns)?)
        };

        self.store
            .put(SAMPLES_KEY, samples)
            .await
            .context("Failed to persist context history")?;
        self.store
            .put(PATTERNS_KEY, patterns)
            .await
            .context("Failed to persist mined patterns")?;

        debug!("Context history saved");
        Ok(())
    }

    /// Restore samples and patterns. Missing or corrupt data leaves the
    /// current state untouched. Returns the number of samples restored.
    pub async fn load(&self) -> usize {
        let samples = match self.store.get(SAMPLES_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<HistorySample>>(&bytes) {
                Ok(samples) => Some(samples),
                Err(e) => {
                    warn!("Ignoring corrupt context history: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read context history: {}", e);
                None
            }
        };

        let patterns = match self.store.get(PATTERNS_KEY).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<MinedPattern>>(&bytes) {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    warn!("Ignoring corrupt mined patterns: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read mined patterns: {}", e);
                None
            }
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut restored = 0;
        if let Some(samples) = samples {
            let mut history = BoundedHistory::new(self.config.capacity);
            history.extend(samples);
            restored = history.len();
            state.samples = history;
        }
        if let Some(patterns) = patterns {
            state.patterns.clear();
            state.pattern_scores.clear();
            for mut pattern in patterns {
                if !pattern.confidence.is_finite() {
                    continue;
                }
                pattern.confidence = pattern.confidence.clamp(0.0, 1.0);
                self.upsert_pattern(state, pattern);
            }
        }
        let pattern_count = state.patterns.len();
        drop(guard);

        info!(samples = restored, patterns = pattern_count, "Context history loaded");
        restored
    }
}

fn judge(kind: PatternKind, trigger: Option<&PatternTrigger>, around: &[&HistorySample]) -> bool {
    if around.is_empty() {
        return false;
    }
    match (kind, trigger) {
        (PatternKind::Temporal, _) => {
            let average = around.iter().map(|s| s.activity_level).sum::<f64>() / around.len() as f64;
            average > TEMPORAL_HIT_ACTIVITY
        }
        (PatternKind::Usage, Some(PatternTrigger::CoOccurrence { apps })) => around
            .iter()
            .any(|s| apps.iter().all(|app| s.active_apps.contains(app))),
        (PatternKind::Resource, Some(PatternTrigger::HighLoad { cpu_threshold })) => {
            let high = around.iter().filter(|s| s.cpu_percent > *cpu_threshold).count();
            high * 2 >= around.len()
        }
        _ => false,
    }
}
