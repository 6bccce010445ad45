// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Environment Monitor
//!
//! Turns raw telemetry into immutable [`SystemSnapshot`]s, detects significant
//! deltas between consecutive snapshots and discovers relationships between
//! running applications.
//!
//! # Capture cycle
//!
//! 1. Query metrics and the process table, each under `probe_timeout`. A
//!    failed or slow probe degrades to empty data and is named in
//!    `degraded_probes`; the capture itself never fails.
//! 2. Update application tracking and evict applications unseen for the
//!    inactivity window.
//! 3. Publish the snapshot as the new "latest".
//! 4. Run relationship discovery over the active applications.
//! 5. Diff against the previous snapshot; keep changes above the significance
//!    cutoff in the bounded change history.
//! 6. Publish events after the state lock is released.
//!
//! # Change thresholds
//!
//! | Metric | Base threshold | Scale |
//! |--------|----------------|-------|
//! | cpu_percent | 20 | 100 |
//! | memory_percent | 15 | 100 |
//! | disk_percent | 10 | 100 |
//! | process_count | 5 | 50 |
//!
//! A metric fires when `|delta| > base * sensitivity`; significance is
//! `min(1, |delta| / scale)`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Snapshot capture, change detection, relationship discovery

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::periodic::LoopHandle;
use crate::domain::bounded::BoundedHistory;
use crate::domain::change::{ChangeType, ChangeValue, EnvironmentChange};
use crate::domain::config::MonitorConfig;
use crate::domain::events::ContextEvent;
use crate::domain::relationship::{ApplicationRelationship, RelationshipKey, RelationshipKind};
use crate::domain::snapshot::{
    AppId, ApplicationRecord, ContextSnapshot, HealthAssessment, ResourceMetrics, SystemSnapshot,
};
use crate::domain::telemetry::{ProcessEntry, RawSystemMetrics, TelemetryProvider};
use crate::infrastructure::event_bus::EventBus;

/// Changes included in a [`ContextSnapshot`]
const RECENT_CHANGES_IN_CONTEXT: usize = 10;

const RESOURCE_SHARING_CPU_BOUND: f64 = 20.0;
const RESOURCE_SHARING_MEM_BOUND: f64 = 15.0;
const ACTIVE_CPU_FLOOR: f64 = 1.0;
const CO_OCCURRENCE_MIN_SAMPLES: usize = 10;
const CO_OCCURRENCE_LOOKBACK: usize = 20;
const CO_OCCURRENCE_MIN_ACTIVE: usize = 5;

const NEW_APP_SIGNIFICANCE: f64 = 0.5;
const REMOVED_APP_SIGNIFICANCE: f64 = 0.4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub captures: u64,
    pub degraded_captures: u64,
    pub changes_recorded: u64,
    pub relationships_discovered: u64,
    pub tracked_applications: usize,
}

struct TrackedApplication {
    record: ApplicationRecord,
    /// Recent cpu samples
    activity: BoundedHistory<f64>,
}

struct MonitorState {
    snapshots: BoundedHistory<Arc<SystemSnapshot>>,
    applications: HashMap<AppId, TrackedApplication>,
    relationships: HashMap<RelationshipKey, ApplicationRelationship>,
    changes: BoundedHistory<EnvironmentChange>,
    /// Newest snapshot whose diff against its predecessor is in `changes`
    recorded_through: Option<Arc<SystemSnapshot>>,
    stats: MonitorStats,
}

pub struct EnvironmentMonitor {
    config: MonitorConfig,
    telemetry: Arc<dyn TelemetryProvider>,
    event_bus: EventBus,
    state: Mutex<MonitorState>,
    latest: RwLock<Option<Arc<SystemSnapshot>>>,
    lifecycle: LoopHandle,
}

impl EnvironmentMonitor {
    pub fn new(
        config: MonitorConfig,
        telemetry: Arc<dyn TelemetryProvider>,
        event_bus: EventBus,
    ) -> Self {
        let state = MonitorState {
            snapshots: BoundedHistory::new(config.snapshot_capacity.max(2)),
            applications: HashMap::new(),
            relationships: HashMap::new(),
            changes: BoundedHistory::new(config.change_capacity),
            recorded_through: None,
            stats: MonitorStats::default(),
        };
        Self {
            config,
            telemetry,
            event_bus,
            state: Mutex::new(state),
            latest: RwLock::new(None),
            lifecycle: LoopHandle::new("environment_monitor"),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Launch the periodic capture loop. No-op if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let monitor = Arc::clone(self);
        self.lifecycle.start(self.config.interval, move || {
            let monitor = Arc::clone(&monitor);
            async move {
                monitor.capture().await;
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

    /// Run one capture cycle.
    pub async fn capture(&self) -> Arc<SystemSnapshot> {
        let mut degraded = Vec::new();

        let metrics = match timeout(self.config.probe_timeout, self.telemetry.get_system_metrics()).await {
            Ok(Ok(metrics)) => Some(metrics),
            Ok(Err(e)) => {
                warn!("System metrics probe failed: {}", e);
                degraded.push("system_metrics".to_string());
                None
            }
            Err(_) => {
                warn!(timeout = ?self.config.probe_timeout, "System metrics probe timed out");
                degraded.push("system_metrics".to_string());
                None
            }
        };

        let processes = match timeout(self.config.probe_timeout, self.telemetry.get_process_table()).await {
            Ok(Ok(processes)) => Some(processes),
            Ok(Err(e)) => {
                warn!("Process table probe failed: {}", e);
                degraded.push("process_table".to_string());
                None
            }
            Err(_) => {
                warn!(timeout = ?self.config.probe_timeout, "Process table probe timed out");
                degraded.push("process_table".to_string());
                None
            }
        };

        self.ingest(Utc::now(), metrics, processes, degraded)
    }

    /// Fold one round of telemetry into monitor state.
    fn ingest(
        &self,
        now: DateTime<Utc>,
        raw: Option<RawSystemMetrics>,
        processes: Option<Vec<ProcessEntry>>,
        degraded_probes: Vec<String>,
    ) -> Arc<SystemSnapshot> {
        let process_table_ok = processes.is_some();
        let processes = processes.unwrap_or_default();

        let mut metrics = raw
            .map(|raw| ResourceMetrics {
                cpu_percent: raw.cpu_percent.filter(|v| v.is_finite()),
                memory_percent: raw.memory_percent.filter(|v| v.is_finite()),
                disk_percent: raw.disk_percent.filter(|v| v.is_finite()),
                network: raw.network_io,
                load_average: raw.load_average,
                process_count: raw.process_count,
                thread_count: raw.thread_count,
                cpu_cores: raw.cpu_cores,
            })
            .unwrap_or_default();
        if metrics.process_count.is_none() && process_table_ok {
            metrics.process_count = Some(processes.len() as u32);
        }

        let mut events = Vec::new();
        let snapshot = {
            let mut state = self.state.lock();

            let previous = state.snapshots.latest().cloned();

            // Without a process table the last known application set stands;
            // an empty table would read as every application stopping.
            let records = if process_table_ok {
                self.track_applications(&mut state, &processes, now)
            } else {
                previous
                    .as_ref()
                    .map(|p| p.applications.clone())
                    .unwrap_or_default()
            };
            let mut snapshot =
                SystemSnapshot::new(now, metrics, records, self.config.default_cpu_cores);
            snapshot.degraded_probes = degraded_probes;
            let snapshot = Arc::new(snapshot);

            state.snapshots.push(Arc::clone(&snapshot));
            state.recorded_through = Some(Arc::clone(&snapshot));
            *self.latest.write() = Some(Arc::clone(&snapshot));

            state.stats.captures += 1;
            if !snapshot.degraded_probes.is_empty() {
                state.stats.degraded_captures += 1;
            }

            let discovered = if process_table_ok {
                discover_pairs(
                    &mut state,
                    &snapshot.applications,
                    now,
                    self.config.relationship_capacity,
                )
            } else {
                Discovery::default()
            };

            let mut changes = match &previous {
                Some(previous) => {
                    diff_snapshots(previous, &snapshot, self.config.change_sensitivity, now)
                }
                None => Vec::new(),
            };

            for key in &discovered.created {
                if let Some(rel) = state.relationships.get(key) {
                    changes.push(EnvironmentChange::new(
                        ChangeType::Relationship,
                        key.to_string(),
                        format!(
                            "New {} relationship between {} and {}",
                            key.kind, key.first, key.second
                        ),
                        None,
                        Some(ChangeValue::Number(rel.strength)),
                        rel.strength,
                        now,
                    ));
                    events.push(ContextEvent::RelationshipDiscovered {
                        key: key.clone(),
                        strength: rel.strength,
                        discovered_at: now,
                    });
                }
            }
            state.stats.relationships_discovered += discovered.created.len() as u64;

            let recorded = record_changes(&mut state, changes, self.config.change_significance_cutoff);
            events.extend(
                recorded
                    .into_iter()
                    .map(|change| ContextEvent::ChangeDetected { change }),
            );
            state.stats.tracked_applications = state.applications.len();

            snapshot
        };

        debug!(
            health = %snapshot.health,
            applications = snapshot.applications.len(),
            degraded = snapshot.degraded_probes.len(),
            "Snapshot captured"
        );
        if !snapshot.degraded_probes.is_empty() {
            info!(probes = ?snapshot.degraded_probes, "Capture completed with partial data");
        }

        self.event_bus.publish(ContextEvent::SnapshotCaptured {
            health: snapshot.health,
            application_count: snapshot.applications.len(),
            degraded_probes: snapshot.degraded_probes.clone(),
            captured_at: now,
        });
        for event in events {
            self.event_bus.publish(event);
        }

        snapshot
    }

    /// Update tracked applications from the process table and return the
    /// records active in this cycle, sorted by id.
    fn track_applications(
        &self,
        state: &mut MonitorState,
        processes: &[ProcessEntry],
        now: DateTime<Utc>,
    ) -> Vec<ApplicationRecord> {
        let mut active: BTreeSet<AppId> = BTreeSet::new();

        for process in processes {
            let id = AppId::new(&process.name, process.pid);
            let cpu = if process.cpu_percent.is_finite() { process.cpu_percent.max(0.0) } else { 0.0 };
            let memory = if process.memory_percent.is_finite() { process.memory_percent.max(0.0) } else { 0.0 };

            let tracked = state
                .applications
                .entry(id.clone())
                .or_insert_with(|| TrackedApplication {
                    record: ApplicationRecord {
                        id: id.clone(),
                        name: process.name.clone(),
                        pid: process.pid,
                        parent_pid: process.parent_pid,
                        cpu_percent: cpu,
                        memory_percent: memory,
                        open_resources: Vec::new(),
                        connections: Vec::new(),
                        first_seen: now,
                        last_seen: now,
                    },
                    activity: BoundedHistory::new(self.config.activity_window),
                });

            tracked.record.parent_pid = process.parent_pid;
            tracked.record.cpu_percent = cpu;
            tracked.record.memory_percent = memory;
            tracked.record.open_resources = process.open_resources.clone();
            tracked.record.connections = process.connections.clone();
            tracked.record.last_seen = now;
            tracked.activity.push(cpu);
            active.insert(id);
        }

        let window = chrono::Duration::from_std(self.config.app_inactivity_window)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let cutoff = now - window;
        let before = state.applications.len();
        state
            .applications
            .retain(|_, tracked| tracked.record.last_seen >= cutoff);
        let evicted = before - state.applications.len();
        if evicted > 0 {
            debug!(evicted, "Evicted inactive applications");
        }

        active
            .iter()
            .filter_map(|id| state.applications.get(id).map(|t| t.record.clone()))
            .collect()
    }

    /// Latest snapshot plus derived pressure and recent changes.
    pub fn get_current_environment(&self) -> Option<ContextSnapshot> {
        let snapshot = self.latest.read().clone()?;
        let state = self.state.lock();
        let recent: Vec<EnvironmentChange> = state
            .changes
            .recent(RECENT_CHANGES_IN_CONTEXT)
            .cloned()
            .collect();
        Some(ContextSnapshot::from_snapshot(
            &snapshot,
            recent,
            state.relationships.len(),
        ))
    }

    pub fn latest_snapshot(&self) -> Option<Arc<SystemSnapshot>> {
        self.latest.read().clone()
    }

    /// Compare the last two snapshots and return every fired change. Changes
    /// above the significance cutoff are appended to history once per pair;
    /// a pair already diffed by `capture` is not recorded again.
    pub fn detect_changes(&self, sensitivity: f64) -> Vec<EnvironmentChange> {
        let sensitivity = if sensitivity.is_finite() && sensitivity > 0.0 {
            sensitivity
        } else {
            self.config.change_sensitivity
        };

        let mut state = self.state.lock();
        let pair: Vec<Arc<SystemSnapshot>> = state.snapshots.recent(2).cloned().collect();
        let [previous, current] = pair.as_slice() else {
            return Vec::new();
        };

        let changes = diff_snapshots(previous, current, sensitivity, Utc::now());
        let already_recorded = state
            .recorded_through
            .as_ref()
            .is_some_and(|through| Arc::ptr_eq(through, current));
        if !already_recorded {
            record_changes(&mut state, changes.clone(), self.config.change_significance_cutoff);
            state.recorded_through = Some(Arc::clone(current));
        }
        changes
    }

    /// Run the relationship heuristics over `records`. Returns every
    /// relationship that fired, after its update.
    pub fn discover_relationships(&self, records: &[ApplicationRecord]) -> Vec<ApplicationRelationship> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let discovered = discover_pairs(&mut state, records, now, self.config.relationship_capacity);
        state.stats.relationships_discovered += discovered.created.len() as u64;
        discovered
            .fired
            .iter()
            .filter_map(|key| state.relationships.get(key).cloned())
            .collect()
    }

    /// All known relationships, strongest first.
    pub fn relationships(&self) -> Vec<ApplicationRelationship> {
        let state = self.state.lock();
        let mut relationships: Vec<_> = state.relationships.values().cloned().collect();
        relationships.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.key.cmp(&b.key))
        });
        relationships
    }

    /// The `limit` most recent recorded changes, oldest first.
    pub fn recent_changes(&self, limit: usize) -> Vec<EnvironmentChange> {
        self.state.lock().changes.recent(limit).cloned().collect()
    }

    pub fn stats(&self) -> MonitorStats {
        self.state.lock().stats.clone()
    }

    /// Health of the latest snapshot with remediation hints.
    pub fn health_assessment(&self) -> Option<HealthAssessment> {
        let snapshot = self.latest.read().clone()?;
        let trend = {
            let state = self.state.lock();
            match (state.snapshots.oldest(), state.snapshots.latest()) {
                (Some(oldest), Some(latest)) if state.snapshots.len() > 1 => {
                    Some(latest.health_score - oldest.health_score)
                }
                _ => None,
            }
        };

        let metrics = &snapshot.metrics;
        let mut recommendations = Vec::new();
        if metrics.cpu() > 80.0 {
            recommendations.push("Reduce CPU-intensive background work".to_string());
        }
        if metrics.memory() > 85.0 {
            recommendations.push("Release cached data or close memory-heavy applications".to_string());
        }
        if metrics.disk() > 90.0 {
            recommendations.push("Free disk space".to_string());
        }
        if let Some([load_1m, _, _]) = metrics.load_average {
            let cores = f64::from(metrics.cpu_cores.unwrap_or(self.config.default_cpu_cores).max(1));
            if load_1m > cores {
                recommendations.push(format!(
                    "Load average {:.1} exceeds {} cores; defer queued work",
                    load_1m, cores
                ));
            }
        }
        if !snapshot.degraded_probes.is_empty() {
            recommendations.push(format!(
                "Telemetry incomplete: {}",
                snapshot.degraded_probes.join(", ")
            ));
        }

        Some(HealthAssessment {
            status: snapshot.health,
            score: snapshot.health_score,
            recommendations,
            score_trend: trend,
        })
    }
}

/// Append changes above `cutoff` to history; return the ones kept.
fn record_changes(
    state: &mut MonitorState,
    changes: Vec<EnvironmentChange>,
    cutoff: f64,
) -> Vec<EnvironmentChange> {
    let kept: Vec<EnvironmentChange> = changes
        .into_iter()
        .filter(|change| change.significance > cutoff)
        .collect();
    for change in &kept {
        state.changes.push(change.clone());
    }
    state.stats.changes_recorded += kept.len() as u64;
    kept
}

#[allow(clippy::too_many_arguments)]
fn metric_change(
    subject: &str,
    label: &str,
    unit: &str,
    before: Option<f64>,
    after: Option<f64>,
    threshold: f64,
    scale: f64,
    now: DateTime<Utc>,
) -> Option<EnvironmentChange> {
    let (before, after) = (before?, after?);
    let delta = after - before;
    if delta.abs() <= threshold {
        return None;
    }
    let direction = if delta > 0.0 { "increased" } else { "decreased" };
    Some(EnvironmentChange::new(
        ChangeType::Resource,
        subject,
        format!(
            "{} {} from {:.1}{} to {:.1}{}",
            label, direction, before, unit, after, unit
        ),
        Some(ChangeValue::Number(before)),
        Some(ChangeValue::Number(after)),
        (delta.abs() / scale).min(1.0),
        now,
    ))
}

/// Field-by-field diff of two snapshots.
fn diff_snapshots(
    previous: &SystemSnapshot,
    current: &SystemSnapshot,
    sensitivity: f64,
    now: DateTime<Utc>,
) -> Vec<EnvironmentChange> {
    let before = &previous.metrics;
    let after = &current.metrics;

    let mut changes: Vec<EnvironmentChange> = [
        metric_change(
            "cpu_percent",
            "CPU usage",
            "%",
            before.cpu_percent,
            after.cpu_percent,
            20.0 * sensitivity,
            100.0,
            now,
        ),
        metric_change(
            "memory_percent",
            "Memory usage",
            "%",
            before.memory_percent,
            after.memory_percent,
            15.0 * sensitivity,
            100.0,
            now,
        ),
        metric_change(
            "disk_percent",
            "Disk usage",
            "%",
            before.disk_percent,
            after.disk_percent,
            10.0 * sensitivity,
            100.0,
            now,
        ),
        metric_change(
            "process_count",
            "Process count",
            "",
            before.process_count.map(f64::from),
            after.process_count.map(f64::from),
            5.0 * sensitivity,
            50.0,
            now,
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    let previous_apps: HashMap<&AppId, &ApplicationRecord> =
        previous.applications.iter().map(|app| (&app.id, app)).collect();
    let current_apps: HashMap<&AppId, &ApplicationRecord> =
        current.applications.iter().map(|app| (&app.id, app)).collect();

    for app in &current.applications {
        match previous_apps.get(&app.id) {
            None => changes.push(EnvironmentChange::new(
                ChangeType::Application,
                app.id.to_string(),
                format!("Application started: {} (pid {})", app.name, app.pid),
                None,
                Some(ChangeValue::Text(app.name.clone())),
                NEW_APP_SIGNIFICANCE,
                now,
            )),
            Some(old) => {
                let cpu_delta = app.cpu_percent - old.cpu_percent;
                if cpu_delta.abs() > 10.0 * sensitivity {
                    changes.push(EnvironmentChange::new(
                        ChangeType::Application,
                        app.id.to_string(),
                        format!(
                            "{} CPU usage changed from {:.1}% to {:.1}%",
                            app.name, old.cpu_percent, app.cpu_percent
                        ),
                        Some(ChangeValue::Number(old.cpu_percent)),
                        Some(ChangeValue::Number(app.cpu_percent)),
                        (cpu_delta.abs() / 50.0).min(1.0),
                        now,
                    ));
                }
                let mem_delta = app.memory_percent - old.memory_percent;
                if mem_delta.abs() > 5.0 * sensitivity {
                    changes.push(EnvironmentChange::new(
                        ChangeType::Application,
                        app.id.to_string(),
                        format!(
                            "{} memory usage changed from {:.1}% to {:.1}%",
                            app.name, old.memory_percent, app.memory_percent
                        ),
                        Some(ChangeValue::Number(old.memory_percent)),
                        Some(ChangeValue::Number(app.memory_percent)),
                        (mem_delta.abs() / 20.0).min(1.0),
                        now,
                    ));
                }
            }
        }
    }

    for app in &previous.applications {
        if !current_apps.contains_key(&app.id) {
            changes.push(EnvironmentChange::new(
                ChangeType::Application,
                app.id.to_string(),
                format!("Application stopped: {} (pid {})", app.name, app.pid),
                Some(ChangeValue::Text(app.name.clone())),
                None,
                REMOVED_APP_SIGNIFICANCE,
                now,
            ));
        }
    }

    changes
}

#[derive(Default)]
struct Discovery {
    /// Keys that fired this pass
    fired: Vec<RelationshipKey>,
    /// Keys that did not exist before this pass
    created: Vec<RelationshipKey>,
}

fn discover_pairs(
    state: &mut MonitorState,
    records: &[ApplicationRecord],
    now: DateTime<Utc>,
    capacity: usize,
) -> Discovery {
    let mut discovery = Discovery::default();

    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            if a.id == b.id {
                continue;
            }

            let mut fired: Vec<(RelationshipKind, String)> = Vec::new();

            if let Some(evidence) = hierarchy_evidence(a, b) {
                fired.push((RelationshipKind::Hierarchy, evidence));
            }
            if let Some(evidence) = resource_sharing_evidence(a, b) {
                fired.push((RelationshipKind::ResourceSharing, evidence));
            }
            if let Some(evidence) = communication_evidence(a, b) {
                fired.push((RelationshipKind::Communication, evidence));
            }
            if sustained_activity(state, &a.id) && sustained_activity(state, &b.id) {
                fired.push((RelationshipKind::CoOccurrence, "sustained concurrent activity".to_string()));
            }

            for (kind, evidence) in fired {
                let key = RelationshipKey::new(a.id.clone(), b.id.clone(), kind);
                match state.relationships.get_mut(&key) {
                    Some(existing) => existing.confirm(evidence, now),
                    None => {
                        if state.relationships.len() >= capacity {
                            evict_stalest_relationship(state);
                        }
                        state
                            .relationships
                            .insert(key.clone(), ApplicationRelationship::new(key.clone(), evidence, now));
                        discovery.created.push(key.clone());
                    }
                }
                discovery.fired.push(key);
            }
        }
    }

    discovery
}

fn evict_stalest_relationship(state: &mut MonitorState) {
    let stalest = state
        .relationships
        .values()
        .min_by(|a, b| {
            a.last_observed
                .cmp(&b.last_observed)
                .then_with(|| a.key.cmp(&b.key))
        })
        .map(|rel| rel.key.clone());
    if let Some(key) = stalest {
        state.relationships.remove(&key);
    }
}

fn hierarchy_evidence(a: &ApplicationRecord, b: &ApplicationRecord) -> Option<String> {
    if a.parent_pid == Some(b.pid) {
        Some(format!("{} is parent of {}", b.id, a.id))
    } else if b.parent_pid == Some(a.pid) {
        Some(format!("{} is parent of {}", a.id, b.id))
    } else {
        None
    }
}

fn resource_sharing_evidence(a: &ApplicationRecord, b: &ApplicationRecord) -> Option<String> {
    let cpu_close = (a.cpu_percent - b.cpu_percent).abs() <= RESOURCE_SHARING_CPU_BOUND;
    let mem_close = (a.memory_percent - b.memory_percent).abs() <= RESOURCE_SHARING_MEM_BOUND;
    let both_active = a.cpu_percent >= ACTIVE_CPU_FLOOR && b.cpu_percent >= ACTIVE_CPU_FLOOR;
    (cpu_close && mem_close && both_active).then(|| "similar resource usage".to_string())
}

fn communication_evidence(a: &ApplicationRecord, b: &ApplicationRecord) -> Option<String> {
    if let Some(resource) = a
        .open_resources
        .iter()
        .find(|resource| b.open_resources.contains(resource))
    {
        return Some(format!("shared resource {}", resource));
    }

    let endpoint_match = |from: &ApplicationRecord, to: &ApplicationRecord| {
        from.connections.iter().find_map(|conn| {
            conn.remote.as_ref().and_then(|remote| {
                to.connections
                    .iter()
                    .any(|other| &other.local == remote)
                    .then(|| format!("connection to {}", remote))
            })
        })
    };
    endpoint_match(a, b).or_else(|| endpoint_match(b, a))
}

fn sustained_activity(state: &MonitorState, id: &AppId) -> bool {
    state
        .applications
        .get(id)
        .map(|tracked| {
            tracked.activity.len() >= CO_OCCURRENCE_MIN_SAMPLES
                && tracked
                    .activity
                    .recent(CO_OCCURRENCE_LOOKBACK)
                    .filter(|cpu| **cpu > ACTIVE_CPU_FLOOR)
                    .count()
                    > CO_OCCURRENCE_MIN_ACTIVE
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change::Severity;
    use crate::domain::snapshot::{Connection, HealthStatus};
    use crate::domain::telemetry::ProbeError;
    use crate::infrastructure::telemetry::StaticTelemetryProvider;
    use async_trait::async_trait;

    fn metrics(cpu: f64, memory: f64) -> RawSystemMetrics {
        RawSystemMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            disk_percent: Some(40.0),
            process_count: Some(120),
            cpu_cores: Some(8),
            ..Default::default()
        }
    }

    fn process(name: &str, pid: u32, cpu: f64) -> ProcessEntry {
        ProcessEntry {
            pid,
            parent_pid: None,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_percent: 5.0,
            open_resources: vec![],
            connections: vec![],
        }
    }

    fn monitor_with(provider: Arc<dyn TelemetryProvider>) -> EnvironmentMonitor {
        EnvironmentMonitor::new(MonitorConfig::default(), provider, EventBus::new(64))
    }

    struct SlowTelemetry;

    #[async_trait]
    impl TelemetryProvider for SlowTelemetry {
        async fn get_system_metrics(&self) -> Result<RawSystemMetrics, ProbeError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(RawSystemMetrics::default())
        }

        async fn get_process_table(&self) -> Result<Vec<ProcessEntry>, ProbeError> {
            Ok(vec![process("editor", 10, 3.0)])
        }
    }

    #[tokio::test]
    async fn test_no_environment_before_first_capture() {
        let monitor = monitor_with(Arc::new(StaticTelemetryProvider::default()));
        assert!(monitor.get_current_environment().is_none());
        assert!(monitor.health_assessment().is_none());
        assert!(monitor.detect_changes(1.0).is_empty());
    }

    #[tokio::test]
    async fn test_resource_spike_detected() {
        let provider = Arc::new(StaticTelemetryProvider::new(metrics(10.0, 20.0), vec![]));
        let monitor = monitor_with(provider.clone());
        monitor.capture().await;

        provider.set_metrics(metrics(85.0, 90.0));
        monitor.capture().await;

        let changes = monitor.recent_changes(10);
        let cpu = changes
            .iter()
            .find(|c| c.subject == "cpu_percent")
            .expect("cpu change recorded");
        assert!(cpu.significance > 0.5);
        assert_eq!(cpu.change_type, ChangeType::Resource);
        assert_eq!(cpu.severity, Severity::High);
        assert!(changes.iter().any(|c| c.subject == "memory_percent"));

        let env = monitor.get_current_environment().unwrap();
        assert_eq!(env.metrics.cpu_percent, Some(85.0));
        assert!(!env.recent_changes.is_empty());
        assert!((env.resource_pressure.cpu - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sensitivity_scales_thresholds() {
        let provider = Arc::new(StaticTelemetryProvider::new(metrics(10.0, 20.0), vec![]));
        let monitor = monitor_with(provider.clone());
        monitor.capture().await;
        provider.set_metrics(metrics(25.0, 20.0));
        monitor.capture().await;

        assert!(monitor.detect_changes(1.0).is_empty());
        let sensitive = monitor.detect_changes(0.5);
        assert_eq!(sensitive.len(), 1);
        assert!((sensitive[0].significance - 0.15).abs() < 1e-9);
        // Below the cutoff, so not kept.
        assert!(monitor.recent_changes(10).is_empty());
    }

    #[tokio::test]
    async fn test_application_set_changes() {
        let provider = Arc::new(StaticTelemetryProvider::new(
            metrics(10.0, 20.0),
            vec![process("editor", 10, 3.0)],
        ));
        let monitor = monitor_with(provider.clone());
        monitor.capture().await;

        provider.set_processes(vec![process("browser", 11, 3.0)]);
        monitor.capture().await;

        let changes = monitor.recent_changes(10);
        let started = changes
            .iter()
            .find(|c| c.subject == "browser:11")
            .expect("start recorded");
        assert_eq!(started.significance, 0.5);
        let stopped = changes
            .iter()
            .find(|c| c.subject == "editor:10")
            .expect("stop recorded");
        assert_eq!(stopped.significance, 0.4);
    }

    #[tokio::test]
    async fn test_failed_probes_degrade_capture() {
        let provider = Arc::new(StaticTelemetryProvider::new(
            metrics(10.0, 20.0),
            vec![process("editor", 10, 3.0)],
        ));
        provider.fail_metrics();
        let monitor = monitor_with(provider.clone());

        let snapshot = monitor.capture().await;
        assert_eq!(snapshot.degraded_probes, vec!["system_metrics".to_string()]);
        assert_eq!(snapshot.metrics.cpu_percent, None);
        assert_eq!(snapshot.metrics.process_count, Some(1));
        assert_eq!(snapshot.health, HealthStatus::Excellent);
        assert_eq!(snapshot.applications.len(), 1);

        provider.fail_processes();
        let snapshot = monitor.capture().await;
        assert_eq!(snapshot.degraded_probes.len(), 2);
        // Last known applications carry over.
        assert_eq!(snapshot.applications.len(), 1);
        assert_eq!(monitor.stats().degraded_captures, 2);
    }

    #[tokio::test]
    async fn test_process_table_outage_invents_no_application_changes() {
        let provider = Arc::new(StaticTelemetryProvider::new(
            metrics(10.0, 20.0),
            vec![process("editor", 1, 3.0), process("browser", 2, 4.0)],
        ));
        let bus = EventBus::new(64);
        let monitor = EnvironmentMonitor::new(MonitorConfig::default(), provider.clone(), bus.clone());
        monitor.capture().await;
        let mut changes_rx = bus.subscribe();

        provider.fail_processes();
        let degraded = monitor.capture().await;
        assert_eq!(degraded.degraded_probes, vec!["process_table".to_string()]);
        let ids: Vec<String> = degraded.applications.iter().map(|a| a.id.to_string()).collect();
        assert_eq!(ids, vec!["browser:2".to_string(), "editor:1".to_string()]);
        assert!(monitor.recent_changes(100).is_empty());

        // Recovery with the same table is not a restart either.
        provider.set_processes(vec![process("editor", 1, 3.0), process("browser", 2, 4.0)]);
        monitor.capture().await;
        assert!(monitor.recent_changes(100).is_empty());
        assert_eq!(monitor.stats().changes_recorded, 0);

        while let Ok(event) = changes_rx.try_recv() {
            assert!(
                !matches!(event, ContextEvent::ChangeDetected { .. }),
                "unexpected change event: {:?}",
                event
            );
        }
    }

    #[tokio::test]
    async fn test_detect_changes_does_not_rerecord_captured_pair() {
        let provider = Arc::new(StaticTelemetryProvider::new(metrics(10.0, 20.0), vec![]));
        let bus = EventBus::new(64);
        let monitor = EnvironmentMonitor::new(MonitorConfig::default(), provider.clone(), bus.clone());
        monitor.capture().await;
        provider.set_metrics(metrics(85.0, 90.0));
        monitor.capture().await;

        let recorded = monitor.recent_changes(100);
        assert_eq!(recorded.len(), 2);
        let mut events = bus.subscribe();

        let fired = monitor.detect_changes(1.0);
        assert_eq!(fired.len(), 2);
        assert_eq!(monitor.recent_changes(100).len(), 2);
        assert_eq!(monitor.stats().changes_recorded, 2);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let monitor = monitor_with(Arc::new(SlowTelemetry));
        let snapshot = monitor.capture().await;
        assert_eq!(snapshot.degraded_probes, vec!["system_metrics".to_string()]);
        assert_eq!(snapshot.applications.len(), 1);
    }

    #[tokio::test]
    async fn test_hierarchy_and_communication_relationships() {
        let mut parent = process("shell", 100, 0.0);
        parent.open_resources = vec!["/tmp/session.sock".to_string()];
        let mut child = process("worker", 101, 0.0);
        child.parent_pid = Some(100);
        child.open_resources = vec!["/tmp/session.sock".to_string()];

        let provider = Arc::new(StaticTelemetryProvider::new(metrics(10.0, 20.0), vec![parent, child]));
        let monitor = monitor_with(provider);
        monitor.capture().await;

        let relationships = monitor.relationships();
        let kinds: Vec<_> = relationships.iter().map(|r| r.key.kind).collect();
        assert!(kinds.contains(&RelationshipKind::Hierarchy));
        assert!(kinds.contains(&RelationshipKind::Communication));
        assert!(!kinds.contains(&RelationshipKind::ResourceSharing));
        assert_eq!(relationships[0].strength, 0.9);

        let changes = monitor.recent_changes(10);
        assert!(changes.iter().any(|c| c.change_type == ChangeType::Relationship));
    }

    #[tokio::test]
    async fn test_endpoint_match_is_communication() {
        let mut client = process("client", 1, 0.0);
        client.connections = vec![Connection {
            local: "127.0.0.1:50000".to_string(),
            remote: Some("127.0.0.1:5432".to_string()),
        }];
        let mut server = process("postgres", 2, 0.0);
        server.connections = vec![Connection {
            local: "127.0.0.1:5432".to_string(),
            remote: None,
        }];

        let monitor = monitor_with(Arc::new(StaticTelemetryProvider::default()));
        let now = Utc::now();
        let to_record = |p: &ProcessEntry| ApplicationRecord {
            id: AppId::new(&p.name, p.pid),
            name: p.name.clone(),
            pid: p.pid,
            parent_pid: p.parent_pid,
            cpu_percent: p.cpu_percent,
            memory_percent: p.memory_percent,
            open_resources: p.open_resources.clone(),
            connections: p.connections.clone(),
            first_seen: now,
            last_seen: now,
        };
        let fired = monitor.discover_relationships(&[to_record(&client), to_record(&server)]);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].key.kind, RelationshipKind::Communication);
        assert_eq!(fired[0].evidence, vec!["connection to 127.0.0.1:5432".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_evidence_never_weakens() {
        let provider = Arc::new(StaticTelemetryProvider::new(
            metrics(40.0, 30.0),
            vec![process("compiler", 1, 30.0), process("linker", 2, 25.0)],
        ));
        let monitor = monitor_with(provider);

        let mut last: f64 = 0.0;
        for _ in 0..30 {
            monitor.capture().await;
            let sharing = monitor
                .relationships()
                .into_iter()
                .find(|r| r.key.kind == RelationshipKind::ResourceSharing)
                .expect("resource sharing relationship");
            assert!(sharing.strength >= last);
            assert!(sharing.strength <= 1.0);
            last = sharing.strength;
        }

        // Ten samples of activity unlock co-occurrence.
        assert!(monitor
            .relationships()
            .iter()
            .any(|r| r.key.kind == RelationshipKind::CoOccurrence));
    }

    #[tokio::test]
    async fn test_inactive_applications_evicted() {
        let monitor = monitor_with(Arc::new(StaticTelemetryProvider::default()));
        let t0 = Utc::now();
        monitor.ingest(t0, Some(metrics(5.0, 5.0)), Some(vec![process("editor", 1, 2.0)]), vec![]);
        assert_eq!(monitor.stats().tracked_applications, 1);

        let later = t0 + chrono::Duration::minutes(10);
        monitor.ingest(later, Some(metrics(5.0, 5.0)), Some(vec![]), vec![]);
        assert_eq!(monitor.stats().tracked_applications, 0);
    }

    #[tokio::test]
    async fn test_health_assessment_recommendations() {
        let mut hot = metrics(95.0, 97.0);
        hot.load_average = Some([20.0, 10.0, 5.0]);
        let monitor = monitor_with(Arc::new(StaticTelemetryProvider::new(hot, vec![])));
        monitor.capture().await;

        let assessment = monitor.health_assessment().unwrap();
        assert_eq!(assessment.status, HealthStatus::Poor);
        assert_eq!(assessment.recommendations.len(), 3);
    }

    #[tokio::test]
    async fn test_change_history_is_bounded() {
        let config = MonitorConfig {
            change_capacity: 5,
            ..MonitorConfig::default()
        };
        let provider = Arc::new(StaticTelemetryProvider::new(metrics(0.0, 0.0), vec![]));
        let monitor = EnvironmentMonitor::new(config, provider.clone(), EventBus::new(64));
        for i in 0..20 {
            let cpu = if i % 2 == 0 { 0.0 } else { 90.0 };
            provider.set_metrics(metrics(cpu, 0.0));
            monitor.capture().await;
        }
        assert_eq!(monitor.recent_changes(100).len(), 5);
        assert_eq!(monitor.stats().changes_recorded, 19);
    }
}
