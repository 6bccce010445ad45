// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Telemetry Providers
//!
//! Providers that feed the monitor from data supplied by the embedding agent
//! or a recording. Live host probing is in [`super::host_telemetry`].
//!
//! - [`StaticTelemetryProvider`]: holds the latest values pushed by the host
//!   agent; probes can be marked unavailable to exercise degraded captures.
//! - [`ScriptedTelemetryProvider`]: replays recorded frames, one frame per
//!   capture, holding the last frame once the script is exhausted.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::telemetry::{ProbeError, ProcessEntry, RawSystemMetrics, TelemetryProvider};

/// One recorded capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default)]
    pub metrics: RawSystemMetrics,
    #[serde(default)]
    pub processes: Vec<ProcessEntry>,
}

#[derive(Default)]
pub struct StaticTelemetryProvider {
    metrics: RwLock<Option<RawSystemMetrics>>,
    processes: RwLock<Option<Vec<ProcessEntry>>>,
}

impl StaticTelemetryProvider {
    pub fn new(metrics: RawSystemMetrics, processes: Vec<ProcessEntry>) -> Self {
        Self {
            metrics: RwLock::new(Some(metrics)),
            processes: RwLock::new(Some(processes)),
        }
    }

    pub fn set_metrics(&self, metrics: RawSystemMetrics) {
        *self.metrics.write() = Some(metrics);
    }

    pub fn set_processes(&self, processes: Vec<ProcessEntry>) {
        *self.processes.write() = Some(processes);
    }

    /// Make the metrics probe fail until new metrics are set.
    pub fn fail_metrics(&self) {
        *self.metrics.write() = None;
    }

    /// Make the process probe fail until a new table is set.
    pub fn fail_processes(&self) {
        *self.processes.write() = None;
    }
}

#[async_trait]
impl TelemetryProvider for StaticTelemetryProvider {
    async fn get_system_metrics(&self) -> Result<RawSystemMetrics, ProbeError> {
        self.metrics
            .read()
            .clone()
            .ok_or_else(|| ProbeError::Unavailable("system metrics".to_string()))
    }

    async fn get_process_table(&self) -> Result<Vec<ProcessEntry>, ProbeError> {
        self.processes
            .read()
            .clone()
            .ok_or_else(|| ProbeError::Unavailable("process table".to_string()))
    }
}

pub struct ScriptedTelemetryProvider {
    frames: Vec<TelemetryFrame>,
    cursor: Mutex<usize>,
    current: RwLock<TelemetryFrame>,
}

impl ScriptedTelemetryProvider {
    pub fn new(frames: Vec<TelemetryFrame>) -> Self {
        let current = frames.first().cloned().unwrap_or_default();
        Self {
            frames,
            cursor: Mutex::new(0),
            current: RwLock::new(current),
        }
    }

    /// Load a JSON array of frames.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let frames: Vec<TelemetryFrame> = serde_json::from_str(&content)?;
        Ok(Self::new(frames))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn exhausted(&self) -> bool {
        *self.cursor.lock() >= self.frames.len()
    }
}

#[async_trait]
impl TelemetryProvider for ScriptedTelemetryProvider {
    /// Advances the script; the process table call returns the same frame.
    async fn get_system_metrics(&self) -> Result<RawSystemMetrics, ProbeError> {
        let mut cursor = self.cursor.lock();
        if let Some(frame) = self.frames.get(*cursor) {
            *self.current.write() = frame.clone();
            *cursor += 1;
        }
        Ok(self.current.read().metrics.clone())
    }

    async fn get_process_table(&self) -> Result<Vec<ProcessEntry>, ProbeError> {
        Ok(self.current.read().processes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(cpu: f64) -> TelemetryFrame {
        TelemetryFrame {
            metrics: RawSystemMetrics {
                cpu_percent: Some(cpu),
                ..Default::default()
            },
            processes: vec![],
        }
    }

    #[tokio::test]
    async fn test_static_provider_failure_toggle() {
        let provider = StaticTelemetryProvider::new(RawSystemMetrics::default(), vec![]);
        assert!(provider.get_system_metrics().await.is_ok());
        provider.fail_metrics();
        assert!(provider.get_system_metrics().await.is_err());
        assert!(provider.get_process_table().await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_provider_holds_last_frame() {
        let provider = ScriptedTelemetryProvider::new(vec![frame(10.0), frame(80.0)]);
        assert_eq!(provider.get_system_metrics().await.unwrap().cpu_percent, Some(10.0));
        assert_eq!(provider.get_system_metrics().await.unwrap().cpu_percent, Some(80.0));
        assert!(provider.exhausted());
        assert_eq!(provider.get_system_metrics().await.unwrap().cpu_percent, Some(80.0));
    }
}
