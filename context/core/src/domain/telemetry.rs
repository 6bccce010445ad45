// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Telemetry Provider Port
//!
//! The monitor never probes the OS itself. It asks a [`TelemetryProvider`]
//! for system metrics and the process table, each call wrapped in a timeout
//! by the caller. Either call may fail or return partial data.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer (port)
//! - **Purpose:** Boundary to host telemetry collection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::snapshot::{Connection, NetworkCounters};

/// Raw metrics as reported by the provider. Absent fields mean the probe
/// could not read that value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSystemMetrics {
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_percent: Option<f64>,
    #[serde(default)]
    pub disk_percent: Option<f64>,
    #[serde(default)]
    pub network_io: Option<NetworkCounters>,
    #[serde(default)]
    pub load_average: Option<[f64; 3]>,
    #[serde(default)]
    pub process_count: Option<u32>,
    #[serde(default)]
    pub thread_count: Option<u32>,
    #[serde(default)]
    pub cpu_cores: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    #[serde(default)]
    pub parent_pid: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub open_resources: Vec<String>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Probe unavailable: {0}")]
    Unavailable(String),

    #[error("Probe failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    async fn get_system_metrics(&self) -> Result<RawSystemMetrics, ProbeError>;

    async fn get_process_table(&self) -> Result<Vec<ProcessEntry>, ProbeError>;
}
