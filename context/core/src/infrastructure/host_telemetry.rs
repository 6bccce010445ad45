// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Host Telemetry Provider
//!
//! Reads live resource and process state from the local host through
//! `sysinfo`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements the `TelemetryProvider` port against the host OS
//!
//! CPU usage is a delta between two refreshes, so the provider keeps one
//! `System` alive across captures. The very first reading after construction
//! is primed in `new()`. Open resources and connections are not reported by
//! `sysinfo` and stay empty; relationship discovery then relies on the
//! hierarchy, resource-sharing and co-occurrence heuristics.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{Disks, Networks, System};

use crate::domain::snapshot::NetworkCounters;
use crate::domain::telemetry::{ProbeError, ProcessEntry, RawSystemMetrics, TelemetryProvider};

pub struct HostTelemetryProvider {
    system: Arc<Mutex<System>>,
}

impl HostTelemetryProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    /// Run a blocking read against the shared `System` off the async workers.
    async fn read<T, F>(&self, probe: &'static str, read: F) -> Result<T, ProbeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut System) -> Result<T, ProbeError> + Send + 'static,
    {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || read(&mut system.lock()))
            .await
            .map_err(|e| ProbeError::Failed(format!("{} probe task failed: {}", probe, e)))?
    }
}

impl Default for HostTelemetryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryProvider for HostTelemetryProvider {
    async fn get_system_metrics(&self) -> Result<RawSystemMetrics, ProbeError> {
        self.read("system metrics", |system| {
            system.refresh_cpu();
            system.refresh_memory();

            let cpus = system.cpus();
            let cpu_percent = (!cpus.is_empty()).then(|| {
                cpus.iter().map(|cpu| f64::from(cpu.cpu_usage())).sum::<f64>() / cpus.len() as f64
            });
            let memory_percent = percent(system.used_memory(), system.total_memory());

            let load = System::load_average();
            let load_average = [load.one, load.five, load.fifteen];

            Ok(RawSystemMetrics {
                cpu_percent,
                memory_percent,
                disk_percent: disk_percent(),
                network_io: Some(network_counters()),
                load_average: load_average
                    .iter()
                    .all(|v| v.is_finite())
                    .then_some(load_average),
                process_count: None,
                thread_count: None,
                cpu_cores: u32::try_from(cpus.len()).ok().filter(|n| *n > 0),
            })
        })
        .await
    }

    async fn get_process_table(&self) -> Result<Vec<ProcessEntry>, ProbeError> {
        self.read("process table", |system| {
            system.refresh_memory();
            system.refresh_processes();

            let total_memory = system.total_memory();
            let cores = system.cpus().len().max(1) as f64;
            let mut entries: Vec<ProcessEntry> = system
                .processes()
                .iter()
                .map(|(pid, process)| ProcessEntry {
                    pid: pid.as_u32(),
                    parent_pid: process.parent().map(|p| p.as_u32()),
                    name: process.name().to_string(),
                    // sysinfo reports per-core percentages; normalize to the host.
                    cpu_percent: f64::from(process.cpu_usage()) / cores,
                    memory_percent: percent(process.memory(), total_memory).unwrap_or(0.0),
                    open_resources: Vec::new(),
                    connections: Vec::new(),
                })
                .collect();
            entries.sort_by_key(|entry| entry.pid);
            Ok(entries)
        })
        .await
    }
}

fn percent(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| used as f64 / total as f64 * 100.0)
}

/// Used share across all mounted disks.
fn disk_percent() -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .list()
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
    percent(total.saturating_sub(available), total)
}

/// Cumulative counters summed over every interface.
fn network_counters() -> NetworkCounters {
    let networks = Networks::new_with_refreshed_list();
    networks
        .iter()
        .fold(NetworkCounters::default(), |mut counters, (_, data)| {
            counters.bytes_sent += data.total_transmitted();
            counters.bytes_received += data.total_received();
            counters.packets_sent += data.total_packets_transmitted();
            counters.packets_received += data.total_packets_received();
            counters
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of_zero_total_is_unknown() {
        assert_eq!(percent(10, 0), None);
        assert_eq!(percent(25, 100), Some(25.0));
    }

    #[tokio::test]
    async fn test_reads_live_host() {
        let provider = HostTelemetryProvider::new();

        let metrics = provider.get_system_metrics().await.unwrap();
        assert!(metrics.cpu_cores.unwrap_or(1) >= 1);
        if let Some(memory) = metrics.memory_percent {
            assert!((0.0..=100.0).contains(&memory));
        }

        let processes = provider.get_process_table().await.unwrap();
        let own = std::process::id();
        assert!(processes.iter().any(|p| p.pid == own));
        assert!(processes.windows(2).all(|w| w[0].pid <= w[1].pid));
    }
}
