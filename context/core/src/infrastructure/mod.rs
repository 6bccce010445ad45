// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements mod

pub mod event_bus;
pub mod host_telemetry;
pub mod persistence;
pub mod telemetry;

pub use event_bus::{ChangeEventReceiver, EventBus, EventBusError, EventReceiver};
pub use host_telemetry::HostTelemetryProvider;
pub use persistence::{InMemoryPersistenceStore, LocalDirectoryStore};
pub use telemetry::{ScriptedTelemetryProvider, StaticTelemetryProvider, TelemetryFrame};
