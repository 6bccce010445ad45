// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Context Events
//
// In-memory event streaming over a tokio broadcast channel. Publishing never
// blocks: slow subscribers lag and lose the oldest events instead of applying
// backpressure to the monitor or optimizer loops.

use crate::domain::change::EnvironmentChange;
use crate::domain::events::ContextEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to context events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ContextEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ContextEvent) {
        debug!(event_type = event.event_type(), "Publishing context event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all context events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to detected environment changes only
    pub fn subscribe_changes(&self) -> ChangeEventReceiver {
        ChangeEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all context events
pub struct EventReceiver {
    receiver: broadcast::Receiver<ContextEvent>,
}

impl EventReceiver {
    /// Receive the next event
    pub async fn recv(&mut self) -> Result<ContextEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<ContextEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to `ChangeDetected` events
pub struct ChangeEventReceiver {
    receiver: broadcast::Receiver<ContextEvent>,
}

impl ChangeEventReceiver {
    /// Receive the next environment change, skipping other events.
    /// Lag is logged and skipped rather than surfaced.
    pub async fn recv(&mut self) -> Result<EnvironmentChange, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(ContextEvent::ChangeDetected { change }) => return Ok(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Change receiver lagged by {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(EventBusError::Closed),
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event bus closed")]
    Closed,

    #[error("Receiver lagged by {0} events")]
    Lagged(u64),

    #[error("No events available")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::change::ChangeType;
    use crate::domain::snapshot::HealthStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.publish(ContextEvent::SnapshotCaptured {
            health: HealthStatus::Good,
            application_count: 3,
            degraded_probes: vec![],
            captured_at: Utc::now(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "SnapshotCaptured");
    }

    #[tokio::test]
    async fn test_change_receiver_filters() {
        let bus = EventBus::new(16);
        let mut changes = bus.subscribe_changes();

        bus.publish(ContextEvent::PatternsMined {
            detected: 1,
            total_patterns: 1,
            mined_at: Utc::now(),
        });
        bus.publish(ContextEvent::ChangeDetected {
            change: EnvironmentChange::new(
                ChangeType::Resource,
                "cpu_percent",
                "cpu rose",
                None,
                None,
                0.7,
                Utc::now(),
            ),
        });

        let change = changes.recv().await.unwrap();
        assert_eq!(change.subject, "cpu_percent");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(ContextEvent::PatternsMined {
            detected: 0,
            total_patterns: 0,
            mined_at: Utc::now(),
        });
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(4);
        let mut receiver = bus.subscribe();
        assert_eq!(receiver.try_recv().unwrap_err(), EventBusError::Empty);
    }
}
