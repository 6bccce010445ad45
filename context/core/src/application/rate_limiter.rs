// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptation Rate Limiter
//!
//! Sliding-log limiter: at most `max_per_window` grants per adaptation kind
//! in any rolling window. The check and the slot reservation happen under
//! one lock, so concurrent callers cannot overshoot. A denied attempt is
//! dropped, never queued.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cap side effects per adaptation kind

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::domain::adaptation::AdaptationKind;

pub const RATE_WINDOW: Duration = Duration::from_secs(60);

pub struct AdaptationRateLimiter {
    max_per_window: u32,
    window: Duration,
    grants: Mutex<HashMap<AdaptationKind, VecDeque<Instant>>>,
}

impl AdaptationRateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self::with_window(max_per_minute, RATE_WINDOW)
    }

    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Reserve a slot for `kind` now.
    pub fn try_acquire(&self, kind: AdaptationKind) -> bool {
        self.try_acquire_at(kind, Instant::now())
    }

    /// Reserve a slot for `kind` at `now`.
    pub fn try_acquire_at(&self, kind: AdaptationKind, now: Instant) -> bool {
        let mut grants = self.grants.lock();
        let log = grants.entry(kind).or_default();

        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.max_per_window as usize {
            return false;
        }
        log.push_back(now);
        true
    }

    /// Grants still inside the window for `kind`.
    pub fn in_window(&self, kind: AdaptationKind) -> usize {
        let now = Instant::now();
        self.grants
            .lock()
            .get(&kind)
            .map(|log| {
                log.iter()
                    .filter(|t| now.saturating_duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }
}
