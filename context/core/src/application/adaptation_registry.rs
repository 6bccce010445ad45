// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adaptation Registry
//!
//! Maps each [`AdaptationKind`] to the callbacks the host agent registered
//! for it and dispatches adaptations through the rate limiter.
//!
//! Dispatch is all-or-nothing from the caller's point of view: the
//! adaptation counts as applied only when every callback returned
//! `Ok(true)`. A callback that errors, returns `false` or panics is a
//! callback failure; it is logged and reported in the outcome, never
//! propagated.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Callback registry and rate-limited dispatch

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::rate_limiter::AdaptationRateLimiter;
use crate::domain::adaptation::{Adaptation, AdaptationKind, AdaptationOutcome};

/// Host callback. `Ok(true)` means the adaptation took effect.
pub type AdaptationCallback = Arc<dyn Fn(&Adaptation) -> anyhow::Result<bool> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptationStats {
    pub applied: u64,
    pub rate_limited: u64,
    pub no_handler: u64,
    pub rejected: u64,
}

pub struct AdaptationRegistry {
    callbacks: RwLock<HashMap<AdaptationKind, Vec<AdaptationCallback>>>,
    limiter: AdaptationRateLimiter,
    stats: Mutex<AdaptationStats>,
}

impl AdaptationRegistry {
    pub fn new(max_per_minute: u32) -> Self {
        Self::with_limiter(AdaptationRateLimiter::new(max_per_minute))
    }

    pub fn with_limiter(limiter: AdaptationRateLimiter) -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            limiter,
            stats: Mutex::new(AdaptationStats::default()),
        }
    }

    pub fn register<F>(&self, kind: AdaptationKind, callback: F)
    where
        F: Fn(&Adaptation) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.register_shared(kind, Arc::new(callback));
    }

    pub fn register_shared(&self, kind: AdaptationKind, callback: AdaptationCallback) {
        self.callbacks.write().entry(kind).or_default().push(callback);
        debug!(%kind, "Registered adaptation callback");
    }

    pub fn handler_count(&self, kind: AdaptationKind) -> usize {
        self.callbacks.read().get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn stats(&self) -> AdaptationStats {
        self.stats.lock().clone()
    }

    pub fn limiter(&self) -> &AdaptationRateLimiter {
        &self.limiter
    }

    /// Rate-limit, then run every callback registered for the adaptation's kind.
    pub fn dispatch(&self, adaptation: &Adaptation) -> AdaptationOutcome {
        let outcome = self.dispatch_inner(adaptation);
        let mut stats = self.stats.lock();
        match &outcome {
            AdaptationOutcome::Applied { .. } => stats.applied += 1,
            AdaptationOutcome::RateLimited => stats.rate_limited += 1,
            AdaptationOutcome::NoHandler => stats.no_handler += 1,
            AdaptationOutcome::Rejected { .. } => stats.rejected += 1,
        }
        outcome
    }

    fn dispatch_inner(&self, adaptation: &Adaptation) -> AdaptationOutcome {
        // Snapshot the list so callbacks run without holding the registry lock.
        let callbacks = self
            .callbacks
            .read()
            .get(&adaptation.kind)
            .cloned()
            .unwrap_or_default();

        if callbacks.is_empty() {
            debug!(kind = %adaptation.kind, "No callback registered for adaptation");
            return AdaptationOutcome::NoHandler;
        }

        if !self.limiter.try_acquire(adaptation.kind) {
            debug!(kind = %adaptation.kind, "Adaptation rate limited");
            return AdaptationOutcome::RateLimited;
        }

        let mut failures = 0;
        for callback in &callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(adaptation))) {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    failures += 1;
                    warn!(kind = %adaptation.kind, "Adaptation callback declined");
                }
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(kind = %adaptation.kind, "Adaptation callback failed: {:#}", e);
                }
                Err(_) => {
                    failures += 1;
                    warn!(kind = %adaptation.kind, "Adaptation callback panicked");
                }
            }
        }

        if failures == 0 {
            AdaptationOutcome::Applied {
                callbacks: callbacks.len(),
            }
        } else {
            AdaptationOutcome::Rejected {
                failures,
                callbacks: callbacks.len(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::adaptation::AdaptationPayload;
    use crate::domain::optimization::Strategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn adaptation(kind: AdaptationKind) -> Adaptation {
        Adaptation::new(
            kind,
            "switch strategy",
            AdaptationPayload::Strategy {
                strategy: Strategy::Balanced,
            },
            0.8,
        )
    }

    #[test]
    fn test_missing_handler_reported() {
        let registry = AdaptationRegistry::new(10);
        assert_eq!(
            registry.dispatch(&adaptation(AdaptationKind::StrategySwitch)),
            AdaptationOutcome::NoHandler
        );
        assert_eq!(registry.stats().no_handler, 1);
    }

    #[test]
    fn test_all_callbacks_must_succeed() {
        let registry = AdaptationRegistry::new(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register(
            AdaptationKind::StrategySwitch,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            },
        );
        assert!(registry
            .dispatch(&adaptation(AdaptationKind::StrategySwitch))
            .is_applied());

        registry.register(AdaptationKind::StrategySwitch, |_| Ok(false));
        registry.register(
            AdaptationKind::StrategySwitch,
            |_| Err(anyhow::anyhow!("device busy")),
        );
        assert_eq!(
            registry.dispatch(&adaptation(AdaptationKind::StrategySwitch)),
            AdaptationOutcome::Rejected {
                failures: 2,
                callbacks: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let registry = AdaptationRegistry::new(10);
        registry.register(
            AdaptationKind::FocusShift,
            |_| panic!("callback bug"),
        );
        assert!(matches!(
            registry.dispatch(&adaptation(AdaptationKind::FocusShift)),
            AdaptationOutcome::Rejected { failures: 1, .. }
        ));
    }

    #[test]
    fn test_rate_limit_applies_per_kind() {
        let registry = AdaptationRegistry::new(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register(
            AdaptationKind::ResourceRelief,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            },
        );

        let outcomes: Vec<_> = (0..5)
            .map(|_| registry.dispatch(&adaptation(AdaptationKind::ResourceRelief)))
            .collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_applied()).count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stats().rate_limited, 3);
    }
}
