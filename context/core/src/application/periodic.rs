// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Periodic Loop Runner
//!
//! Every background component (monitor, optimizer, decision engine, history
//! tracker) runs one of these: a tokio task that ticks at a fixed cadence and
//! exits on its own cancellation token.
//!
//! - A cycle returning `Err` or panicking is logged and skipped; the loop
//!   keeps ticking.
//! - `start()` on a running loop is a no-op.
//! - `stop()` cancels, then joins with a bounded timeout. A loop that does not
//!   finish in time is aborted.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Shared lifecycle for background cycles

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one running loop.
pub struct LoopHandle {
    name: &'static str,
    running: Mutex<Option<RunningLoop>>,
}

impl LoopHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the loop. Returns false if it was already running.
    pub fn start<F, Fut>(&self, period: Duration, mut cycle: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            if !existing.handle.is_finished() {
                debug!(component = self.name, "Loop already running");
                return false;
            }
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let name = self.name;

        let handle = tokio::spawn(async move {
            info!(component = name, period_ms = period.as_millis() as u64, "Starting background loop");

            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match AssertUnwindSafe(cycle()).catch_unwind().await {
                            Ok(Ok(())) => debug!(component = name, "Cycle completed"),
                            Ok(Err(e)) => warn!(component = name, "Cycle failed: {:#}", e),
                            Err(_) => warn!(component = name, "Cycle panicked; continuing at next tick"),
                        }
                    }
                    _ = child.cancelled() => {
                        info!(component = name, "Shutdown signal received");
                        break;
                    }
                }
            }

            info!(component = name, "Background loop stopped");
        });

        *running = Some(RunningLoop { token, handle });
        true
    }

    /// Cancel and join. Returns true if the loop finished within `timeout`.
    pub async fn stop(&self, timeout: Duration) -> bool {
        let running = self.running.lock().take();
        let Some(RunningLoop { token, mut handle }) = running else {
            return true;
        };

        token.cancel();
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(component = self.name, ?timeout, "Loop did not stop in time; aborting");
                handle.abort();
                false
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failing_and_panicking_cycles() {
        let handle = LoopHandle::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        assert!(handle.start(Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                match n % 3 {
                    0 => Ok(()),
                    1 => Err(anyhow::anyhow!("bad cycle")),
                    _ => panic!("cycle blew up"),
                }
            }
        }));

        tokio::time::sleep(Duration::from_millis(7500)).await;

        assert!(calls.load(Ordering::SeqCst) >= 6);
        assert!(handle.is_running());
        assert!(handle.stop(Duration::from_secs(1)).await);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_without_start_ok() {
        let handle = LoopHandle::new("idempotent");
        assert!(handle.stop(Duration::from_millis(10)).await);
        assert!(handle.start(Duration::from_secs(60), || async { Ok(()) }));
        assert!(!handle.start(Duration::from_secs(60), || async { Ok(()) }));
        assert!(handle.stop(Duration::from_secs(1)).await);
        assert!(handle.start(Duration::from_secs(60), || async { Ok(()) }));
        assert!(handle.stop(Duration::from_secs(1)).await);
    }
}
