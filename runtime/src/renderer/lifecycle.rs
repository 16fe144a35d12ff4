// Copyright 2026 Xupopter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser lifecycle: one lazily launched browser, shared through leases.
//!
//! The first [`BrowserManager::acquire`] launches the browser. Every acquire
//! and every lease release refreshes the idle clock. A watchdog task tears the
//! browser down once no lease is outstanding and the idle timeout has elapsed
//! since the last activity, so a long-running recipe never loses its browser.

use super::{BrowserLauncher, RenderContext, Renderer};
use anyhow::Result;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default idle time before the browser is shut down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

struct Slot {
    renderer: Option<Arc<dyn Renderer>>,
    /// Bumped on every launch so a stale watchdog never tears down a newer browser.
    generation: u64,
}

struct LeaseState {
    outstanding: usize,
    last_activity: Instant,
}

struct LeaseTracker {
    state: StdMutex<LeaseState>,
}

impl LeaseTracker {
    fn new() -> Self {
        Self {
            state: StdMutex::new(LeaseState {
                outstanding: 0,
                last_activity: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn acquire(&self) {
        let mut state = self.lock();
        state.outstanding += 1;
        state.last_activity = Instant::now();
    }

    fn release(&self) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.last_activity = Instant::now();
    }

    fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Time left before the browser counts as idle. Zero means idle now.
    fn until_idle(&self, timeout: Duration) -> Duration {
        let state = self.lock();
        if state.outstanding > 0 {
            return timeout;
        }
        timeout.saturating_sub(state.last_activity.elapsed())
    }
}

/// Owns the shared browser handle and its idle teardown.
pub struct BrowserManager {
    launcher: Arc<dyn BrowserLauncher>,
    idle_timeout: Duration,
    slot: Arc<Mutex<Slot>>,
    leases: Arc<LeaseTracker>,
}

impl BrowserManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, idle_timeout: Duration) -> Self {
        Self {
            launcher,
            idle_timeout,
            slot: Arc::new(Mutex::new(Slot {
                renderer: None,
                generation: 0,
            })),
            leases: Arc::new(LeaseTracker::new()),
        }
    }

    /// Borrow the browser, launching it first if needed.
    pub async fn acquire(&self) -> Result<BrowserLease> {
        let mut slot = self.slot.lock().await;

        let renderer = match &slot.renderer {
            Some(renderer) => Arc::clone(renderer),
            None => {
                let renderer = self.launcher.launch().await?;
                slot.generation += 1;
                slot.renderer = Some(Arc::clone(&renderer));
                self.spawn_watchdog(slot.generation);
                renderer
            }
        };

        // Counted while the slot is still locked so the watchdog cannot
        // observe an idle browser that is about to be handed out.
        self.leases.acquire();

        Ok(BrowserLease {
            renderer,
            tracker: Arc::clone(&self.leases),
        })
    }

    /// Whether a browser is currently running.
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.renderer.is_some()
    }

    /// Number of leases not yet released.
    pub fn outstanding_leases(&self) -> usize {
        self.leases.outstanding()
    }

    /// Shut the browser down now, whatever the idle clock says.
    pub async fn shutdown(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        slot.generation += 1;
        if let Some(renderer) = slot.renderer.take() {
            tracing::info!("shutting down browser");
            renderer.shutdown().await?;
        }
        Ok(())
    }

    fn spawn_watchdog(&self, generation: u64) {
        let slot = Arc::clone(&self.slot);
        let leases = Arc::clone(&self.leases);
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(leases.until_idle(idle_timeout)).await;

                let mut slot = slot.lock().await;
                if slot.generation != generation || slot.renderer.is_none() {
                    return;
                }
                if !leases.until_idle(idle_timeout).is_zero() {
                    continue;
                }

                if let Some(renderer) = slot.renderer.take() {
                    tracing::info!("turning off browser to free resources");
                    if let Err(e) = renderer.shutdown().await {
                        tracing::warn!("browser shutdown failed: {e:#}");
                    }
                }
                return;
            }
        });
    }
}

/// A borrowed browser. The idle clock restarts when the lease is dropped.
pub struct BrowserLease {
    renderer: Arc<dyn Renderer>,
    tracker: Arc<LeaseTracker>,
}

impl BrowserLease {
    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    /// Open a new page on the leased browser.
    pub async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.renderer.new_context().await
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        self.tracker.release();
    }
}
