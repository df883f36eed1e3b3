//! # Owned, cancelable periodic task.
//!
//! [`spawn_periodic`] runs one [`Tick`] job on a fixed interval inside its own tokio
//! task and returns a [`PeriodicHandle`] owned by the caller. There is no ambient
//! timer state: dropping every reference to the job and cancelling the handle is all
//! it takes to stop it.
//!
//! ## Loop
//! ```text
//! start ──► sleep(period) ──► tick ──► sleep(period) ──► tick ──► ...
//!             │                 │
//!             └─ cancelled? ────┴──► exit (done token cancelled)
//! ```
//!
//! ## Rules
//! - The first tick fires one full period after start.
//! - Missed ticks are skipped, not bursted.
//! - `stop()` is synchronous and idempotent; a tick body that is already running
//!   finishes, and [`PeriodicHandle::stopped`] resolves right after it.
//! - No tick starts after `stop()` returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// One unit of periodic work.
#[async_trait]
pub(crate) trait Tick: Send + Sync + 'static {
    /// Runs one tick. `ctx` is cancelled when the handle is stopped; long
    /// operations should bail out on it.
    async fn tick(&self, ctx: &CancellationToken);
}

/// Handle to a running periodic task.
#[derive(Debug)]
pub struct PeriodicHandle {
    name: &'static str,
    token: CancellationToken,
    done: CancellationToken,
    stopped: AtomicBool,
}

impl PeriodicHandle {
    /// Cancels future ticks.
    ///
    /// Returns `true` only for the call that actually stopped the timer.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// True once [`stop`](Self::stop) was called (or the parent token was cancelled).
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || self.token.is_cancelled()
    }

    /// Resolves once the timer loop has exited.
    pub async fn stopped(&self) {
        self.done.cancelled().await;
    }

    /// Name of the periodic job.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Spawns `job` on a `period` interval as a child of `parent`.
///
/// Must be called from within a tokio runtime. `period` must be non-zero.
pub(crate) fn spawn_periodic(
    name: &'static str,
    job: Arc<dyn Tick>,
    period: Duration,
    parent: &CancellationToken,
) -> PeriodicHandle {
    let token = parent.child_token();
    let done = CancellationToken::new();
    let start = Instant::now() + period;

    let ctx = token.clone();
    let done_guard = done.clone().drop_guard();
    tokio::spawn(async move {
        let _done = done_guard;
        let mut interval = time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = interval.tick() => {}
            }
            job.tick(&ctx).await;
        }
    });

    PeriodicHandle {
        name,
        token,
        done,
        stopped: AtomicBool::new(false),
    }
}
