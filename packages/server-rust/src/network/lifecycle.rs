//! Server lifecycle: health state machine and in-flight request tracking.
//!
//! The phase lives in an `ArcSwap` so probes read it without locking.
//! Requests hold a [`RequestGuard`]; the last guard to drop wakes anyone
//! waiting in [`Lifecycle::drain`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::info;

/// Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Starting,
    Ready,
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug)]
struct Phase {
    state: HealthState,
    since: Instant,
}

impl Phase {
    fn new(state: HealthState) -> Arc<Self> {
        Arc::new(Self {
            state,
            since: Instant::now(),
        })
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Shared lifecycle handle. One per server.
#[derive(Debug)]
pub struct Lifecycle {
    phase: ArcSwap<Phase>,
    in_flight: Arc<InFlight>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ArcSwap::new(Phase::new(HealthState::Starting)),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    #[must_use]
    pub fn state(&self) -> HealthState {
        self.phase.load().state
    }

    /// Time spent in the current state.
    #[must_use]
    pub fn state_age(&self) -> Duration {
        self.phase.load().since.elapsed()
    }

    /// `Starting -> Ready`. Has no effect in any other state.
    pub fn mark_ready(&self) {
        self.transition(HealthState::Starting, HealthState::Ready);
    }

    /// `Starting | Ready -> Draining`. Readiness probes fail from here on.
    pub fn begin_drain(&self) {
        if !self.transition(HealthState::Ready, HealthState::Draining) {
            self.transition(HealthState::Starting, HealthState::Draining);
        }
    }

    fn transition(&self, from: HealthState, to: HealthState) -> bool {
        let current = self.phase.load();
        if current.state != from {
            return false;
        }
        let previous = self.phase.compare_and_swap(&current, Phase::new(to));
        let swapped = Arc::ptr_eq(&*previous, &*current);
        if swapped {
            info!(from = from.as_str(), to = to.as_str(), "lifecycle transition");
        }
        swapped
    }

    /// Counts one request as in flight until the guard drops.
    #[must_use]
    pub fn track(&self) -> RequestGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for in-flight requests to finish.
    ///
    /// On success the state becomes `Stopped` and `true` is returned; on
    /// timeout the state stays `Draining`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.in_flight.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(timeout, idle).await.is_err() {
            return false;
        }
        self.transition(HealthState::Draining, HealthState::Stopped);
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one request as in flight. Dropping it, also during unwinding,
/// releases the slot.
#[derive(Debug)]
pub struct RequestGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
