//! Cross-channel send arbitration
//!
//! Every channel asks the [`SendGate`] for a [`SendPermit`] before it loads
//! and sends a batch. A permit is granted when fewer than `max_parallel`
//! sends are in flight and no higher-priority channel has demand, i.e.
//! sendable records and no pause. This gives strict priority: a Background
//! batch never starts while High or Default records are waiting.
//!
//! A send already in flight is never preempted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

use logship_core::domain::Priority;

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    demand: [bool; 3],
}

/// Global send arbiter shared by the three channels
#[derive(Debug)]
pub struct SendGate {
    state: Mutex<GateState>,
    notify: Notify,
    max_parallel: usize,
}

impl SendGate {
    /// Creates a gate allowing `max_parallel` concurrent sends (at least one)
    pub fn new(max_parallel: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState::default()),
            notify: Notify::new(),
            max_parallel: max_parallel.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Whether `priority` currently announces demand
    pub fn has_demand(&self, priority: Priority) -> bool {
        self.lock().demand[priority.index()]
    }

    /// Announces or withdraws the demand of one channel
    pub fn set_demand(&self, priority: Priority, demand: bool) {
        let changed = {
            let mut state = self.lock();
            let slot = &mut state.demand[priority.index()];
            let changed = *slot != demand;
            *slot = demand;
            changed
        };
        if changed {
            trace!(%priority, demand, "Send demand changed");
            if !demand {
                self.notify.notify_waiters();
            }
        }
    }

    /// Grants a permit if one is available to `priority` right now
    pub fn try_acquire(self: &Arc<Self>, priority: Priority) -> Option<SendPermit> {
        let mut state = self.lock();
        if state.in_flight >= self.max_parallel {
            return None;
        }
        let blocked = Priority::DRAIN_ORDER
            .iter()
            .filter(|p| **p > priority)
            .any(|p| state.demand[p.index()]);
        if blocked {
            return None;
        }
        state.in_flight += 1;
        Some(SendPermit {
            gate: Arc::clone(self),
            priority,
        })
    }

    /// Waits until a permit is available to `priority`
    pub async fn acquire(self: &Arc<Self>, priority: Priority) -> SendPermit {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire(priority) {
                return permit;
            }
            notified.await;
        }
    }

    fn release(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }
}

/// Right to run one send; released on drop
#[derive(Debug)]
pub struct SendPermit {
    gate: Arc<SendGate>,
    priority: Priority,
}

impl SendPermit {
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl Drop for SendPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
