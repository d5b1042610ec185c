//! Optimistic like/save toggles.
//!
//! A toggle changes local state immediately and the backend is brought in
//! line afterwards. Only one request per controller is in flight; toggles
//! made meanwhile just move the desired flag, and when the request returns
//! the controller sends one more if desired and confirmed still differ.
//! A failed request rolls the state back to the last confirmed one; toggles
//! made while that request was in flight are discarded along with it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::{EnvironmentId, InteractionKind};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{events::EventHub, gateway::BackendGateway, lifetime::Lifetime};

pub const TOGGLE_FAILURE_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionState {
    pub active: bool,
    pub count: u64,
}

impl InteractionState {
    pub fn new(active: bool, count: u64) -> Self {
        Self { active, count }
    }

    pub fn toggled(self) -> Self {
        if self.active {
            Self {
                active: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            Self {
                active: true,
                count: self.count + 1,
            }
        }
    }

    fn with_active(self, active: bool) -> Self {
        if self.active == active {
            self
        } else {
            self.toggled()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionSnapshot {
    pub state: InteractionState,
    /// A request is outstanding. Front-ends should not show a spinner for it.
    pub pending: bool,
}

struct Tracker {
    confirmed: InteractionState,
    desired: bool,
    in_flight: bool,
}

impl Tracker {
    fn displayed(&self) -> InteractionState {
        self.confirmed.with_active(self.desired)
    }

    fn snapshot(&self) -> InteractionSnapshot {
        InteractionSnapshot {
            state: self.displayed(),
            pending: self.in_flight,
        }
    }
}

pub struct InteractionController {
    environment_id: EnvironmentId,
    kind: InteractionKind,
    gateway: Arc<dyn BackendGateway>,
    events: EventHub,
    lifetime: Lifetime,
    tracker: Mutex<Tracker>,
    snapshots: watch::Sender<InteractionSnapshot>,
}

impl InteractionController {
    pub fn new(
        environment_id: EnvironmentId,
        kind: InteractionKind,
        initial: InteractionState,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Arc<Self> {
        let tracker = Tracker {
            confirmed: initial,
            desired: initial.active,
            in_flight: false,
        };
        let (snapshots, _) = watch::channel(tracker.snapshot());
        Arc::new(Self {
            environment_id,
            kind,
            gateway,
            events,
            lifetime,
            tracker: Mutex::new(tracker),
            snapshots,
        })
    }

    pub fn environment_id(&self) -> EnvironmentId {
        self.environment_id
    }

    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    pub fn state(&self) -> InteractionState {
        self.lock().displayed()
    }

    pub fn snapshot(&self) -> InteractionSnapshot {
        self.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<InteractionSnapshot> {
        self.snapshots.subscribe()
    }

    /// Applies the toggle locally and returns the new state right away.
    /// Reconciliation with the backend runs on the tokio runtime.
    pub fn toggle(self: &Arc<Self>) -> InteractionState {
        let (displayed, start) = {
            let mut tracker = self.lock();
            if self.lifetime.is_cancelled() {
                return tracker.displayed();
            }
            tracker.desired = !tracker.desired;
            let start = !tracker.in_flight;
            tracker.in_flight = true;
            self.publish(&tracker);
            (tracker.displayed(), start)
        };
        debug!(
            environment_id = self.environment_id.0,
            kind = %self.kind,
            active = displayed.active,
            count = displayed.count,
            "interaction: optimistic toggle"
        );
        if start {
            let controller = Arc::clone(self);
            tokio::spawn(async move { controller.reconcile().await });
        }
        displayed
    }

    pub async fn settled(&self) -> InteractionState {
        let mut rx = self.snapshots.subscribe();
        let settled = rx.wait_for(|snapshot| !snapshot.pending).await.map(|s| s.state);
        settled.unwrap_or_else(|_| self.state())
    }

    pub fn dispose(&self) {
        self.lifetime.cancel();
    }

    async fn reconcile(self: Arc<Self>) {
        loop {
            let desired = {
                let mut tracker = self.lock();
                if tracker.desired == tracker.confirmed.active {
                    tracker.in_flight = false;
                    self.publish(&tracker);
                    return;
                }
                tracker.desired
            };

            let outcome = self
                .lifetime
                .run(
                    self.gateway
                        .set_interaction(self.environment_id, self.kind, desired),
                )
                .await;

            let mut tracker = self.lock();
            match outcome {
                Some(Ok(())) => {
                    tracker.confirmed = tracker.confirmed.with_active(desired);
                    info!(
                        environment_id = self.environment_id.0,
                        kind = %self.kind,
                        active = desired,
                        "interaction: confirmed"
                    );
                }
                Some(Err(err)) => {
                    tracker.desired = tracker.confirmed.active;
                    tracker.in_flight = false;
                    self.publish(&tracker);
                    drop(tracker);
                    warn!(
                        environment_id = self.environment_id.0,
                        kind = %self.kind,
                        %err,
                        "interaction: rolled back"
                    );
                    self.events.error(TOGGLE_FAILURE_MESSAGE);
                    return;
                }
                None => {
                    // Disposed: the result no longer belongs to anyone.
                    tracker.in_flight = false;
                    self.publish(&tracker);
                    return;
                }
            }
        }
    }

    fn publish(&self, tracker: &Tracker) {
        self.snapshots.send_replace(tracker.snapshot());
    }

    fn lock(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/interaction_tests.rs"]
mod tests;
