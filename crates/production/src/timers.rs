//! Timer management for the production runner.
//!
//! The state machine requests timers via `Action::SetTimer` and receives
//! them back as events. Each armed timer is a tokio task that sleeps and
//! then delivers the corresponding event on the timer channel; setting a
//! timer with an id that is already armed replaces it.

use aegen_core::{Event, TimerId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// The event a timer id resolves to when it fires.
fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::ProductionTick => Event::ProductionTick,
        TimerId::SettlementPoll(batch_id) => Event::SettlementPollTimer { batch_id },
        TimerId::SubmissionRetry(batch_id) => Event::SubmissionRetryTimer { batch_id },
    }
}

/// Owns the set of armed timers.
pub struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Arm a timer, replacing any armed timer with the same id.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        if let Some(existing) = self.timers.remove(&id) {
            existing.abort();
        }
        trace!(?id, ?duration, "timer set");
        let tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // The receiver closing means the runner is shutting down.
            let _ = tx.send(timer_event(id)).await;
        });
        self.timers.insert(id, handle);
    }

    /// Cancel an armed timer. Cancelling an unknown id is a no-op.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(?id, "timer cancelled");
        }
    }

    /// Number of currently armed timers (fired timers are pruned lazily).
    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    /// Drop completed timer tasks from the map.
    pub fn prune(&mut self) {
        self.timers.retain(|_, handle| !handle.is_finished());
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
