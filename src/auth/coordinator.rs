// Single-flight coordination for session refresh

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::RefreshError;

/// Shared outcome of a refresh flight: the fresh token, or the error
/// every queued caller is rejected with
pub type FlightOutcome = Result<String, RefreshError>;

/// What a caller gets back from [`RefreshCoordinator::join`]
pub enum FlightTicket {
    /// Caller owns the refresh and must settle it
    Leader,

    /// A refresh is already in flight; await the shared outcome
    Follower(oneshot::Receiver<FlightOutcome>),
}

#[derive(Default)]
struct FlightState {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<FlightOutcome>>,
}

/// Serializes concurrent refresh attempts. The first caller to join an
/// idle coordinator becomes the leader; everyone arriving while the
/// flight is open waits for the leader's outcome. The flag flip and
/// waiter registration happen under one lock acquisition, so two tasks
/// can never both observe an idle coordinator and start competing
/// refreshes.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self) -> FlightTicket {
        let mut state = self.state.lock().expect("refresh state lock poisoned");
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            FlightTicket::Follower(rx)
        } else {
            state.refreshing = true;
            FlightTicket::Leader
        }
    }

    /// Close the flight: clear the flag and resolve every waiter, in
    /// the order they joined, with the shared outcome.
    pub fn settle(&self, outcome: &FlightOutcome) {
        let waiters = {
            let mut state = self.state.lock().expect("refresh state lock poisoned");
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // A follower that gave up already dropped its receiver
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Leader-side guard. If the leader is dropped before reporting an
    /// outcome (the owning call was cancelled), the flight settles with
    /// [`RefreshError::Abandoned`] instead of wedging the queue.
    pub fn guard(&self) -> FlightGuard<'_> {
        FlightGuard {
            coordinator: self,
            settled: false,
        }
    }
}

pub struct FlightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl FlightGuard<'_> {
    pub fn settle(mut self, outcome: &FlightOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(&Err(RefreshError::Abandoned));
        }
    }
}
