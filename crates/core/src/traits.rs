//! State machine traits.

use crate::{Action, Event};
use std::time::Duration;

/// A deterministic, synchronous state machine.
///
/// Implementations mutate internal state and return the side effects they
/// want performed. They never do I/O and never block; same state plus same
/// event always yields the same actions.
pub trait StateMachine {
    /// Process one event, returning the actions to perform.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Advance the machine's notion of current time.
    ///
    /// Time is injected by the runner (wall clock in production, virtual
    /// time in tests) so the machine itself stays deterministic.
    fn set_time(&mut self, now: Duration);
}
