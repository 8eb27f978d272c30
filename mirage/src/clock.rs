//! The virtual clock driving delayed state transitions.
//!
//! Time never advances on its own: the test harness advances it explicitly
//! through [`crate::collection::ComputeSession::advance`], which is what makes
//! delayed transitions deterministic and replayable.

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::transition::{ScheduledTransition, StatusTransition, TransitionQueue};

#[derive(Debug)]
struct ClockInner {
    current_time: Duration,
    queue: TransitionQueue,
    next_sequence: u64,
}

/// An injected, test-controlled time source.
///
/// `VirtualClock` is a cheaply cloneable handle; every collection created
/// within one session shares the same underlying state. It exposes the
/// current simulated time and lets behaviors schedule a [`StatusTransition`]
/// to fire after a delay. There is no cancellation primitive: once scheduled,
/// a transition fires, and firing against a deleted server is a no-op.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    inner: Rc<RefCell<ClockInner>>,
}

impl VirtualClock {
    /// Creates a new clock starting at time zero with nothing scheduled.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ClockInner {
                current_time: Duration::ZERO,
                queue: TransitionQueue::new(),
                next_sequence: 0,
            })),
        }
    }

    /// Returns the current simulated time.
    pub fn now(&self) -> Duration {
        self.inner.borrow().current_time
    }

    /// Schedules a transition to fire after `delay` from the current time.
    pub fn call_later(&self, delay: Duration, transition: StatusTransition) {
        let mut inner = self.inner.borrow_mut();
        let time = inner.current_time + delay;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner
            .queue
            .schedule(ScheduledTransition::new(time, transition, sequence));
    }

    /// Returns the number of transitions waiting to fire.
    pub fn pending_transitions(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Pops the earliest transition due at or before `deadline`, advancing
    /// the clock to its scheduled instant.
    ///
    /// Returns `None` once nothing else is due, leaving the clock untouched;
    /// the caller is expected to finish with [`VirtualClock::advance_to`].
    pub(crate) fn pop_due(&self, deadline: Duration) -> Option<StatusTransition> {
        let mut inner = self.inner.borrow_mut();
        let due = inner
            .queue
            .peek_earliest()
            .is_some_and(|entry| entry.time() <= deadline);
        if !due {
            return None;
        }
        let entry = inner.queue.pop_earliest()?;
        inner.current_time = inner.current_time.max(entry.time());
        Some(entry.into_transition())
    }

    /// Moves the clock forward to `deadline`. Never moves it backwards.
    pub(crate) fn advance_to(&self, deadline: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.current_time = inner.current_time.max(deadline);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerStatus;

    fn transition(server_id: &str) -> StatusTransition {
        StatusTransition {
            tenant_id: "tenant".to_string(),
            region_name: "ORD".to_string(),
            server_id: server_id.to_string(),
            target: ServerStatus::Active,
        }
    }

    #[test]
    fn starts_at_zero() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.pending_transitions(), 0);
    }

    #[test]
    fn pop_due_advances_to_each_instant() {
        let clock = VirtualClock::new();
        clock.call_later(Duration::from_secs(5), transition("a"));
        clock.call_later(Duration::from_secs(2), transition("b"));

        let first = clock.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(first.server_id, "b");
        assert_eq!(clock.now(), Duration::from_secs(2));

        let second = clock.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(second.server_id, "a");
        assert_eq!(clock.now(), Duration::from_secs(5));

        assert!(clock.pop_due(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn pop_due_respects_deadline() {
        let clock = VirtualClock::new();
        clock.call_later(Duration::from_secs(5), transition("late"));

        assert!(clock.pop_due(Duration::from_secs(4)).is_none());
        assert_eq!(clock.pending_transitions(), 1);

        clock.advance_to(Duration::from_secs(4));
        assert_eq!(clock.now(), Duration::from_secs(4));

        // Within reach once the deadline covers the scheduled instant.
        assert!(clock.pop_due(Duration::from_secs(5)).is_some());
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[test]
    fn delays_compose_from_current_time() {
        let clock = VirtualClock::new();
        clock.advance_to(Duration::from_secs(10));
        clock.call_later(Duration::from_secs(5), transition("a"));

        assert!(clock.pop_due(Duration::from_secs(14)).is_none());
        assert!(clock.pop_due(Duration::from_secs(15)).is_some());
        assert_eq!(clock.now(), Duration::from_secs(15));
    }
}
