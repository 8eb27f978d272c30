//! Scheduled status transitions and their deterministic priority queue.
//!
//! Delayed mutations are expressed as plain values naming the server they
//! target, never as closures holding live references. The clock resolves the
//! server by id at fire time and no-ops if it has been deleted in the
//! meantime.

use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

use crate::server::ServerStatus;

/// A status change aimed at one server, to be applied at a later simulated
/// instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    /// Tenant owning the target server.
    pub tenant_id: String,
    /// Region holding the target server.
    pub region_name: String,
    /// Identity of the target server.
    pub server_id: String,
    /// Status the server should move to.
    pub target: ServerStatus,
}

/// A transition scheduled for execution at a specific simulation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTransition {
    time: Duration,
    transition: StatusTransition,
    sequence: u64, // For deterministic ordering
}

impl ScheduledTransition {
    /// Creates a new scheduled transition.
    pub fn new(time: Duration, transition: StatusTransition, sequence: u64) -> Self {
        Self {
            time,
            transition,
            sequence,
        }
    }

    /// Returns the scheduled execution time.
    pub fn time(&self) -> Duration {
        self.time
    }

    /// Returns a reference to the transition.
    pub fn transition(&self) -> &StatusTransition {
        &self.transition
    }

    /// Consumes the scheduled entry and returns the transition.
    pub fn into_transition(self) -> StatusTransition {
        self.transition
    }
}

impl PartialOrd for ScheduledTransition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTransition {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, but we want earliest time first, so the
        // comparison is reversed. Ties are broken by sequence number so that
        // transitions scheduled for the same instant fire in FIFO order.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

/// A priority queue holding scheduled transitions in chronological order.
///
/// Transitions are popped in nondecreasing time order, with sequence numbers
/// providing deterministic FIFO ordering among equal instants.
#[derive(Debug, Default)]
pub struct TransitionQueue {
    heap: BinaryHeap<ScheduledTransition>,
}

impl TransitionQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Schedules a transition for execution.
    pub fn schedule(&mut self, entry: ScheduledTransition) {
        self.heap.push(entry);
    }

    /// Removes and returns the earliest scheduled transition.
    pub fn pop_earliest(&mut self) -> Option<ScheduledTransition> {
        self.heap.pop()
    }

    /// Returns a reference to the earliest scheduled transition without
    /// removing it.
    pub fn peek_earliest(&self) -> Option<&ScheduledTransition> {
        self.heap.peek()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of pending transitions.
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activate(server_id: &str) -> StatusTransition {
        StatusTransition {
            tenant_id: "tenant".to_string(),
            region_name: "ORD".to_string(),
            server_id: server_id.to_string(),
            target: ServerStatus::Active,
        }
    }

    #[test]
    fn queue_pops_in_time_order() {
        let mut queue = TransitionQueue::new();

        queue.schedule(ScheduledTransition::new(
            Duration::from_secs(30),
            activate("c"),
            2,
        ));
        queue.schedule(ScheduledTransition::new(
            Duration::from_secs(10),
            activate("a"),
            0,
        ));
        queue.schedule(ScheduledTransition::new(
            Duration::from_secs(20),
            activate("b"),
            1,
        ));

        let first = queue.pop_earliest().unwrap();
        assert_eq!(first.time(), Duration::from_secs(10));
        assert_eq!(first.transition().server_id, "a");

        let second = queue.pop_earliest().unwrap();
        assert_eq!(second.time(), Duration::from_secs(20));
        assert_eq!(second.transition().server_id, "b");

        let third = queue.pop_earliest().unwrap();
        assert_eq!(third.time(), Duration::from_secs(30));
        assert_eq!(third.transition().server_id, "c");

        assert!(queue.is_empty());
    }

    #[test]
    fn same_instant_fires_in_registration_order() {
        let mut queue = TransitionQueue::new();
        let same_time = Duration::from_secs(5);

        queue.schedule(ScheduledTransition::new(same_time, activate("third"), 2));
        queue.schedule(ScheduledTransition::new(same_time, activate("first"), 0));
        queue.schedule(ScheduledTransition::new(same_time, activate("second"), 1));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop_earliest())
            .map(|entry| entry.into_transition().server_id)
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }
}
