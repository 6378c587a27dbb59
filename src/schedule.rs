//! Deferred voice teardown, earliest first.
//!
//! A teardown names the voice it belongs to, so one scheduled for a voice
//! that has since been replaced on the same key cannot touch the new one.
//! Entries are never retracted; a teardown for a voice already gone is a
//! no-op when it comes due.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::player::VoiceId;

/// Stop-and-drop a voice at `at`.
#[derive(Debug, Clone, Copy)]
pub struct Teardown {
    pub at: f64,
    pub voice: VoiceId,
}

impl Ord for Teardown {
    /// Reversed so the max-heap pops the earliest time first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.voice.cmp(&self.voice))
    }
}

impl PartialOrd for Teardown {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Teardown {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Teardown {}

/// Pending teardowns.
#[derive(Debug, Default)]
pub struct Schedule {
    queue: BinaryHeap<Teardown>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, teardown: Teardown) {
        self.queue.push(teardown);
    }

    /// Time of the next teardown.
    pub fn next_due(&self) -> Option<f64> {
        self.queue.peek().map(|t| t.at)
    }

    /// Remove and return every teardown due at or before `now`, in time order.
    pub fn drain_due(&mut self, now: f64) -> Vec<Teardown> {
        let mut due = Vec::new();
        while self.queue.peek().is_some_and(|t| t.at <= now) {
            if let Some(teardown) = self.queue.pop() {
                due.push(teardown);
            }
        }
        due
    }

    /// Every pending teardown, earliest first.
    pub fn pending(&self) -> Vec<Teardown> {
        let mut pending = self.queue.clone().into_sorted_vec();
        pending.reverse();
        pending
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teardown(at: f64, voice: u64) -> Teardown {
        Teardown {
            at,
            voice: VoiceId(voice),
        }
    }

    #[test]
    fn drains_in_time_order() {
        let mut schedule = Schedule::new();
        schedule.push(teardown(3.0, 1));
        schedule.push(teardown(1.0, 2));
        schedule.push(teardown(2.0, 3));

        assert_eq!(schedule.next_due(), Some(1.0));
        let due: Vec<_> = schedule.drain_due(2.5).iter().map(|t| t.voice).collect();
        assert_eq!(due, vec![VoiceId(2), VoiceId(3)]);
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn due_time_is_inclusive() {
        let mut schedule = Schedule::new();
        schedule.push(teardown(1.0, 1));
        assert!(schedule.drain_due(0.999).is_empty());
        assert_eq!(schedule.drain_due(1.0).len(), 1);
        assert!(schedule.is_empty());
    }

    #[test]
    fn pending_is_earliest_first() {
        let mut schedule = Schedule::new();
        schedule.push(teardown(5.0, 1));
        schedule.push(teardown(0.5, 2));
        let times: Vec<_> = schedule.pending().iter().map(|t| t.at).collect();
        assert_eq!(times, vec![0.5, 5.0]);
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn equal_times_order_by_voice() {
        let mut schedule = Schedule::new();
        schedule.push(teardown(1.0, 9));
        schedule.push(teardown(1.0, 4));
        let due = schedule.drain_due(1.0);
        assert_eq!(due[0].voice, VoiceId(4));
        assert_eq!(due[1].voice, VoiceId(9));
    }
}
