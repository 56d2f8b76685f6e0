//! Date-ordered event file.
//!
//! A binary heap keyed by `(date, insertion sequence)`: extraction always
//! yields the earliest pending event, and events sharing a date come out in
//! the order they were inserted.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::event::Event;
use crate::time::SimTime;

struct Pending {
    seq: u64,
    event: Event,
}

// BinaryHeap is a max-heap, so the comparison is reversed to pop the
// smallest date (then the smallest sequence number) first.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.event.date().total_cmp(&other.event.date()) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            ord => ord,
        }
        .reverse()
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Pending {}

/// Pending events, ordered by date.
#[derive(Default)]
pub struct EventFile {
    heap: BinaryHeap<Pending>,
    next_seq: u64,
}

impl EventFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event at its position in date order.
    pub fn insert(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Pending { seq, event });
    }

    /// Date of the earliest pending event.
    pub fn peek_date(&self) -> Option<SimTime> {
        self.heap.peek().map(|p| p.event.date())
    }

    /// Removes and returns the earliest pending event.
    pub fn extract(&mut self) -> Option<Event> {
        self.heap.pop().map(|p| p.event)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every pending event without firing it. Returns how many were
    /// dropped.
    pub fn purge(&mut self) -> usize {
        let dropped = self.heap.len();
        self.heap.clear();
        self.next_seq = 0;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(date: SimTime, label: &'static str) -> Event {
        Event::new(date, |_| Ok(())).labeled(label)
    }

    #[test]
    fn extracts_in_date_order() {
        let mut file = EventFile::new();
        file.insert(noop(3.0, "c"));
        file.insert(noop(1.0, "a"));
        file.insert(noop(2.0, "b"));

        assert_eq!(file.peek_date(), Some(1.0));
        let labels: Vec<_> = std::iter::from_fn(|| file.extract())
            .map(|e| e.label())
            .collect();
        assert_eq!(labels, ["a", "b", "c"]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut file = EventFile::new();
        for label in ["first", "second", "third"] {
            file.insert(noop(5.0, label));
        }
        file.insert(noop(4.0, "earlier"));

        let labels: Vec<_> = std::iter::from_fn(|| file.extract())
            .map(|e| e.label())
            .collect();
        assert_eq!(labels, ["earlier", "first", "second", "third"]);
    }

    #[test]
    fn purge_drops_everything() {
        let mut file = EventFile::new();
        file.insert(noop(1.0, "x"));
        file.insert(noop(2.0, "y"));
        assert_eq!(file.purge(), 2);
        assert!(file.is_empty());
        assert_eq!(file.peek_date(), None);
    }
}
