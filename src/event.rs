use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{CellMember, Time};

/// A weighted delivery scheduled for a target at a point in simulated time.
/// The total order (time, target, weight) makes delivery deterministic
/// across backends and thread counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub target: CellMember,
    pub time: Time,
    pub weight: f32,
}

impl Event {
    pub fn new(target: CellMember, time: Time, weight: f32) -> Self {
        Self {
            target,
            time,
            weight,
        }
    }
}

pub fn event_cmp(a: &Event, b: &Event) -> Ordering {
    a.time
        .total_cmp(&b.time)
        .then_with(|| a.target.cmp(&b.target))
        .then_with(|| a.weight.total_cmp(&b.weight))
}

/// One cell group's buffer of future events, sorted by `event_cmp` at every
/// epoch boundary.
pub type EventLane = Vec<Event>;

/// Merge newly generated events with the tail of the current lane (events at
/// or beyond `t_horizon`) into `next`, leaving `next` sorted. `incoming` is
/// sorted in place first; `current` must already be sorted.
pub fn merge_events(
    incoming: &mut Vec<Event>,
    current: &EventLane,
    next: &mut EventLane,
    t_horizon: Time,
) {
    incoming.sort_unstable_by(event_cmp);

    let tail_start = current.partition_point(|e| e.time < t_horizon);
    let tail = &current[tail_start..];

    next.clear();
    next.reserve(incoming.len() + tail.len());

    let mut a = incoming.iter().peekable();
    let mut b = tail.iter().peekable();
    loop {
        match (a.peek(), b.peek()) {
            (Some(&x), Some(&y)) => {
                if event_cmp(x, y) != Ordering::Greater {
                    next.push(*x);
                    a.next();
                } else {
                    next.push(*y);
                    b.next();
                }
            }
            (Some(&x), None) => {
                next.push(*x);
                a.next();
            }
            (None, Some(&y)) => {
                next.push(*y);
                b.next();
            }
            (None, None) => break,
        }
    }
}

#[derive(Debug, Clone)]
struct HeapEntry(Event);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        event_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-time-first.
        event_cmp(&other.0, &self.0)
    }
}

/// Min-time priority queue of events.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<HeapEntry>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.heap.push(HeapEntry(event));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Time of the head event if it lies before `t_until`.
    pub fn time_if_before(&self, t_until: Time) -> Option<Time> {
        match self.heap.peek() {
            Some(entry) if entry.0.time < t_until => Some(entry.0.time),
            _ => None,
        }
    }

    pub fn pop_if(&mut self, pred: impl FnOnce(&Event) -> bool) -> Option<Event> {
        if pred(&self.heap.peek()?.0) {
            self.heap.pop().map(|entry| entry.0)
        } else {
            None
        }
    }

    pub fn pop_if_before(&mut self, t_until: Time) -> Option<Event> {
        self.pop_if(|e| e.time < t_until)
    }

    pub fn pop_if_not_after(&mut self, t_until: Time) -> Option<Event> {
        self.pop_if(|e| e.time <= t_until)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
