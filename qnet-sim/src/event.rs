//! The event union, its total order, and the min-heap that drives the engine.
//!
//! Events are never removed from the heap once scheduled. Cancelling one
//! (a departure whose server just broke down, a renege for a customer who
//! already entered service) flips a shared `valid` cell instead; the engine
//! discards stale events silently when it pops them. That trades heap size
//! for O(1) cancellation, which is the right trade here since the number of
//! in-flight events per replication is small and bounded by node capacity.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::customer::Customer;
use crate::node::NodeId;

/// Where an arrival came from, for the purpose of deciding whether it should
/// re-arm the node's own external-arrival chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalSource {
    /// Generated by the node's own `arrival_dist` renewal process.
    External,
    /// Handed to this node by another node's routing decision.
    Routed,
}

/// The payload carried by an event, tagged by the six kinds the simulation
/// core recognizes.
#[derive(Debug, Clone)]
pub enum EventKind {
    Arrival {
        customer: Customer,
        source: ArrivalSource,
    },
    Departure {
        server_index: usize,
    },
    Routing {
        customer: Customer,
    },
    Renege {
        customer_id: u64,
        priority: i64,
    },
    Repair {
        server_index: usize,
    },
    Breakdown {
        server_index: usize,
    },
}

impl EventKind {
    /// Lower sorts first among events scheduled for the same instant.
    /// Fixed mapping: departure=0, routing=1, renege=2, repair=3, arrival=4,
    /// breakdown=5 — departures free capacity before anything else is asked
    /// to use it, arrivals land after the routing/renege/repair churn at the
    /// same timestamp has settled, breakdowns are applied last.
    fn type_priority(&self) -> u8 {
        match self {
            Self::Departure { .. } => 0,
            Self::Routing { .. } => 1,
            Self::Renege { .. } => 2,
            Self::Repair { .. } => 3,
            Self::Arrival { .. } => 4,
            Self::Breakdown { .. } => 5,
        }
    }
}

/// A shared cancellation flag, clonable between the event sitting in the
/// heap and whatever back-reference (a `Customer`, a `Server`) may need to
/// invalidate it later without touching the heap.
#[derive(Debug, Clone)]
pub struct EventHandle {
    pub event_id: u64,
    valid: Rc<Cell<bool>>,
}

impl EventHandle {
    pub fn invalidate(&self) {
        self.valid.set(false);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }
}

/// One scheduled occurrence in the simulation timeline.
#[derive(Debug, Clone)]
pub struct Event {
    pub time: f64,
    pub kind: EventKind,
    pub node_id: NodeId,
    pub event_id: u64,
    valid: Rc<Cell<bool>>,
}

impl Event {
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn sort_key(&self) -> (f64, u8, u64) {
        (self.time, self.kind.type_priority(), self.event_id)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap, and we want it to hand back
        // the smallest (time, type_priority, event_id) tuple first.
        let (t1, p1, i1) = other.sort_key();
        let (t2, p2, i2) = self.sort_key();
        t1.total_cmp(&t2).then(p1.cmp(&p2)).then(i1.cmp(&i2))
    }
}

/// The engine's min-heap of scheduled events, keyed on `(time, type_priority,
/// event_id)` with the last component breaking ties in scheduling order.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_event_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_event_id: 0,
        }
    }

    /// Schedules `kind` at `time` on `node_id`, returning a handle that can
    /// later invalidate this exact occurrence.
    pub fn push(&mut self, time: f64, node_id: NodeId, kind: EventKind) -> EventHandle {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        let valid = Rc::new(Cell::new(true));
        self.heap.push(Event {
            time,
            kind,
            node_id,
            event_id,
            valid: Rc::clone(&valid),
        });
        EventHandle { event_id, valid }
    }

    /// Removes and returns the earliest-ordered event, if any remain.
    pub fn pop_min(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    /// The time of the earliest-ordered event, without removing it.
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }
}
