//! A single server within a node: its state machine and what it's holding.

use crate::customer::Customer;
use crate::event::EventHandle;

/// The three states a server can be in. There is no "starting up" or
/// "draining" state: breakdowns and repairs are instantaneous transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Busy,
    Down,
}

/// One of a node's `k` servers.
#[derive(Debug, Clone)]
pub struct Server {
    pub index: usize,
    pub state: ServerState,
    pub current_customer: Option<Customer>,
    pub active_departure: Option<EventHandle>,
}

impl Server {
    pub fn idle(index: usize) -> Self {
        Self {
            index,
            state: ServerState::Idle,
            current_customer: None,
            active_departure: None,
        }
    }
}
