//! The one piece of state that moves between nodes: a waiting/in-service customer.

use crate::event::EventHandle;

/// A customer moving through the network.
///
/// `arrival_time_system` is fixed at creation and never changes again; it's
/// what `mean_system_time` measures against on exit. `arrival_time_current_node`
/// is rewritten every time the customer enters a node (including re-entering
/// its own waiting line after a breakdown), and is what waiting-time
/// accounting measures against.
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: u64,
    pub arrival_time_system: f64,
    pub arrival_time_current_node: f64,
    pub priority: i64,
    pub pending_renege: Option<EventHandle>,
}

impl Customer {
    /// A brand-new customer entering the network from outside (an external
    /// arrival, not a routed hand-off from another node).
    pub fn new_external(id: u64, arrival_time: f64, priority: i64) -> Self {
        Self {
            id,
            arrival_time_system: arrival_time,
            arrival_time_current_node: arrival_time,
            priority,
            pending_renege: None,
        }
    }
}
