//! A single multi-server queueing node: its waiting lines, its servers, its
//! routing table, and the dispatch rule that ties them together.

use std::collections::{BTreeMap, VecDeque};

use qnet_core::{Error, Result};

use crate::customer::Customer;
use crate::distribution::Distribution;
use crate::event::{ArrivalSource, EventKind, EventQueue};
use crate::rng::Rng;
use crate::server::{Server, ServerState};
use crate::stats::Stats;

/// Index of a node within `Engine::nodes`. Stable for the lifetime of a
/// replication; resolved once from node names at construction time so the
/// hot path never does string lookups.
pub type NodeId = usize;

/// One routed destination out of a node's routing table, with its raw
/// (non-cumulative) probability. Stored sorted by name so that the
/// cumulative walk in [`Node::on_routing`] is deterministic across runs.
#[derive(Debug, Clone)]
pub struct RoutingTarget {
    pub name: String,
    pub target: NodeId,
    pub probability: f64,
}

/// Where a customer ends up after a node finishes with it.
pub enum RoutingOutcome {
    /// The residual probability mass: the customer leaves the network here.
    Exit,
    Route {
        target: NodeId,
        customer: Customer,
    },
}

/// A request, bubbled up to the engine, to spawn the next external arrival
/// for this node. The engine owns the global customer-id counter, so the
/// node can't construct the `Customer` itself.
pub struct NextArrivalRequest {
    pub after: f64,
    pub priority: i64,
}

/// A single queueing node: `k` servers, one FIFO waiting line per configured
/// priority class, and (optionally) its own external-arrival and
/// breakdown/repair renewal processes.
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub servers: Vec<Server>,
    pub waiting_lines: BTreeMap<i64, VecDeque<Customer>>,
    pub service_dist: Distribution,
    pub arrival_dist: Option<Distribution>,
    pub patience_dist: Option<Distribution>,
    pub breakdown_dist: Option<Distribution>,
    pub repair_dist: Option<Distribution>,
    pub routing: Vec<RoutingTarget>,
    pub stats: Stats,
}

impl Node {
    /// The priority class assigned to a fresh external arrival: the first
    /// (highest-priority) entry in this node's configured priority list.
    /// `spec` leaves "which class a plain external arrival belongs to"
    /// unspecified for nodes with more than one class; fixing it to the
    /// head of the list keeps the assignment deterministic and documented.
    pub fn default_priority(&self) -> i64 {
        *self
            .waiting_lines
            .keys()
            .next()
            .expect("node always has at least one configured priority class")
    }

    fn total_waiting(&self) -> usize {
        self.waiting_lines.values().map(VecDeque::len).sum()
    }

    /// Confirms a popped event's `server_index` still names the server it
    /// was scheduled against. `Server::index` is fixed at construction and
    /// never touched afterward; a mismatch here means the server vector was
    /// reordered or an event carries a stale index, both §7 "server state
    /// inconsistency" invariant violations rather than anything recoverable.
    fn check_server_index(&self, server_index: usize) -> Result<()> {
        let actual = self
            .servers
            .get(server_index)
            .ok_or_else(|| {
                Error::invariant(format!(
                    "event referenced unknown server {server_index} on node `{}`",
                    self.name
                ))
            })?
            .index;
        if actual != server_index {
            return Err(Error::invariant(format!(
                "server at position {server_index} on node `{}` carries stale index {actual}",
                self.name
            )));
        }
        Ok(())
    }

    /// Pulls as many waiting customers into idle servers as possible: an
    /// idle server and a non-empty line (lowest priority value first, FIFO
    /// within a class) are matched repeatedly until one side runs out.
    pub fn dispatch(&mut self, now: f64, rng: &mut Rng, queue: &mut EventQueue) {
        loop {
            let Some(server_index) = self.servers.iter().position(|s| s.state == ServerState::Idle)
            else {
                return;
            };
            let Some(priority) = self
                .waiting_lines
                .iter()
                .find(|(_, line)| !line.is_empty())
                .map(|(p, _)| *p)
            else {
                return;
            };

            let line = self
                .waiting_lines
                .get_mut(&priority)
                .expect("priority key just matched above");
            let mut customer = line
                .pop_front()
                .expect("line just matched as non-empty above");
            self.stats.record_queue_length(now, self.total_waiting());

            if let Some(handle) = customer.pending_renege.take() {
                handle.invalidate();
            }

            let wait = now - customer.arrival_time_current_node;
            self.stats.waiting_time_sum += wait;
            self.stats.served_customer_count += 1;

            let duration = self.service_dist.sample(rng);
            self.stats.record_busy_delta(now, 1);
            let handle = queue.push(
                now + duration,
                self.id,
                EventKind::Departure { server_index },
            );

            let server = &mut self.servers[server_index];
            server.state = ServerState::Busy;
            server.active_departure = Some(handle);
            customer.arrival_time_current_node = now;
            server.current_customer = Some(customer);
        }
    }

    /// Handles a customer entering the node, either freshly from outside or
    /// handed off by another node's routing decision.
    pub fn on_arrival(
        &mut self,
        now: f64,
        rng: &mut Rng,
        queue: &mut EventQueue,
        customer: Customer,
        source: ArrivalSource,
    ) -> Result<Option<NextArrivalRequest>> {
        let priority = customer.priority;
        let line = self.waiting_lines.get_mut(&priority).ok_or_else(|| {
            Error::invariant(format!(
                "node `{}` has no waiting line for priority {priority}",
                self.name
            ))
        })?;
        line.push_back(customer);
        self.stats.arrivals_total += 1;
        self.stats.record_queue_length(now, self.total_waiting());

        if let Some(patience) = &self.patience_dist {
            let delay = patience.sample(rng);
            let customer_id = line.back().expect("just pushed").id;
            let handle = queue.push(
                now + delay,
                self.id,
                EventKind::Renege {
                    customer_id,
                    priority,
                },
            );
            self.waiting_lines
                .get_mut(&priority)
                .expect("priority key validated above")
                .back_mut()
                .expect("just pushed")
                .pending_renege = Some(handle);
        }

        self.dispatch(now, rng, queue);

        if source == ArrivalSource::External {
            if let Some(arrival) = &self.arrival_dist {
                let delay = arrival.sample(rng);
                return Ok(Some(NextArrivalRequest {
                    after: now + delay,
                    priority,
                }));
            }
        }
        Ok(None)
    }

    /// A server finishes serving its customer: frees the server, hands the
    /// customer off to routing, and tries to dispatch the next waiting one.
    pub fn on_departure(
        &mut self,
        now: f64,
        rng: &mut Rng,
        server_index: usize,
        queue: &mut EventQueue,
    ) -> Result<()> {
        self.check_server_index(server_index)?;
        let server = self.servers.get_mut(server_index).ok_or_else(|| {
            Error::invariant(format!(
                "departure popped for unknown server {server_index} on node `{}`",
                self.name
            ))
        })?;
        if server.state != ServerState::Busy {
            return Err(Error::invariant(format!(
                "departure popped for non-busy server {server_index} on node `{}`",
                self.name
            )));
        }
        let customer = server.current_customer.take().ok_or_else(|| {
            Error::invariant(format!(
                "busy server {server_index} on node `{}` held no customer",
                self.name
            ))
        })?;
        server.active_departure = None;
        server.state = ServerState::Idle;
        self.stats.record_busy_delta(now, -1);
        self.stats.completed_services += 1;

        queue.push(now, self.id, EventKind::Routing { customer });
        self.dispatch(now, rng, queue);
        Ok(())
    }

    /// Decides where a customer that just finished service at this node goes
    /// next: to a routing target, or out of the network entirely.
    pub fn on_routing(&mut self, now: f64, rng: &mut Rng, customer: Customer) -> RoutingOutcome {
        let u = rng.uniform();
        let mut cumulative = 0.0;
        for target in &self.routing {
            cumulative += target.probability;
            if u < cumulative {
                let mut routed = customer;
                routed.arrival_time_current_node = now;
                return RoutingOutcome::Route {
                    target: target.target,
                    customer: routed,
                };
            }
        }
        self.stats.system_time_sum += now - customer.arrival_time_system;
        self.stats.exited_count += 1;
        RoutingOutcome::Exit
    }

    /// A customer's patience expired before a server became free.
    pub fn on_renege(&mut self, now: f64, customer_id: u64, priority: i64) -> Result<()> {
        let line = self.waiting_lines.get_mut(&priority).ok_or_else(|| {
            Error::invariant(format!(
                "renege fired for unknown priority {priority} on node `{}`",
                self.name
            ))
        })?;
        let position = line.iter().position(|c| c.id == customer_id).ok_or_else(|| {
            Error::invariant(format!(
                "renege fired for customer {customer_id} no longer waiting on node `{}`",
                self.name
            ))
        })?;
        line.remove(position);
        self.stats.record_queue_length(now, self.total_waiting());
        self.stats.reneged_total += 1;
        Ok(())
    }

    /// `server_index` breaks down. Each server runs its own independent
    /// breakdown/repair renewal chain (the event that fires here already
    /// names the server; there is no cross-node "pick a target server"
    /// step — see the note on this in `DESIGN.md`). If the server was
    /// already DOWN when its own chain fired again (possible if a repair
    /// hasn't landed yet), this occurrence is a no-op aside from
    /// rescheduling the chain. If it was serving a customer, that customer
    /// is returned to the head of its line and its patience timer re-armed;
    /// a repair is scheduled for the server, and its breakdown chain
    /// continues regardless.
    pub fn on_breakdown(
        &mut self,
        now: f64,
        rng: &mut Rng,
        queue: &mut EventQueue,
        server_index: usize,
    ) -> Result<()> {
        self.check_server_index(server_index)?;
        let server_state = self
            .servers
            .get(server_index)
            .ok_or_else(|| {
                Error::invariant(format!(
                    "breakdown fired for unknown server {server_index} on node `{}`",
                    self.name
                ))
            })?
            .state;

        if server_state != ServerState::Down {
            let was_busy = server_state == ServerState::Busy;
            self.servers[server_index].state = ServerState::Down;
            self.stats.record_down_delta(now, 1);

            if was_busy {
                if let Some(handle) = self.servers[server_index].active_departure.take() {
                    handle.invalidate();
                }
                let mut customer = self.servers[server_index]
                    .current_customer
                    .take()
                    .ok_or_else(|| {
                        Error::invariant(format!(
                            "busy server {server_index} on node `{}` held no customer at breakdown",
                            self.name
                        ))
                    })?;
                self.stats.record_busy_delta(now, -1);
                if let Some(handle) = customer.pending_renege.take() {
                    handle.invalidate();
                }
                if let Some(patience) = &self.patience_dist {
                    let delay = patience.sample(rng);
                    let handle = queue.push(
                        now + delay,
                        self.id,
                        EventKind::Renege {
                            customer_id: customer.id,
                            priority: customer.priority,
                        },
                    );
                    customer.pending_renege = Some(handle);
                }
                let priority = customer.priority;
                self.waiting_lines
                    .get_mut(&priority)
                    .ok_or_else(|| {
                        Error::invariant(format!(
                            "unknown priority {priority} requeuing customer after breakdown on node `{}`",
                            self.name
                        ))
                    })?
                    .push_front(customer);
                self.stats.record_queue_length(now, self.total_waiting());
            }

            if let Some(repair) = &self.repair_dist {
                let delay = repair.sample(rng);
                queue.push(now + delay, self.id, EventKind::Repair { server_index });
            }
        }

        if let Some(breakdown) = &self.breakdown_dist {
            let delay = breakdown.sample(rng);
            queue.push(now + delay, self.id, EventKind::Breakdown { server_index });
        }
        Ok(())
    }

    /// A server comes back up: transitions to idle and tries to dispatch.
    pub fn on_repair(
        &mut self,
        now: f64,
        rng: &mut Rng,
        queue: &mut EventQueue,
        server_index: usize,
    ) -> Result<()> {
        self.check_server_index(server_index)?;
        let server = self.servers.get_mut(server_index).ok_or_else(|| {
            Error::invariant(format!(
                "repair popped for unknown server {server_index} on node `{}`",
                self.name
            ))
        })?;
        if server.state != ServerState::Down {
            return Err(Error::invariant(format!(
                "repair popped for non-down server {server_index} on node `{}`",
                self.name
            )));
        }
        server.state = ServerState::Idle;
        self.stats.record_down_delta(now, -1);
        self.dispatch(now, rng, queue);
        Ok(())
    }
}
