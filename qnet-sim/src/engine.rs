//! The event dispatch loop: builds a network from a validated configuration,
//! runs one replication to completion, and reports its point-estimate metrics.

use std::collections::BTreeMap;

use qnet_core::Result;
use tracing::{instrument, trace};

use crate::config::SimulationConfig;
use crate::customer::Customer;
use crate::event::{ArrivalSource, Event, EventKind, EventQueue};
use crate::node::{Node, NodeId, RoutingOutcome, RoutingTarget};
use crate::rng::Rng;
use crate::server::Server;
use crate::stats::Stats;

/// The point-estimate metrics produced by a single replication.
///
/// `arrivals_total`, `reneged_total`, `busy_time` and `down_time` are the raw
/// per-node accumulators named in the Stats data model, exposed alongside
/// the derived ratios so a caller (or a test) can check the underlying
/// conservation identities directly instead of only their ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct Replication {
    pub throughput: f64,
    pub mean_queue_length: BTreeMap<String, f64>,
    pub server_utilization: BTreeMap<String, f64>,
    pub service_completions: BTreeMap<String, u64>,
    pub reneging_prob: BTreeMap<String, f64>,
    pub mean_waiting_time: BTreeMap<String, f64>,
    pub mean_system_time: BTreeMap<String, f64>,
    pub arrivals_total: BTreeMap<String, u64>,
    pub reneged_total: BTreeMap<String, u64>,
    pub busy_time: BTreeMap<String, f64>,
    pub down_time: BTreeMap<String, f64>,
}

/// A single run of the network from `t=0` to `sim_time`.
///
/// Not `Clone`/`Send`: a replication owns a `Rc`-linked event graph and is
/// meant to be constructed, run once, and discarded. The batch driver spins
/// up a fresh `Engine` per replication rather than trying to reuse one.
pub struct Engine {
    rng: Rng,
    queue: EventQueue,
    nodes: Vec<Node>,
    next_customer_id: u64,
    warmup: f64,
    sim_time: f64,
}

impl Engine {
    /// Builds a network from `config` and seeds its RNG stream.
    ///
    /// `config` must already satisfy [`SimulationConfig::validate`];
    /// callers (notably [`crate::batch::BatchDriver`]) are expected to
    /// validate once before looping rather than relying on this
    /// constructor to catch every issue replication after replication, but
    /// it re-validates anyway since a configuration error must abort before
    /// any event is scheduled, in every calling context.
    pub fn new(config: &SimulationConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        let name_to_id: BTreeMap<&str, NodeId> = config
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        let mut nodes = Vec::with_capacity(config.nodes.len());
        for (idx, name) in config.nodes.iter().enumerate() {
            let server_count = config.servers[name];
            let servers = (0..server_count).map(Server::idle).collect();
            let waiting_lines = config.priorities[name]
                .iter()
                .map(|p| (*p, std::collections::VecDeque::new()))
                .collect();

            let mut routing: Vec<RoutingTarget> = config
                .routing_matrix
                .get(name)
                .into_iter()
                .flatten()
                .map(|(target_name, probability)| RoutingTarget {
                    name: target_name.clone(),
                    target: name_to_id[target_name.as_str()],
                    probability: *probability,
                })
                .collect();
            routing.sort_by(|a, b| a.name.cmp(&b.name));

            nodes.push(Node {
                id: idx,
                name: name.clone(),
                servers,
                waiting_lines,
                service_dist: config.service_dists[name],
                arrival_dist: config.arrival_dists.get(name).copied(),
                patience_dist: config.patience_dists.get(name).copied(),
                breakdown_dist: config.breakdown_dists.get(name).copied(),
                repair_dist: config.repair_dists.get(name).copied(),
                routing,
                stats: Stats::default(),
            });
        }

        Ok(Self {
            rng: Rng::new(seed),
            queue: EventQueue::new(),
            nodes,
            next_customer_id: 0,
            warmup: config.warmup,
            sim_time: config.sim_time,
        })
    }

    fn alloc_customer_id(&mut self) -> u64 {
        let id = self.next_customer_id;
        self.next_customer_id += 1;
        id
    }

    /// Schedules each node's initial external arrival and, for every server
    /// on a node with a breakdown distribution, that server's initial
    /// breakdown occurrence — all at `t=0`.
    fn init(&mut self) {
        for idx in 0..self.nodes.len() {
            if self.nodes[idx].arrival_dist.is_some() {
                let priority = self.nodes[idx].default_priority();
                let id = self.alloc_customer_id();
                let customer = Customer::new_external(id, 0.0, priority);
                self.queue.push(
                    0.0,
                    idx,
                    EventKind::Arrival {
                        customer,
                        source: ArrivalSource::External,
                    },
                );
            }
            if self.nodes[idx].breakdown_dist.is_some() {
                for server_index in 0..self.nodes[idx].servers.len() {
                    self.queue
                        .push(0.0, idx, EventKind::Breakdown { server_index });
                }
            }
        }
    }

    fn apply_warmup_checkpoint(&mut self) {
        for node in &mut self.nodes {
            node.stats.reset_warmup(self.warmup);
        }
    }

    /// Runs the replication to completion and returns its metrics.
    ///
    /// The event loop itself only recognizes the six event kinds in
    /// [`EventKind`]; the warmup checkpoint and the `sim_time` cutoff are
    /// engine-level lifecycle boundaries, applied as plain time comparisons
    /// rather than as heap entries, since they aren't part of the event
    /// union's fixed `type_priority` mapping.
    #[instrument(skip(self), fields(sim_time = self.sim_time, warmup = self.warmup))]
    pub fn run(&mut self) -> Result<Replication> {
        self.init();

        let mut warmup_applied = false;
        loop {
            if !warmup_applied {
                let checkpoint_due = self
                    .queue
                    .peek_time()
                    .map_or(true, |t| t >= self.warmup);
                if checkpoint_due {
                    self.apply_warmup_checkpoint();
                    warmup_applied = true;
                    continue;
                }
            }

            let Some(event) = self.queue.pop_min() else {
                break;
            };
            if event.time > self.sim_time {
                break;
            }
            if !event.is_valid() {
                continue;
            }
            self.dispatch(event)?;
        }

        if !warmup_applied {
            self.apply_warmup_checkpoint();
        }
        for node in &mut self.nodes {
            node.stats.finalize(self.sim_time);
        }

        Ok(self.build_replication())
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        let now = event.time;
        let node_id = event.node_id;
        trace!(time = now, node_id, event_id = event.event_id, "dispatch");

        match event.kind {
            EventKind::Arrival { customer, source } => {
                let request = self.node_mut(node_id)?.on_arrival(
                    now,
                    &mut self.rng,
                    &mut self.queue,
                    customer,
                    source,
                )?;
                if let Some(request) = request {
                    let id = self.alloc_customer_id();
                    let customer = Customer::new_external(id, request.after, request.priority);
                    self.queue.push(
                        request.after,
                        node_id,
                        EventKind::Arrival {
                            customer,
                            source: ArrivalSource::External,
                        },
                    );
                }
            }
            EventKind::Departure { server_index } => {
                self.node_mut(node_id)?
                    .on_departure(now, &mut self.rng, server_index, &mut self.queue)?;
            }
            EventKind::Routing { customer } => {
                let outcome = self.node_mut(node_id)?.on_routing(now, &mut self.rng, customer);
                if let RoutingOutcome::Route { target, customer } = outcome {
                    self.queue.push(
                        now,
                        target,
                        EventKind::Arrival {
                            customer,
                            source: ArrivalSource::Routed,
                        },
                    );
                }
            }
            EventKind::Renege {
                customer_id,
                priority,
            } => {
                self.node_mut(node_id)?.on_renege(now, customer_id, priority)?;
            }
            EventKind::Repair { server_index } => {
                self.node_mut(node_id)?
                    .on_repair(now, &mut self.rng, &mut self.queue, server_index)?;
            }
            EventKind::Breakdown { server_index } => {
                self.node_mut(node_id)?
                    .on_breakdown(now, &mut self.rng, &mut self.queue, server_index)?;
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, node_id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(node_id).ok_or_else(|| {
            qnet_core::Error::invariant(format!("event targeted unknown node id {node_id}"))
        })
    }

    fn build_replication(&self) -> Replication {
        let duration = self.sim_time - self.warmup;
        let mut throughput_numerator = 0u64;
        let mut mean_queue_length = BTreeMap::new();
        let mut server_utilization = BTreeMap::new();
        let mut service_completions = BTreeMap::new();
        let mut reneging_prob = BTreeMap::new();
        let mut mean_waiting_time = BTreeMap::new();
        let mut mean_system_time = BTreeMap::new();
        let mut arrivals_total = BTreeMap::new();
        let mut reneged_total = BTreeMap::new();
        let mut busy_time = BTreeMap::new();
        let mut down_time = BTreeMap::new();

        for node in &self.nodes {
            let stats = &node.stats;
            throughput_numerator += stats.completed_services;

            mean_queue_length.insert(node.name.clone(), stats.queue_integral / duration);

            let k = node.servers.len() as f64;
            let denom = k * duration - stats.down_time;
            let utilization = if denom <= 0.0 {
                0.0
            } else {
                stats.busy_time / denom
            };
            server_utilization.insert(node.name.clone(), utilization);

            service_completions.insert(node.name.clone(), stats.completed_services);
            reneging_prob.insert(
                node.name.clone(),
                stats.reneged_total as f64 / (stats.arrivals_total.max(1) as f64),
            );
            mean_waiting_time.insert(
                node.name.clone(),
                stats.waiting_time_sum / (stats.served_customer_count.max(1) as f64),
            );
            mean_system_time.insert(
                node.name.clone(),
                stats.system_time_sum / (stats.exited_count.max(1) as f64),
            );
            arrivals_total.insert(node.name.clone(), stats.arrivals_total);
            reneged_total.insert(node.name.clone(), stats.reneged_total);
            busy_time.insert(node.name.clone(), stats.busy_time);
            down_time.insert(node.name.clone(), stats.down_time);
        }

        Replication {
            throughput: throughput_numerator as f64 / duration,
            mean_queue_length,
            server_utilization,
            service_completions,
            reneging_prob,
            mean_waiting_time,
            mean_system_time,
            arrivals_total,
            reneged_total,
            busy_time,
            down_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;
    use std::collections::BTreeMap as Map;

    fn mm1_config(rate_arrival: f64, rate_service: f64, sim_time: f64) -> SimulationConfig {
        let mut servers = Map::new();
        servers.insert("A".to_string(), 1);
        let mut priorities = Map::new();
        priorities.insert("A".to_string(), vec![0]);
        let mut service_dists = Map::new();
        service_dists.insert("A".to_string(), Distribution::exponential(rate_service).unwrap());
        let mut arrival_dists = Map::new();
        arrival_dists.insert("A".to_string(), Distribution::exponential(rate_arrival).unwrap());
        SimulationConfig {
            nodes: vec!["A".to_string()],
            servers,
            priorities,
            service_dists,
            arrival_dists,
            patience_dists: Map::new(),
            breakdown_dists: Map::new(),
            repair_dists: Map::new(),
            routing_matrix: Map::new(),
            sim_time,
            warmup: 0.0,
            batch_count: 1,
            seed: 42,
        }
    }

    #[test]
    fn mm1_runs_and_produces_sane_metrics() {
        let config = mm1_config(1.0, 2.0, 10_000.0);
        let mut engine = Engine::new(&config, 42).expect("valid config");
        let replication = engine.run().expect("no invariant violated");
        assert!(replication.throughput > 0.0);
        let utilization = replication.server_utilization["A"];
        assert!((0.0..=1.0).contains(&utilization));
        let queue_length = replication.mean_queue_length["A"];
        assert!(queue_length >= 0.0);
    }

    #[test]
    fn same_seed_is_fully_deterministic() {
        let config = mm1_config(1.0, 2.0, 5_000.0);
        let mut a = Engine::new(&config, 7).unwrap();
        let mut b = Engine::new(&config, 7).unwrap();
        let ra = a.run().unwrap();
        let rb = b.run().unwrap();
        assert_eq!(ra.throughput, rb.throughput);
        assert_eq!(ra.mean_queue_length["A"], rb.mean_queue_length["A"]);
    }

    #[test]
    fn empty_node_with_no_arrivals_finalizes_cleanly() {
        let mut servers = Map::new();
        servers.insert("A".to_string(), 2);
        let mut priorities = Map::new();
        priorities.insert("A".to_string(), vec![0]);
        let mut service_dists = Map::new();
        service_dists.insert("A".to_string(), Distribution::exponential(1.0).unwrap());
        let config = SimulationConfig {
            nodes: vec!["A".to_string()],
            servers,
            priorities,
            service_dists,
            arrival_dists: Map::new(),
            patience_dists: Map::new(),
            breakdown_dists: Map::new(),
            repair_dists: Map::new(),
            routing_matrix: Map::new(),
            sim_time: 100.0,
            warmup: 10.0,
            batch_count: 1,
            seed: 1,
        };
        let mut engine = Engine::new(&config, 1).unwrap();
        let replication = engine.run().unwrap();
        assert_eq!(replication.throughput, 0.0);
        assert_eq!(replication.server_utilization["A"], 0.0);
    }
}
