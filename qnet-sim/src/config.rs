//! The plain in-memory configuration record a caller builds (or deserializes)
//! to describe a queueing network. No file I/O, no environment overrides, no
//! hot reload: a host application owns all of that, this crate only owns
//! validating the shape once it's in hand.

use std::collections::{BTreeMap, BTreeSet};

use qnet_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;

/// A complete description of a queueing network and how to run it.
///
/// Every per-node map is keyed by node name and need only contain an entry
/// for nodes that actually use that feature: a node absent from
/// `arrival_dists` simply has no external arrival stream of its own, one
/// absent from `breakdown_dists` never breaks down, and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// The network's nodes, in a fixed, deterministic order.
    pub nodes: Vec<String>,
    pub servers: BTreeMap<String, usize>,
    pub priorities: BTreeMap<String, Vec<i64>>,
    pub service_dists: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub arrival_dists: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub patience_dists: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub breakdown_dists: BTreeMap<String, Distribution>,
    #[serde(default)]
    pub repair_dists: BTreeMap<String, Distribution>,
    /// `routing_matrix[origin][target]` is the probability a customer
    /// finishing service at `origin` is routed to `target`. Missing
    /// probability mass (1 minus the row sum) is the chance the customer
    /// leaves the network from `origin`.
    #[serde(default)]
    pub routing_matrix: BTreeMap<String, BTreeMap<String, f64>>,
    pub sim_time: f64,
    #[serde(default)]
    pub warmup: f64,
    pub batch_count: usize,
    pub seed: u64,
}

impl SimulationConfig {
    /// Checks every constraint `spec` §7 classifies as a `Configuration`
    /// error: unknown node references, missing required per-node entries,
    /// non-positive server counts or distribution parameters, routing rows
    /// that oversubscribe probability mass, and a degenerate time horizon.
    ///
    /// Must be called, and must succeed, before a single event is scheduled.
    pub fn validate(&self) -> Result<()> {
        let known: BTreeSet<&str> = self.nodes.iter().map(String::as_str).collect();
        if known.is_empty() {
            return Err(Error::configuration("`nodes` must not be empty"));
        }
        if known.len() != self.nodes.len() {
            return Err(Error::configuration("duplicate name in `nodes`"));
        }

        for name in &self.nodes {
            if !self.service_dists.contains_key(name) {
                return Err(Error::configuration(format!(
                    "node `{name}` is missing a service_dists entry"
                )));
            }
            let server_count = *self.servers.get(name).ok_or_else(|| {
                Error::configuration(format!("node `{name}` is missing a servers entry"))
            })?;
            if server_count == 0 {
                return Err(Error::configuration(format!(
                    "node `{name}` must have a positive server count"
                )));
            }
            let priorities = self.priorities.get(name).ok_or_else(|| {
                Error::configuration(format!("node `{name}` is missing a priorities entry"))
            })?;
            if priorities.is_empty() {
                return Err(Error::configuration(format!(
                    "node `{name}`'s priority list must not be empty"
                )));
            }
            if self.breakdown_dists.contains_key(name) && !self.repair_dists.contains_key(name) {
                return Err(Error::configuration(format!(
                    "node `{name}` has breakdown_dists but no matching repair_dists entry"
                )));
            }
        }

        for name in self
            .servers
            .keys()
            .chain(self.priorities.keys())
            .chain(self.service_dists.keys())
            .chain(self.arrival_dists.keys())
            .chain(self.patience_dists.keys())
            .chain(self.breakdown_dists.keys())
            .chain(self.repair_dists.keys())
        {
            if !known.contains(name.as_str()) {
                return Err(Error::configuration(format!(
                    "unknown node `{name}` referenced in configuration"
                )));
            }
        }

        for (origin, targets) in &self.routing_matrix {
            if !known.contains(origin.as_str()) {
                return Err(Error::configuration(format!(
                    "unknown origin node `{origin}` in routing_matrix"
                )));
            }
            let mut sum = 0.0;
            for (target, probability) in targets {
                if !known.contains(target.as_str()) {
                    return Err(Error::configuration(format!(
                        "unknown routing target `{target}` from `{origin}`"
                    )));
                }
                if !(*probability >= 0.0) {
                    return Err(Error::configuration(format!(
                        "negative routing probability {origin} -> {target}"
                    )));
                }
                sum += probability;
            }
            const EPS: f64 = 1e-9;
            if sum > 1.0 + EPS {
                return Err(Error::configuration(format!(
                    "routing probabilities out of `{origin}` sum to {sum}, which exceeds 1"
                )));
            }
        }

        if !(self.sim_time > 0.0) {
            return Err(Error::configuration("sim_time must be positive"));
        }
        if self.warmup < 0.0 || self.warmup > self.sim_time {
            return Err(Error::configuration(
                "warmup must lie within [0, sim_time]",
            ));
        }
        if self.batch_count == 0 {
            return Err(Error::configuration("batch_count must be positive"));
        }

        for dist in self
            .arrival_dists
            .values()
            .chain(self.service_dists.values())
            .chain(self.patience_dists.values())
            .chain(self.breakdown_dists.values())
            .chain(self.repair_dists.values())
        {
            dist.validate()?;
        }

        Ok(())
    }
}
