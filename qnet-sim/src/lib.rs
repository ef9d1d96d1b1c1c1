#![forbid(unsafe_code)]

//! Discrete-event simulator for networks of multi-server queues.
//!
//! Stochastic arrivals, service, impatience (reneging), breakdowns/repairs
//! and probabilistic routing are all driven off a single deterministic RNG
//! stream, so that a given seed reproduces an identical replication bit for
//! bit. [`BatchDriver`] runs a configuration across many such replications
//! and reduces them to point estimates with confidence intervals.
//!
//! ```text
//! rng -> distribution -> event -> server/node -> stats -> engine -> batch
//! ```
//! Each layer only depends on the ones before it; `engine` is the only
//! place that wires a `Node`'s state machine to the shared RNG and event
//! queue, and `batch` is the only place that runs more than one replication.

pub mod batch;
pub mod config;
pub mod customer;
pub mod distribution;
pub mod engine;
pub mod event;
pub mod node;
pub mod rng;
pub mod server;
pub mod stats;
pub mod tdist;

pub use batch::{BatchDriver, BatchResult, Estimate};
pub use config::SimulationConfig;
pub use customer::Customer;
pub use distribution::Distribution;
pub use engine::{Engine, Replication};
pub use rng::Rng;
