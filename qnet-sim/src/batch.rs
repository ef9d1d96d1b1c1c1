//! Runs a configuration across `batch_count` independent replications and
//! reduces them to point estimates with 95% confidence intervals.

use std::collections::BTreeMap;

use qnet_core::{Error, Result};
use tracing::warn;

use crate::config::SimulationConfig;
use crate::engine::{Engine, Replication};
use crate::tdist::critical_975;

/// A point estimate with its 95% confidence interval.
///
/// With a single successful replication the interval collapses to the point
/// estimate (`ci_low == ci_high == point`); `spec` calls this out explicitly
/// rather than leaving it to divide-by-zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub point: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl Estimate {
    fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        debug_assert!(n > 0, "estimate requires at least one sample");
        let mean = samples.iter().sum::<f64>() / n as f64;
        if n == 1 {
            return Self {
                point: mean,
                ci_low: mean,
                ci_high: mean,
            };
        }
        let variance =
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        let std_err = variance.sqrt() / (n as f64).sqrt();
        let half_width = critical_975(n - 1) * std_err;
        Self {
            point: mean,
            ci_low: mean - half_width,
            ci_high: mean + half_width,
        }
    }
}

/// The aggregated result of running a configuration's `batch_count`
/// replications.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub throughput: Estimate,
    pub mean_queue_length: BTreeMap<String, Estimate>,
    pub server_utilization: BTreeMap<String, Estimate>,
    pub service_completions: BTreeMap<String, Estimate>,
    pub reneging_prob: BTreeMap<String, Estimate>,
    pub mean_waiting_time: BTreeMap<String, Estimate>,
    pub mean_system_time: BTreeMap<String, Estimate>,
    pub successful_replications: usize,
    pub failed_replications: usize,
}

/// Runs a configuration's replications and aggregates them.
pub struct BatchDriver;

impl BatchDriver {
    /// Validates `config` once, then runs `config.batch_count` independent
    /// replications seeded deterministically from `config.seed`
    /// (replication `i` uses `config.seed.wrapping_add(i as u64)`).
    ///
    /// A replication that aborts with an [`Error::InvariantViolation`] or
    /// [`Error::NumericDomain`] is recorded as failed and excluded from the
    /// aggregate rather than failing the whole batch; `BatchResult`
    /// surfaces how many replications actually succeeded. If every
    /// replication fails, that's reported as an error, since there is
    /// nothing to aggregate.
    pub fn run(config: &SimulationConfig) -> Result<BatchResult> {
        config.validate()?;

        let mut successes = Vec::with_capacity(config.batch_count);
        let mut failed = 0usize;
        for i in 0..config.batch_count {
            let seed = config.seed.wrapping_add(i as u64);
            let mut engine = Engine::new(config, seed)?;
            match engine.run() {
                Ok(replication) => successes.push(replication),
                Err(err) => {
                    warn!(replication = i, error = %err, "replication aborted");
                    failed += 1;
                }
            }
        }

        if successes.is_empty() {
            return Err(Error::invariant(format!(
                "all {} replications failed; nothing to aggregate",
                config.batch_count
            )));
        }

        Ok(Self::aggregate(&successes, failed))
    }

    fn aggregate(successes: &[Replication], failed: usize) -> BatchResult {
        let throughput =
            Estimate::from_samples(&successes.iter().map(|r| r.throughput).collect::<Vec<_>>());

        let node_names: Vec<&String> = successes[0].mean_queue_length.keys().collect();

        let per_node = |select: fn(&Replication, &str) -> f64| -> BTreeMap<String, Estimate> {
            node_names
                .iter()
                .map(|name| {
                    let samples: Vec<f64> =
                        successes.iter().map(|r| select(r, name)).collect();
                    ((*name).clone(), Estimate::from_samples(&samples))
                })
                .collect()
        };

        BatchResult {
            throughput,
            mean_queue_length: per_node(|r, n| r.mean_queue_length[n]),
            server_utilization: per_node(|r, n| r.server_utilization[n]),
            service_completions: per_node(|r, n| r.service_completions[n] as f64),
            reneging_prob: per_node(|r, n| r.reneging_prob[n]),
            mean_waiting_time: per_node(|r, n| r.mean_waiting_time[n]),
            mean_system_time: per_node(|r, n| r.mean_system_time[n]),
            successful_replications: successes.len(),
            failed_replications: failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_collapses_ci_to_point() {
        let estimate = Estimate::from_samples(&[3.5]);
        assert_eq!(estimate.point, 3.5);
        assert_eq!(estimate.ci_low, 3.5);
        assert_eq!(estimate.ci_high, 3.5);
    }

    #[test]
    fn identical_samples_have_zero_width_interval() {
        let estimate = Estimate::from_samples(&[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(estimate.ci_low, 2.0);
        assert_eq!(estimate.ci_high, 2.0);
    }

    #[test]
    fn spread_samples_widen_the_interval() {
        let estimate = Estimate::from_samples(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(estimate.ci_low < estimate.point);
        assert!(estimate.ci_high > estimate.point);
    }

    #[test]
    fn batch_driver_rejects_invalid_configuration_before_running() {
        let mut servers = BTreeMap::new();
        servers.insert("A".to_string(), 0); // invalid: zero servers
        let config = SimulationConfig {
            nodes: vec!["A".to_string()],
            servers,
            priorities: BTreeMap::new(),
            service_dists: BTreeMap::new(),
            arrival_dists: BTreeMap::new(),
            patience_dists: BTreeMap::new(),
            breakdown_dists: BTreeMap::new(),
            repair_dists: BTreeMap::new(),
            routing_matrix: BTreeMap::new(),
            sim_time: 10.0,
            warmup: 0.0,
            batch_count: 3,
            seed: 1,
        };
        assert!(BatchDriver::run(&config).is_err());
    }
}
