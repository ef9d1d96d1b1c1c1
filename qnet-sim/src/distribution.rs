//! Service-time, inter-arrival, patience, breakdown and repair distributions.
//!
//! Every variant consumes exactly one draw from the shared [`Rng`] stream per
//! `sample` call, regardless of which distribution is plugged into a given
//! role. That's what lets a scenario swap `Exponential` for `Constant` in one
//! spot without shifting the draw positions everything else in the
//! replication depends on.

use qnet_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::rng::Rng;

/// A duration-valued distribution usable anywhere the simulator needs a
/// non-negative random (or deterministic) time interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Exponential { rate: f64 },
    Constant { value: f64 },
}

impl Distribution {
    /// Builds an exponential distribution, validating `rate > 0` immediately.
    pub fn exponential(rate: f64) -> Result<Self> {
        let dist = Self::Exponential { rate };
        dist.validate()?;
        Ok(dist)
    }

    /// Builds a constant (degenerate) distribution, validating `value >= 0`.
    pub fn constant(value: f64) -> Result<Self> {
        let dist = Self::Constant { value };
        dist.validate()?;
        Ok(dist)
    }

    /// Re-checks the distribution's own parameter constraints.
    ///
    /// Construction via [`Distribution::exponential`]/[`Distribution::constant`]
    /// already validates, but configuration loaded through `serde` bypasses
    /// those constructors, so [`crate::config::SimulationConfig::validate`]
    /// calls this directly on every distribution it holds.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Exponential { rate } => {
                if *rate > 0.0 && rate.is_finite() {
                    Ok(())
                } else {
                    Err(Error::configuration(format!(
                        "exponential rate must be finite and > 0, got {rate}"
                    )))
                }
            }
            Self::Constant { value } => {
                if *value >= 0.0 && value.is_finite() {
                    Ok(())
                } else {
                    Err(Error::configuration(format!(
                        "constant value must be finite and >= 0, got {value}"
                    )))
                }
            }
        }
    }

    /// Draws a single non-negative duration, consuming exactly one RNG draw.
    pub fn sample(&self, rng: &mut Rng) -> f64 {
        match self {
            Self::Exponential { rate } => loop {
                let u = rng.uniform();
                let complement = 1.0 - u;
                // `complement` is mathematically in (0, 1] for u in [0, 1);
                // guard the log anyway since the contract (spec §4.1/§7)
                // requires defending against a stream that ever hands back
                // exactly 1.0 rather than trusting the float arithmetic.
                if complement > 0.0 {
                    return -complement.ln() / rate;
                }
            },
            Self::Constant { value } => {
                let _ = rng.uniform();
                *value
            }
        }
    }
}
