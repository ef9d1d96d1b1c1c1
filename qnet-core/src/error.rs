use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The error taxonomy shared by every `qnet-*` crate.
///
/// `Configuration` errors are raised before a replication starts and abort
/// the run. `InvariantViolation` and `NumericDomain` are fatal: they abort
/// only the current replication and are always surfaced to the caller,
/// never swallowed or retried (the simulation is deterministic, so a
/// failure is reproducible).
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("numeric domain: {0}")]
    NumericDomain(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
    pub fn numeric_domain(msg: impl Into<String>) -> Self {
        Self::NumericDomain(msg.into())
    }

    /// True for errors that abort only the current replication rather than
    /// the whole configuration/batch.
    pub fn is_replication_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::NumericDomain(_))
    }
}
