//! Opt-in `tracing` subscriber setup for host binaries and test harnesses.
//!
//! Library crates must never install global state just by being linked in,
//! so nothing in `qnet-sim` calls this on its own; a host application (or a
//! `tests/` integration harness) calls it once at startup.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber driven by `RUST_LOG` (default: `info`).
///
/// Safe to call more than once; later calls are no-ops if a global
/// subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
