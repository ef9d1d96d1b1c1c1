#![forbid(unsafe_code)]

//! Shared error taxonomy and logging setup for the `qnet-*` workspace.
//!
//! This crate intentionally stays lightweight: it carries only the
//! ambient concerns used across crates (error handling, tracing setup),
//! not simulation logic.

pub mod error;
pub mod telemetry;

pub use error::{Error, Result};
