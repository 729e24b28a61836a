//! Command-line interface for the threadengine demo binary
//!
//! The binary exercises the toolkit end to end: a shared-counter run across
//! many workers, a producer/consumer handoff over a wait condition, and a
//! dump of the effective registry configuration.

pub mod commands;
mod output;

pub use commands::{Cli, Commands};
pub use output::Output;
