//! Evolutionary search over MCI policy sets.
//!
//! This crate drives the optimization loop around the `mci-policy` core:
//!
//! - [`genetic`] - individuals, populations, tournament selection, two-point
//!   crossover and set mutation
//! - [`fitness`] - the [`FitnessEvaluator`](fitness::FitnessEvaluator) boundary and
//!   the file-based [`SimulatorEvaluator`](fitness::SimulatorEvaluator)
//! - [`stats`] - per-generation fitness summaries
//!
//! The core never calls into this crate; it only supplies policy generation,
//! mutation and the JSON codec.

pub mod fitness;
pub mod genetic;
pub mod stats;
