use chrono::{DateTime, Utc};
use mci_evolution::stats::FitnessStats;
use mci_policy::codec::PolicyRecord;
use serde::{Deserialize, Serialize};

/// Outcome of an `evolve` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionReport {
    /// Timestamp when the run finished (ISO 8601 format)
    pub finished_at: DateTime<Utc>,
    /// Seed of the random stream; rerunning with it reproduces the search
    pub seed: u64,
    /// Number of generations evolved after the initial population
    pub generations: usize,
    pub population_size: usize,
    pub best_fitness: f64,
    /// Fitness summary of the final population
    pub final_stats: Option<FitnessStats>,
    /// Best policy set as JSON policy records
    pub best_policies: Vec<PolicyRecord>,
}
