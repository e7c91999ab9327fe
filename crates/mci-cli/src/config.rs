//! Configuration of the `evolve` command.
//!
//! Every field has a default, so a configuration file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "generations": 20,
//!   "simulator": { "command": ["java", "-Xmx4g", "-jar", "SIMVASoS-MCI.jar"] }
//! }
//! ```

use std::path::PathBuf;

use mci_evolution::{
    fitness::SimulatorConfig,
    genetic::{self, PopulationEvolver},
};
use mci_policy::{
    generator::{self, PolicyGenerator},
    mutator::{self, PolicyMutator},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvolveConfig {
    pub population_size: usize,
    /// Policies per randomly generated individual.
    pub individual_size: usize,
    /// Generations evolved after evaluating the initial population.
    pub generations: usize,
    pub elite_count: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub policy_mutation_rate: f64,
    pub add_probability: f64,
    pub remove_probability: f64,
    /// Individuals at or below this size never lose a policy.
    pub min_individual_size: usize,
    /// Retry bound of policy generation and mutation.
    pub max_attempts: usize,
    pub seed: Option<u64>,
    /// Policy set added to the initial population when the file exists.
    pub previous_policy: PathBuf,
    pub simulator: SimulatorConfig,
}

impl Default for EvolveConfig {
    fn default() -> Self {
        Self {
            population_size: genetic::DEFAULT_POPULATION_SIZE,
            individual_size: genetic::DEFAULT_INDIVIDUAL_SIZE,
            generations: genetic::DEFAULT_GENERATIONS,
            elite_count: 0,
            tournament_size: genetic::DEFAULT_TOURNAMENT_SIZE,
            crossover_rate: genetic::DEFAULT_CROSSOVER_RATE,
            mutation_rate: genetic::DEFAULT_MUTATION_RATE,
            policy_mutation_rate: genetic::DEFAULT_POLICY_MUTATION_RATE,
            add_probability: mutator::DEFAULT_ADD_PROBABILITY,
            remove_probability: mutator::DEFAULT_REMOVE_PROBABILITY,
            min_individual_size: 1,
            max_attempts: generator::DEFAULT_MAX_ATTEMPTS,
            seed: None,
            previous_policy: PathBuf::from("json/previousPolicy.json"),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl EvolveConfig {
    /// Rejects settings the evolutionary loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let rates = [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
            ("policy_mutation_rate", self.policy_mutation_rate),
            ("add_probability", self.add_probability),
            ("remove_probability", self.remove_probability),
        ];
        for (name, rate) in rates {
            anyhow::ensure!(
                (0.0..=1.0).contains(&rate),
                "{name} must be between 0 and 1, got {rate}"
            );
        }
        anyhow::ensure!(
            self.add_probability + self.remove_probability <= 1.0,
            "add_probability and remove_probability must sum to at most 1"
        );
        anyhow::ensure!(self.population_size > 0, "population_size must be positive");
        anyhow::ensure!(self.individual_size > 0, "individual_size must be positive");
        anyhow::ensure!(self.tournament_size > 0, "tournament_size must be positive");
        anyhow::ensure!(self.max_attempts > 0, "max_attempts must be positive");
        anyhow::ensure!(
            !self.simulator.command.is_empty(),
            "simulator.command must name a program"
        );
        Ok(())
    }

    pub fn generator(&self) -> PolicyGenerator {
        PolicyGenerator {
            max_attempts: self.max_attempts,
        }
    }

    pub fn evolver(&self) -> PopulationEvolver {
        PopulationEvolver {
            elite_count: self.elite_count,
            tournament_size: self.tournament_size,
            crossover_rate: self.crossover_rate,
            mutation_rate: self.mutation_rate,
            policy_mutation_rate: self.policy_mutation_rate,
            mutator: PolicyMutator {
                max_attempts: self.max_attempts,
                add_probability: self.add_probability,
                remove_probability: self.remove_probability,
                min_size: self.min_individual_size,
                generator: self.generator(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::util;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolve.json");
        fs::write(
            &path,
            r#"{ "generations": 20, "seed": 4, "simulator": { "result_file": "out.txt" } }"#,
        )
        .unwrap();

        let config: EvolveConfig = util::read_json_file("evolve config", &path).unwrap();
        assert_eq!(config.generations, 20);
        assert_eq!(config.seed, Some(4));
        assert_eq!(config.population_size, 5);
        assert_eq!(config.simulator.result_file, "out.txt");
        assert_eq!(
            config.simulator.command,
            vec!["java", "-jar", "SIMVASoS-MCI.jar"]
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = serde_json::from_str::<EvolveConfig>(r#"{ "generation": 3 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let bad = [
            EvolveConfig {
                crossover_rate: 1.5,
                ..EvolveConfig::default()
            },
            EvolveConfig {
                add_probability: 0.6,
                remove_probability: 0.6,
                ..EvolveConfig::default()
            },
            EvolveConfig {
                tournament_size: 0,
                ..EvolveConfig::default()
            },
            EvolveConfig {
                population_size: 0,
                ..EvolveConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
        EvolveConfig::default().validate().unwrap();
    }

    #[test]
    fn test_evolver_carries_settings() {
        let config = EvolveConfig {
            elite_count: 2,
            max_attempts: 50,
            min_individual_size: 3,
            ..EvolveConfig::default()
        };
        let evolver = config.evolver();
        assert_eq!(evolver.elite_count, 2);
        assert_eq!(evolver.mutator.min_size, 3);
        assert_eq!(evolver.mutator.generator.max_attempts, 50);
    }
}
