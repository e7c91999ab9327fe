//! Genetic algorithm over policy sets.
//!
//! Each generation runs this cycle:
//!
//! 1. **Evaluate Fitness** - every individual without a score is sent to the
//!    [`FitnessEvaluator`]; the population is then sorted best first
//! 2. **Elite Selection** - the top `elite_count` individuals survive unchanged
//! 3. **Tournament Selection** - the remaining slots are filled with copies of
//!    tournament winners
//! 4. **Two-point Crossover** - consecutive offspring pairs swap a run of policies
//!    with probability `crossover_rate`
//! 5. **Mutation** - each offspring is passed to
//!    [`PolicyMutator::mutate_individual`] with probability `mutation_rate`
//!
//! An offspring that was crossed over or mutated loses its score and is evaluated
//! again in the next generation; untouched copies keep theirs.
//!
//! # Example
//!
//! ```
//! use mci_evolution::{
//!     fitness::{EvaluationError, EvaluationJob, FitnessEvaluator},
//!     genetic::{Population, PopulationEvolver},
//! };
//! use mci_policy::{PolicySet, generator::PolicyGenerator};
//! use rand::SeedableRng as _;
//! use rand_pcg::Pcg32;
//!
//! /// Prefers smaller policy sets.
//! #[derive(Debug)]
//! struct Smallest;
//!
//! impl FitnessEvaluator for Smallest {
//!     fn evaluate(&self, _: EvaluationJob, policies: &PolicySet) -> Result<f64, EvaluationError> {
//!         Ok(-(policies.len() as f64))
//!     }
//! }
//!
//! let mut rng = Pcg32::seed_from_u64(0);
//! let mut population = Population::random(5, 10, &PolicyGenerator::default(), &mut rng).unwrap();
//! let evolver = PopulationEvolver::default();
//! for generation in 0..5 {
//!     population.evaluate_fitness(&Smallest, generation, false).unwrap();
//!     population = evolver.evolve(&population, &mut rng);
//! }
//! assert_eq!(population.len(), 5);
//! ```

use std::{panic, thread};

use mci_policy::{
    GenerationExhausted, PolicySet, generator::PolicyGenerator, mutator::PolicyMutator,
};
use rand::{Rng, seq::IndexedRandom as _};

use crate::{
    fitness::{EvaluationError, EvaluationJob, FitnessEvaluator},
    stats::FitnessStats,
};

pub const DEFAULT_POPULATION_SIZE: usize = 5;
pub const DEFAULT_INDIVIDUAL_SIZE: usize = 10;
pub const DEFAULT_GENERATIONS: usize = 5;
pub const DEFAULT_TOURNAMENT_SIZE: usize = 3;
pub const DEFAULT_CROSSOVER_RATE: f64 = 0.5;
pub const DEFAULT_MUTATION_RATE: f64 = 0.2;
pub const DEFAULT_POLICY_MUTATION_RATE: f64 = 0.1;

/// A candidate policy set and its score, if it has been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    policies: PolicySet,
    fitness: Option<f64>,
}

impl Individual {
    /// Creates an unevaluated individual.
    #[must_use]
    pub fn new(policies: PolicySet) -> Self {
        Self {
            policies,
            fitness: None,
        }
    }

    #[must_use]
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    #[must_use]
    pub fn into_policies(self) -> PolicySet {
        self.policies
    }

    /// Returns the score, or `None` if the individual needs evaluation.
    #[must_use]
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    fn rank(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    /// Creates `count` individuals of `individual_size` random valid policies.
    pub fn random<R>(
        count: usize,
        individual_size: usize,
        generator: &PolicyGenerator,
        rng: &mut R,
    ) -> Result<Self, GenerationExhausted>
    where
        R: Rng + ?Sized,
    {
        let individuals = (0..count)
            .map(|_| {
                generator
                    .generate_individual(individual_size, rng)
                    .map(Individual::new)
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { individuals })
    }

    #[must_use]
    pub fn from_individuals(individuals: Vec<Individual>) -> Self {
        Self { individuals }
    }

    pub fn push(&mut self, individual: Individual) {
        self.individuals.push(individual);
    }

    #[must_use]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Returns the best evaluated individual.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .filter(|ind| ind.fitness.is_some())
            .max_by(|a, b| a.rank().total_cmp(&b.rank()))
    }

    /// Evaluates every individual without a score.
    ///
    /// Jobs are numbered by position in the population. With `parallel`, each job
    /// runs on its own scoped thread if the evaluator
    /// [supports it](FitnessEvaluator::supports_parallel). Afterwards individuals
    /// are sorted by fitness, best first, with unevaluated ones last.
    ///
    /// If any evaluation fails, the scores that did succeed are kept and the first
    /// failure in index order is returned.
    pub fn evaluate_fitness<E>(
        &mut self,
        evaluator: &E,
        generation: usize,
        parallel: bool,
    ) -> Result<(), EvaluationError>
    where
        E: FitnessEvaluator + ?Sized,
    {
        let parallel = if parallel && !evaluator.supports_parallel() {
            tracing::warn!(generation, "evaluator cannot run jobs concurrently");
            false
        } else {
            parallel
        };
        let pending = self
            .individuals
            .iter()
            .enumerate()
            .filter(|(_, ind)| ind.fitness.is_none())
            .map(|(index, ind)| (EvaluationJob { generation, index }, &ind.policies));

        let results: Vec<_> = if parallel {
            thread::scope(|s| {
                let handles: Vec<_> = pending
                    .map(|(job, policies)| (job, s.spawn(move || evaluator.evaluate(job, policies))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(job, handle)| {
                        let result = handle
                            .join()
                            .unwrap_or_else(|payload| panic::resume_unwind(payload));
                        (job, result)
                    })
                    .collect()
            })
        } else {
            pending
                .map(|(job, policies)| (job, evaluator.evaluate(job, policies)))
                .collect()
        };

        let mut first_error = None;
        for (job, result) in results {
            match result {
                Ok(fitness) => {
                    tracing::debug!(generation, index = job.index, fitness, "evaluated individual");
                    self.individuals[job.index].fitness = Some(fitness);
                }
                Err(error) => {
                    tracing::error!(generation, index = job.index, %error, "evaluation failed");
                    first_error.get_or_insert(error);
                }
            }
        }

        // sort by fitness descending
        self.individuals
            .sort_by(|a, b| b.rank().total_cmp(&a.rank()));

        first_error.map_or(Ok(()), Err)
    }

    /// Summarizes the scores of the evaluated individuals.
    #[must_use]
    pub fn fitness_stats(&self) -> Option<FitnessStats> {
        FitnessStats::new(self.individuals.iter().filter_map(Individual::fitness))
    }
}

/// Controls how one generation becomes the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationEvolver {
    /// Number of top individuals preserved unchanged.
    pub elite_count: usize,
    /// Individuals drawn per tournament (larger = stronger selection pressure).
    pub tournament_size: usize,
    /// Probability that an offspring pair is crossed over.
    pub crossover_rate: f64,
    /// Probability that an offspring is mutated.
    pub mutation_rate: f64,
    /// Per-policy modification probability inside a mutated offspring.
    pub policy_mutation_rate: f64,
    pub mutator: PolicyMutator,
}

impl Default for PopulationEvolver {
    fn default() -> Self {
        Self {
            elite_count: 0,
            tournament_size: DEFAULT_TOURNAMENT_SIZE,
            crossover_rate: DEFAULT_CROSSOVER_RATE,
            mutation_rate: DEFAULT_MUTATION_RATE,
            policy_mutation_rate: DEFAULT_POLICY_MUTATION_RATE,
            mutator: PolicyMutator::default(),
        }
    }
}

impl PopulationEvolver {
    /// Creates the next generation, the same size as `population`.
    ///
    /// `population` should be sorted best first, as left by
    /// [`Population::evaluate_fitness`].
    ///
    /// An offspring whose mutation exhausts its retry bound is kept as it was
    /// before mutation.
    #[must_use]
    pub fn evolve<R>(&self, population: &Population, rng: &mut R) -> Population
    where
        R: Rng + ?Sized,
    {
        let individuals = &population.individuals;
        let elite_count = self.elite_count.min(individuals.len());
        let mut next_individuals = individuals[..elite_count].to_vec();

        let mut offspring = Vec::with_capacity(individuals.len() - elite_count);
        while elite_count + offspring.len() < individuals.len() {
            let Some(winner) = tournament_select(individuals, self.tournament_size, rng) else {
                break;
            };
            offspring.push(winner.clone());
        }

        for pair in offspring.chunks_exact_mut(2) {
            let [first, second] = pair else {
                continue;
            };
            if rng.random_bool(self.crossover_rate)
                && two_point_crossover(&mut first.policies, &mut second.policies, rng)
            {
                first.fitness = None;
                second.fitness = None;
            }
        }

        for child in &mut offspring {
            if !rng.random_bool(self.mutation_rate) {
                continue;
            }
            let original = child.policies.clone();
            match self
                .mutator
                .mutate_individual(&mut child.policies, self.policy_mutation_rate, rng)
            {
                Ok(outcome) => {
                    tracing::trace!(?outcome, "mutated offspring");
                    child.fitness = None;
                }
                Err(error) => {
                    tracing::warn!(%error, "offspring left unmutated");
                    child.policies = original;
                }
            }
        }

        next_individuals.extend(offspring);
        Population {
            individuals: next_individuals,
        }
    }
}

/// Draws `tournament_size` distinct individuals and returns the fittest.
///
/// Unevaluated individuals rank below every evaluated one.
fn tournament_select<'a, R>(
    population: &'a [Individual],
    tournament_size: usize,
    rng: &mut R,
) -> Option<&'a Individual>
where
    R: Rng + ?Sized,
{
    population
        .choose_multiple(rng, tournament_size.max(1))
        .max_by(|a, b| a.rank().total_cmp(&b.rank()))
}

/// Swaps the policies between two cut points of both sets.
///
/// Cut points lie within the shorter set; sets with fewer than two policies are
/// left untouched and `false` is returned.
pub fn two_point_crossover<R>(first: &mut PolicySet, second: &mut PolicySet, rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    let size = first.len().min(second.len());
    if size < 2 {
        return false;
    }
    let mut start = rng.random_range(1..=size);
    let mut end = rng.random_range(1..size);
    if end >= start {
        end += 1;
    } else {
        (start, end) = (end, start);
    }
    first.policies_mut()[start..end].swap_with_slice(&mut second.policies_mut()[start..end]);
    true
}
