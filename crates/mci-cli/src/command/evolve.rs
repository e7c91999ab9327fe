use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;
use mci_evolution::{
    fitness::{FitnessEvaluator, SimulatorEvaluator},
    genetic::{Individual, Population},
};
use mci_policy::{PolicySet, codec, validator};
use rand::Rng;

use crate::{
    config::EvolveConfig,
    schema::evolution_report::EvolutionReport,
    util::{self, Output},
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct EvolveArg {
    /// Configuration file (JSON); built-in defaults if omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed of the random stream (overrides the configuration)
    #[arg(long)]
    seed: Option<u64>,
    /// Number of generations (overrides the configuration)
    #[arg(long)]
    generations: Option<usize>,
    /// Previous policy set to seed the population with (overrides the configuration)
    #[arg(long)]
    previous: Option<PathBuf>,
    /// Evaluate individuals concurrently (needs `{index}` in simulator.result_file)
    #[arg(long)]
    parallel: bool,
    /// Report file path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Also write the best policy set as a policy file
    #[arg(long)]
    best_output: Option<PathBuf>,
}

pub(crate) fn run(arg: &EvolveArg) -> anyhow::Result<()> {
    let config = load_config(arg)?;
    let evaluator = SimulatorEvaluator::new(config.simulator.clone());
    let (seed, mut rng) = util::seeded_rng(config.seed);

    let (report, best) = evolve(&config, seed, &evaluator, arg.parallel, &mut rng)?;

    if let Some(path) = &arg.best_output {
        Output::save_json(&codec::encode_set(&best)?, Some(path.clone()))?;
        tracing::info!(path = %path.display(), "best policy set saved");
    }
    Output::save_json(&report, arg.output.clone())?;
    tracing::info!(
        seed = report.seed,
        best_fitness = report.best_fitness,
        policies = report.best_policies.len(),
        "evolution completed"
    );
    Ok(())
}

fn load_config(arg: &EvolveArg) -> anyhow::Result<EvolveConfig> {
    let mut config: EvolveConfig = match &arg.config {
        Some(path) => util::read_json_file("evolve config", path)?,
        None => EvolveConfig::default(),
    };
    if let Some(seed) = arg.seed {
        config.seed = Some(seed);
    }
    if let Some(generations) = arg.generations {
        config.generations = generations;
    }
    if let Some(previous) = &arg.previous {
        config.previous_policy.clone_from(previous);
    }
    config.validate().context("Invalid evolve configuration")?;
    anyhow::ensure!(
        !arg.parallel || config.simulator.separates_jobs(),
        "--parallel needs an `{{index}}` placeholder in simulator.result_file, got `{}`",
        config.simulator.result_file
    );
    Ok(config)
}

/// Runs the evolutionary loop and returns the report and the best policy set.
///
/// The initial population is generation 0; `config.generations` further
/// generations are bred and evaluated after it.
fn evolve<E, R>(
    config: &EvolveConfig,
    seed: u64,
    evaluator: &E,
    parallel: bool,
    rng: &mut R,
) -> anyhow::Result<(EvolutionReport, PolicySet)>
where
    E: FitnessEvaluator + ?Sized,
    R: Rng + ?Sized,
{
    let evolver = config.evolver();
    let mut population = Population::random(
        config.population_size,
        config.individual_size,
        &config.generator(),
        rng,
    )
    .context("Failed to generate the initial population")?;
    if let Some(previous) = load_previous(&config.previous_policy)? {
        population.push(Individual::new(previous));
    }

    for generation in 0..=config.generations {
        if generation > 0 {
            population = evolver.evolve(&population, rng);
        }
        population
            .evaluate_fitness(evaluator, generation, parallel)
            .with_context(|| format!("Failed to evaluate generation {generation}"))?;

        for (i, ind) in population.individuals().iter().enumerate() {
            tracing::debug!(
                generation,
                rank = i,
                fitness = ind.fitness(),
                policies = ind.policies().len(),
                "individual"
            );
        }
        if let Some(stats) = population.fitness_stats() {
            tracing::info!(
                generation,
                min = stats.min,
                max = stats.max,
                mean = stats.mean,
                median = stats.median,
                std_dev = stats.std_dev,
                "fitness"
            );
        }
    }

    let best = population
        .best()
        .context("No individual was evaluated")?;
    let best_fitness = best.fitness().unwrap_or(f64::NEG_INFINITY);
    let report = EvolutionReport {
        finished_at: Utc::now(),
        seed,
        generations: config.generations,
        population_size: population.len(),
        best_fitness,
        final_stats: population.fitness_stats(),
        best_policies: codec::encode_set(best.policies())?,
    };
    Ok((report, best.policies().clone()))
}

/// Reads the previous policy set if the file exists.
///
/// Rejected or invalid records are skipped with a warning; a set with no usable
/// policy is ignored.
fn load_previous(path: &Path) -> anyhow::Result<Option<PolicySet>> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no previous policy set");
        return Ok(None);
    }
    let decoded = util::read_policy_file(path)?;
    for rejected in &decoded.rejected {
        tracing::warn!(
            position = rejected.position,
            error = %rejected.error,
            "skipping undecodable previous policy"
        );
    }
    let policies: PolicySet = decoded
        .policies
        .into_iter()
        .filter(|policy| match validator::check(policy) {
            Ok(()) => true,
            Err(violation) => {
                tracing::warn!(%policy, %violation, "skipping invalid previous policy");
                false
            }
        })
        .collect();
    if policies.is_empty() {
        tracing::warn!(path = %path.display(), "previous policy set has no valid policy");
        return Ok(None);
    }
    tracing::info!(
        path = %path.display(),
        policies = policies.len(),
        "seeding population with previous policy set"
    );
    Ok(Some(policies))
}
