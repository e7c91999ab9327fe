use std::path::PathBuf;

use mci_evolution::genetic;
use mci_policy::{
    PolicySet, codec,
    generator::{ExhaustiveMode, GenerationStrategy, PolicyGenerator},
};

use crate::util::{self, Output};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum StrategyArg {
    /// Rejection-sampled random policies
    #[default]
    Random,
    /// Every (role, action, condition) combination
    Exhaustive,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ModeArg {
    /// First method, never enforced
    #[default]
    Fixed,
    /// Random method and enforcement
    Random,
    /// Random method, always enforced
    AlwaysEnforce,
}

impl From<ModeArg> for ExhaustiveMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fixed => ExhaustiveMode::Fixed,
            ModeArg::Random => ExhaustiveMode::Random,
            ModeArg::AlwaysEnforce => ExhaustiveMode::AlwaysEnforce,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct GenerateArg {
    #[arg(long, value_enum, default_value_t)]
    strategy: StrategyArg,
    /// Number of policies (random strategy)
    #[arg(long, default_value_t = genetic::DEFAULT_INDIVIDUAL_SIZE)]
    size: usize,
    /// How methods and enforcement are filled in (exhaustive strategy)
    #[arg(long, value_enum, default_value_t)]
    mode: ModeArg,
    /// Seed of the random stream (OS entropy if omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Output file path (stdout if omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

impl GenerateArg {
    fn strategy(&self) -> GenerationStrategy {
        match self.strategy {
            StrategyArg::Random => GenerationStrategy::Random { size: self.size },
            StrategyArg::Exhaustive => GenerationStrategy::Exhaustive(self.mode.into()),
        }
    }
}

pub(crate) fn run(arg: &GenerateArg) -> anyhow::Result<()> {
    let policies = generate(arg)?;
    let records = codec::encode_set(&policies)?;
    Output::save_json(&records, arg.output.clone())?;
    Ok(())
}

fn generate(arg: &GenerateArg) -> anyhow::Result<PolicySet> {
    let (seed, mut rng) = util::seeded_rng(arg.seed);
    let strategy = arg.strategy();
    let policies = PolicyGenerator::default().generate(strategy, &mut rng)?;
    tracing::info!(?strategy, seed, policies = policies.len(), "generated policy set");
    Ok(policies)
}
