use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use self::{evolve::EvolveArg, generate::GenerateArg, validate::ValidateArg};

mod evolve;
mod generate;
mod validate;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log filter, e.g. `debug` or `mci_evolution=trace` (defaults to `RUST_LOG`, then `info`)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Generate a policy set
    Generate(#[clap(flatten)] GenerateArg),
    /// Decode and validate a policy file
    Validate(#[clap(flatten)] ValidateArg),
    /// Optimize policy sets against the simulator
    Evolve(#[clap(flatten)] EvolveArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing(args.log_level.as_deref());
    match args.mode {
        Mode::Generate(arg) => generate::run(&arg)?,
        Mode::Validate(arg) => validate::run(&arg)?,
        Mode::Evolve(arg) => evolve::run(&arg)?,
    }
    Ok(())
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout carries JSON output
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
