mod evolve;
mod inspect;
mod util;

use clap::{Parser, Subcommand};
use env_logger::Env;
use evolve::{run_evolve, EvolveArgs};
use inspect::{run_inspect, InspectArgs};

#[derive(Parser, Debug)]
#[command(version, about)]
struct CLIParser {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Evolve a heavy-quark propagator through every time-slice and save it
    Evolve(EvolveArgs),
    /// Print the shape and per-slice norms of a saved propagator
    Inspect(InspectArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = CLIParser::parse();

    match args.action {
        Action::Evolve(args) => run_evolve(args),
        Action::Inspect(args) => run_inspect(args),
    }
}
