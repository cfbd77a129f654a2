use crate::util::grouped;
use anyhow::{bail, Result};
use clap::Args;
use nrqcd_evolve::PersistedField;

#[derive(Args, Debug)]
pub(super) struct InspectArgs {
    /// Path to a saved propagator, optionally `.gz`
    path: String,

    /// Colour dimension the propagator was written with
    #[arg(long, default_value_t = 3)]
    colours: usize,
}

pub(super) fn run_inspect(args: InspectArgs) -> Result<()> {
    match args.colours {
        1 => inspect::<1>(&args.path),
        2 => inspect::<2>(&args.path),
        3 => inspect::<3>(&args.path),
        n => bail!("unsupported colour dimension {}", n),
    }
}

fn inspect<const N: usize>(path: &str) -> Result<()> {
    let timer = std::time::Instant::now();
    let field = PersistedField::<N>::from_file(path)?;
    println!(
        "Loaded {} slices of {} sites ({} values) in {:.1} secs",
        field.nt(),
        grouped(field.v3()),
        grouped(field.as_slice().len()),
        timer.elapsed().as_secs_f64()
    );
    for t in 0..field.nt() {
        println!("t = {:>3}  |G|² = {:.6e}", t, field.slice_norm_sqr(t));
    }
    Ok(())
}
