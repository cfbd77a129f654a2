use crate::util::{grouped, local_time, parse_coefficient, parse_coords, parse_momentum};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use nrqcd_evolve::{
    Direction, Evolver, GaugeField, HamiltonianParams, Lattice, PersistedField, Propagator,
    SliceGeometry, SourceKind, WORKER_THREADS,
};

#[derive(Args, Debug)]
pub(super) struct EvolveArgs {
    /// Path where the propagator will be saved; `.gz` compresses it
    #[arg(short, long)]
    output: String,

    /// Lattice extents `x,y,z,t`
    #[arg(short, long, value_parser = parse_coords, default_value = "8,8,8,16")]
    dims: [usize; 4],

    /// Colour dimension of the links
    #[arg(long, default_value_t = 3)]
    colours: usize,

    /// Spread of the synthetic random links; 0 gives unit links
    #[arg(long, default_value_t = 0.0)]
    spread: f64,

    /// Seed of the synthetic gauge configuration
    #[arg(long, default_value_t = 0)]
    gauge_seed: u64,

    /// Tadpole factor; estimated from the average plaquette when omitted
    #[arg(long)]
    u0: Option<f64>,

    /// Bare quark mass in lattice units
    #[arg(short, long, default_value_t = 1.0)]
    mass: f64,

    /// Kinetic substeps on each side of the temporal link
    #[arg(short = 'n', long, default_value_t = 1)]
    substeps: usize,

    /// Wilson coefficient as `k=value`, may be repeated; c0 defaults to 1
    #[arg(short, long = "coef", value_parser = parse_coefficient)]
    coefficients: Vec<(usize, f64)>,

    /// Source profile
    #[arg(short, long, value_enum, default_value_t = Source::Point)]
    source: Source,

    /// Source position `x,y,z,t`
    #[arg(long, value_parser = parse_coords, default_value = "0,0,0,0")]
    origin: [usize; 4],

    /// Wall momentum in units of `2π/L`
    #[arg(long, value_parser = parse_momentum, default_value = "0,0,0", allow_hyphen_values = true)]
    momentum: [i64; 3],

    /// Evolve towards decreasing time
    #[arg(long)]
    backward: bool,

    /// Split the correction into halves at both ends of every slice
    #[arg(long)]
    symmetric: bool,

    /// Use improved derivatives and field strength
    #[arg(long)]
    improved: bool,

    /// Accumulate the correction in place when the active terms allow it
    #[arg(long)]
    fused: bool,

    /// The number of worker threads, 0 uses every core
    #[arg(short, long, default_value_t = 0)]
    workers: u32,

    /// Seed of the noise of stochastic sources
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Unit block at the origin
    Point,
    /// Plane wave over the origin's time-slice
    Wall,
    /// Plane wave times a random phase per site
    Stochastic,
}

pub(super) fn run_evolve(args: EvolveArgs) -> Result<()> {
    match args.colours {
        1 => evolve::<1>(&args),
        2 => evolve::<2>(&args),
        3 => evolve::<3>(&args),
        n => bail!("unsupported colour dimension {}", n),
    }
}

fn evolve<const N: usize>(args: &EvolveArgs) -> Result<()> {
    WORKER_THREADS.store(args.workers, std::sync::atomic::Ordering::Relaxed);
    let lattice = Lattice::new(args.dims)?;
    println!(
        "[{}] Lattice {:?}, {} sites",
        local_time(),
        args.dims,
        grouped(lattice.volume())
    );

    let timer = std::time::Instant::now();
    let mut gauge = if args.spread > 0.0 {
        GaugeField::<N>::random(lattice.volume(), args.spread, args.gauge_seed)
    } else {
        GaugeField::<N>::cold(lattice.volume())
    };
    let plaquette = gauge.average_plaquette(&lattice);
    let u0 = args.u0.unwrap_or_else(|| gauge.plaquette_tadpole(&lattice));
    println!(
        "Built links in {:.1} secs, plaquette {:.6}, u0 {:.6}",
        timer.elapsed().as_secs_f64(),
        plaquette,
        u0
    );

    let mut coefficients = HamiltonianParams::default().coefficients;
    for &(k, c) in args.coefficients.iter() {
        coefficients[k] = c;
    }
    let params = HamiltonianParams {
        coefficients,
        mass: args.mass,
        substeps: args.substeps,
        tadpole: u0,
        time_axis: 3,
        direction: if args.backward {
            Direction::Backward
        } else {
            Direction::Forward
        },
        symmetric: args.symmetric,
        improved: args.improved,
        fused_correction: args.fused,
    };
    let source = match args.source {
        Source::Point => SourceKind::Point,
        Source::Wall => SourceKind::Wall {
            momentum: args.momentum,
        },
        Source::Stochastic => SourceKind::StochasticWall {
            momentum: args.momentum,
        },
    };

    let geom = SliceGeometry::new(&lattice, params.time_axis)?;
    let mut output = PersistedField::<N>::new(geom.nt(), geom.v3());
    let evolver = Evolver::new(lattice)?.with_seed(args.seed);

    let timer = std::time::Instant::now();
    let mut batch = [Propagator {
        origin: args.origin,
        source,
        params,
        output: &mut output,
    }];
    evolver
        .evolve_batch(Some(&mut gauge), &mut batch)
        .context("Evolution failed")?;
    println!(
        "[{}] Evolved {} slices with {} worker(s) in {:.1} secs",
        local_time(),
        geom.nt(),
        evolver.workers(),
        timer.elapsed().as_secs_f64()
    );

    for t in 0..geom.nt() {
        println!("t = {:>3}  |G|² = {:.6e}", t, output.slice_norm_sqr(t));
    }
    output.to_file(&args.output)?;
    println!("Saved to {}", args.output);
    Ok(())
}
