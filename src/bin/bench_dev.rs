use nrqcd_evolve::*;

fn main() {
    // stepping a point source on growing lattices with every correction switched on
    for l in [8, 12, 16, 24] {
        let lattice = Lattice::new([l, l, l, 2 * l]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<3>::random(lattice.volume(), 0.3, 1);
        let u0 = gauge.plaquette_tadpole(&lattice);
        let mut params = HamiltonianParams {
            mass: 2.5,
            substeps: 2,
            improved: true,
            tadpole: u0,
            ..Default::default()
        };
        for kind in TermKind::corrections() {
            params = params.with_coefficient(kind, 1.0);
        }
        println!("L={l}\tu0={u0:.4}");

        let mut run =
            PropagatorRun::new(&geom, &gauge, params, [0; 4], SourceKind::Point, None).unwrap();
        let timer = std::time::Instant::now();
        for _ in 1..geom.nt() {
            run.step();
        }
        let elapsed = timer.elapsed().as_secs_f64();
        println!(
            "{} steps -> {:?} ({:.3e} secs/site)",
            run.steps(),
            elapsed,
            elapsed / (run.steps() * geom.v3()) as f64
        );
    }
}
