#[cfg(test)]
mod tests {
    use nrqcd_evolve::*;
    use serial_test::serial;
    use std::f64::consts::TAU;

    fn point_params() -> HamiltonianParams {
        HamiltonianParams {
            mass: 1.5,
            substeps: 1,
            ..Default::default()
        }
    }

    /// Periodic Manhattan distance between two slice sites.
    fn distance(geom: &SliceGeometry, a: usize, b: usize) -> usize {
        let (x, y) = (geom.spatial_coords(a), geom.spatial_coords(b));
        let dims = geom.spatial_dims();
        (0..3)
            .map(|i| {
                let d = x[i].abs_diff(y[i]);
                d.min(dims[i] - d)
            })
            .sum()
    }

    fn support_radius<const N: usize>(
        geom: &SliceGeometry,
        field: &Field<N>,
        origin: usize,
    ) -> usize {
        (0..geom.v3())
            .filter(|&j| !field[j].is_zero())
            .map(|j| distance(geom, origin, j))
            .max()
            .unwrap_or(0)
    }

    /// `|G|²` of one free kinetic step from a point source, summed in momentum space.
    fn free_point_norm(dims: [usize; 3], colours: usize, kappa: f64, substeps: i32) -> f64 {
        let v3 = dims.iter().product::<usize>();
        let mut sum = 0.0;
        for a in 0..dims[0] {
            for b in 0..dims[1] {
                for c in 0..dims[2] {
                    let s: f64 = [(a, dims[0]), (b, dims[1]), (c, dims[2])]
                        .iter()
                        .map(|&(n, l)| (TAU * n as f64 / l as f64 / 2.0).sin().powi(2))
                        .sum();
                    sum += (1.0 - 4.0 * kappa * s).powi(4 * substeps);
                }
            }
        }
        2.0 * colours as f64 * sum / v3 as f64
    }

    fn max_distance<const N: usize>(a: &Field<N>, b: &Field<N>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let mut d = *x;
                d.accumulate_scaled(y, -1.0);
                d.norm_sqr()
            })
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_point_source_single_step() {
        let lattice = Lattice::new([4, 4, 4, 4]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<1>::cold(lattice.volume());
        let params = point_params();
        let kappa = params.kinetic_weight();
        assert!((kappa - 1.0 / 6.0).abs() < 1e-15);

        let mut run =
            PropagatorRun::new(&geom, &gauge, params, [0; 4], SourceKind::Point, None).unwrap();
        run.step();
        assert_eq!(run.time(), 1);

        let field = run.current();
        for j in 0..geom.v3() {
            if distance(&geom, 0, j) > 2 {
                assert!(field[j].is_zero(), "site {} outside the stencil reach", j);
            }
        }
        assert_eq!(support_radius(&geom, field, 0), 2);

        let expected = free_point_norm([4, 4, 4], 1, kappa, 1);
        assert!((field.norm_sqr() - expected).abs() < 1e-12 * expected);
    }

    #[test]
    fn test_point_source_persisted() {
        let lattice = Lattice::new([4, 4, 4, 4]).unwrap();
        let mut gauge = GaugeField::<3>::cold(lattice.volume());
        let evolver = Evolver::new(lattice.clone()).unwrap().with_workers(2).unwrap();
        let mut output = PersistedField::<3>::new(4, 64);
        let mut batch = [Propagator {
            origin: [0; 4],
            source: SourceKind::Point,
            params: point_params(),
            output: &mut output,
        }];
        evolver.evolve_batch(Some(&mut gauge), &mut batch).unwrap();

        assert_eq!(output.slice_norm_sqr(0), 6.0);
        let expected = free_point_norm([4, 4, 4], 3, 1.0 / 6.0, 1);
        assert!((output.slice_norm_sqr(1) - expected).abs() < 1e-5 * expected);
        for t in 1..4 {
            assert!(output.slice_norm_sqr(t) > 0.0);
        }
    }

    #[test]
    fn test_support_growth_forward_then_backward() {
        let lattice = Lattice::new([12, 12, 12, 6]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<2>::random(lattice.volume(), 0.3, 41);
        let origin = [5, 6, 7, 1];
        let j0 = geom.locate(origin).unwrap().1;
        let steps = 2;

        let forward = HamiltonianParams {
            mass: 2.0,
            ..Default::default()
        };
        let mut run =
            PropagatorRun::new(&geom, &gauge, forward.clone(), origin, SourceKind::Point, None)
                .unwrap();
        for k in 1..=steps {
            run.step();
            assert_eq!(support_radius(&geom, run.current(), j0), 2 * k);
        }
        assert_eq!(run.time(), 1 + steps);

        let backward = HamiltonianParams {
            direction: Direction::Backward,
            ..forward
        };
        let t = run.time();
        let mut back =
            PropagatorRun::from_field(&geom, &gauge, backward, t, run.into_field()).unwrap();
        for k in 1..=steps {
            back.step();
            assert_eq!(support_radius(&geom, back.current(), j0), 2 * (steps + k));
        }
        assert_eq!(back.time(), 1);
    }

    fn correction_params(symmetric: bool, improved: bool, fused: bool) -> HamiltonianParams {
        let mut params = HamiltonianParams {
            mass: 1.8,
            substeps: 2,
            tadpole: 0.9,
            symmetric,
            improved,
            fused_correction: fused,
            ..Default::default()
        };
        for (kind, c) in [
            (TermKind::QuarticKinetic, 1.0),
            (TermKind::Darwin, 0.8),
            (TermKind::SpinOrbit, 1.1),
            (TermKind::SigmaB, 1.2),
            (TermKind::QuarticDerivative, 0.9),
            (TermKind::KineticStepCorrection, 1.0),
            (TermKind::ElectricSquared, 0.7),
            (TermKind::MagneticSquared, 0.6),
        ] {
            params = params.with_coefficient(kind, c);
        }
        params
    }

    #[test]
    fn test_fused_correction_matches_unfused() {
        let lattice = Lattice::new([4, 5, 4, 4]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<3>::random(lattice.volume(), 0.4, 13);
        let wall = SourceKind::Wall {
            momentum: [1, 0, -1],
        };
        for symmetric in [false, true] {
            for improved in [false, true] {
                let fused = correction_params(symmetric, improved, true);
                assert!(fused.allows_fused_correction());
                let unfused = correction_params(symmetric, improved, false);

                let mut a = PropagatorRun::new(&geom, &gauge, fused, [0; 4], wall, None).unwrap();
                let mut b = PropagatorRun::new(&geom, &gauge, unfused, [0; 4], wall, None).unwrap();
                for _ in 0..3 {
                    a.step();
                    b.step();
                }
                let scale = b.current().norm_sqr();
                assert!(scale > 0.0);
                assert!(
                    max_distance(a.current(), b.current()) < 1e-20 * scale,
                    "symmetric={} improved={}",
                    symmetric,
                    improved
                );
            }
        }
    }

    #[test]
    fn test_fused_matches_unfused_for_each_term() {
        let lattice = Lattice::new([4, 3, 4, 3]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<2>::random(lattice.volume(), 0.5, 19);
        let wall = SourceKind::Wall {
            momentum: [0, 1, 1],
        };
        for kind in TermKind::corrections().filter(|k| !k.is_composite()) {
            for symmetric in [false, true] {
                for improved in [false, true] {
                    let unfused = HamiltonianParams {
                        mass: 1.6,
                        substeps: 2,
                        symmetric,
                        improved,
                        ..Default::default()
                    }
                    .with_coefficient(kind, 1.3);
                    let fused = HamiltonianParams {
                        fused_correction: true,
                        ..unfused.clone()
                    };
                    assert!(fused.allows_fused_correction());

                    let mut a = PropagatorRun::new(&geom, &gauge, fused, [0; 4], wall, None).unwrap();
                    let mut b =
                        PropagatorRun::new(&geom, &gauge, unfused, [0; 4], wall, None).unwrap();
                    // the first step covers the source slice, corrected only when split
                    for _ in 0..2 {
                        a.step();
                        b.step();
                        let scale = b.current().norm_sqr();
                        assert!(
                            max_distance(a.current(), b.current()) < 1e-20 * scale,
                            "{:?} symmetric={} improved={}",
                            kind,
                            symmetric,
                            improved
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_fusion_request_ignored_with_composite_terms() {
        let lattice = Lattice::new([3, 3, 3, 3]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<2>::random(lattice.volume(), 0.4, 3);
        let base = correction_params(false, true, false)
            .with_coefficient(TermKind::KineticSigmaBAnticommutator, 0.5)
            .with_coefficient(TermKind::QuarticSpinOrbit, 0.5)
            .with_coefficient(TermKind::KineticCubed, 0.5);
        let fused = HamiltonianParams {
            fused_correction: true,
            ..base.clone()
        };
        let start = |params| {
            PropagatorRun::new(&geom, &gauge, params, [0; 4], SourceKind::Point, None).unwrap()
        };
        let (mut a, mut b) = (start(base), start(fused));
        for _ in 0..2 {
            a.step();
            b.step();
        }
        assert_eq!(a.current(), b.current());
    }

    fn run_batch(
        workers: usize,
        gauge: &GaugeField<2>,
        lattice: &Lattice,
    ) -> Vec<PersistedField<2>> {
        let mut gauge = gauge.clone();
        let evolver = Evolver::new(lattice.clone())
            .unwrap()
            .with_workers(workers)
            .unwrap()
            .with_seed(2024);
        let mut outputs = vec![PersistedField::<2>::new(4, 60); 3];
        let [a, b, c] = &mut outputs[..] else {
            unreachable!()
        };
        let composite = correction_params(true, true, false)
            .with_coefficient(TermKind::KineticCubed, 0.3)
            .with_coefficient(TermKind::QuarticSpinOrbit, 0.2);
        let mut batch = [
            Propagator {
                origin: [1, 2, 3, 0],
                source: SourceKind::Point,
                params: composite,
                output: a,
            },
            Propagator {
                origin: [0, 0, 0, 2],
                source: SourceKind::StochasticWall {
                    momentum: [0, 1, 0],
                },
                params: correction_params(false, false, true),
                output: b,
            },
            Propagator {
                origin: [2, 1, 0, 3],
                source: SourceKind::Wall {
                    momentum: [1, 1, 0],
                },
                params: HamiltonianParams {
                    direction: Direction::Backward,
                    ..correction_params(false, true, false)
                },
                output: c,
            },
        ];
        evolver.evolve_batch(Some(&mut gauge), &mut batch).unwrap();
        outputs
    }

    #[test]
    #[serial]
    fn test_output_independent_of_worker_count() {
        let lattice = Lattice::new([3, 4, 5, 4]).unwrap();
        let gauge = GaugeField::random(lattice.volume(), 0.4, 8);
        let reference = run_batch(1, &gauge, &lattice);
        for workers in [2, 3, 8] {
            assert_eq!(run_batch(workers, &gauge, &lattice), reference);
        }
        for output in reference.iter() {
            assert!((0..4).all(|t| output.slice_norm_sqr(t) > 0.0));
        }
    }

    #[test]
    fn test_links_restored_after_batch() {
        let lattice = Lattice::new([3, 3, 3, 3]).unwrap();
        let original = GaugeField::<2>::random(lattice.volume(), 0.5, 2);
        let mut gauge = original.clone();
        let evolver = Evolver::new(lattice.clone()).unwrap();
        let mut output = PersistedField::<2>::new(3, 27);
        let mut batch = [Propagator {
            origin: [0; 4],
            source: SourceKind::Point,
            params: correction_params(false, false, false),
            output: &mut output,
        }];
        evolver.evolve_batch(Some(&mut gauge), &mut batch).unwrap();
        for site in 0..lattice.volume() {
            for mu in 0..NDIM {
                let d = *gauge.link(site, mu) - *original.link(site, mu);
                assert!(d.norm_sqr() < 1e-28);
            }
        }
    }

    #[test]
    fn test_precondition_failures_leave_links_untouched() {
        let lattice = Lattice::new([2, 2, 2, 4]).unwrap();
        let original = GaugeField::<1>::random(lattice.volume(), 0.5, 9);
        let mut gauge = original.clone();
        let evolver = Evolver::new(lattice.clone()).unwrap();
        let mut out_a = PersistedField::<1>::new(4, 8);
        let mut out_b = PersistedField::<1>::new(4, 8);

        let params = |u0: f64| HamiltonianParams {
            tadpole: u0,
            ..Default::default()
        };
        let mut batch = [
            Propagator {
                origin: [0; 4],
                source: SourceKind::Point,
                params: params(0.9),
                output: &mut out_a,
            },
            Propagator {
                origin: [0; 4],
                source: SourceKind::Point,
                params: params(0.8),
                output: &mut out_b,
            },
        ];
        assert_eq!(
            evolver.evolve_batch(Some(&mut gauge), &mut batch),
            Err(EvolutionError::TadpoleMismatch {
                first: 0.9,
                other: 0.8
            })
        );
        assert_eq!(gauge, original);

        batch[1].params = params(0.9);
        batch[1].origin = [0, 0, 2, 0];
        assert!(matches!(
            evolver.evolve_batch(Some(&mut gauge), &mut batch),
            Err(EvolutionError::InvalidParameters(_))
        ));
        batch[1].origin = [0; 4];
        batch[1].params.substeps = 0;
        assert!(matches!(
            evolver.evolve_batch(Some(&mut gauge), &mut batch),
            Err(EvolutionError::InvalidParameters(_))
        ));
        batch[1].params = params(-1.0);
        batch[0].params = params(-1.0);
        assert_eq!(
            evolver.evolve_batch(Some(&mut gauge), &mut batch),
            Err(EvolutionError::InvalidTadpole(-1.0))
        );
        assert_eq!(gauge, original);

        assert_eq!(
            evolver.evolve_batch(None, &mut batch),
            Err(EvolutionError::MissingGauge)
        );
        let mut small = GaugeField::<1>::cold(4);
        assert!(matches!(
            evolver.evolve_batch(Some(&mut small), &mut batch),
            Err(EvolutionError::GaugeVolumeMismatch { .. })
        ));

        let mut wrong = PersistedField::<1>::new(3, 8);
        let mut batch = [Propagator {
            origin: [0; 4],
            source: SourceKind::Point,
            params: params(1.0),
            output: &mut wrong,
        }];
        assert!(matches!(
            evolver.evolve_batch(Some(&mut gauge), &mut batch),
            Err(EvolutionError::OutputShape { .. })
        ));
        assert_eq!(gauge, original);
    }

    #[test]
    fn test_empty_batch() {
        let lattice = Lattice::new([2, 2, 2, 2]).unwrap();
        let evolver = Evolver::new(lattice).unwrap();
        let mut batch: [Propagator<'_, 2>; 0] = [];
        assert!(evolver.evolve_batch(None, &mut batch).is_ok());
    }

    #[test]
    #[serial]
    fn test_busy_generator_aborts_batch() {
        let lattice = Lattice::new([2, 2, 2, 4]).unwrap();
        let original = GaugeField::<2>::random(lattice.volume(), 0.5, 4);
        let mut gauge = original.clone();
        let evolver = Evolver::new(lattice).unwrap();
        let mut output = PersistedField::<2>::new(4, 8);
        let mut batch = [Propagator {
            origin: [0; 4],
            source: SourceKind::StochasticWall { momentum: [0; 3] },
            params: HamiltonianParams {
                tadpole: 0.8,
                ..Default::default()
            },
            output: &mut output,
        }];

        let held = RngSession::acquire(1).unwrap();
        assert_eq!(
            evolver.evolve_batch(Some(&mut gauge), &mut batch),
            Err(EvolutionError::RngUnavailable)
        );
        assert_eq!(gauge, original);
        drop(held);

        evolver.evolve_batch(Some(&mut gauge), &mut batch).unwrap();
        assert!(!RngSession::is_active());
    }
}
