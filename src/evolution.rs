//! Time-slice by time-slice evolution of propagators.
//!
//! One slice advances as
//! `(correction) → n kinetic substeps → temporal link → n kinetic substeps
//! → (correction, symmetric splitting only)`, with the whole batch running
//! on tadpole-scaled links.
use crate::derivatives::Stencil;
use crate::direction::Direction;
use crate::error::{EvolutionError, Result};
use crate::field::{Field, FieldValue};
use crate::field_strength::FieldStrength;
use crate::gauge::GaugeField;
use crate::hamiltonian::terms::accumulate_corrections;
use crate::hamiltonian::{HamiltonianParams, Scratch, TermContext};
use crate::lattice::{Lattice, SliceGeometry, NDIM};
use crate::parallel::{par_fill, WorkerPool};
use crate::source::{RngSession, SourceKind};
use crate::traits::FieldSink;
use log::{debug, info, log_enabled, warn, Level};
use std::time::Instant;

/// One propagator of a batch: where it starts, how it evolves, where it goes.
pub struct Propagator<'a, const N: usize> {
    /// Source position; its time coordinate is the first slice written.
    pub origin: [usize; NDIM],
    pub source: SourceKind,
    pub params: HamiltonianParams,
    pub output: &'a mut (dyn FieldSink<N> + Send),
}

/// Runs batches of propagators on one lattice.
pub struct Evolver {
    lattice: Lattice,
    pool: WorkerPool,
    seed: u64,
}

impl Evolver {
    /// Evolver with [`crate::WORKER_THREADS`] workers.
    pub fn new(lattice: Lattice) -> Result<Self> {
        Ok(Self {
            lattice,
            pool: WorkerPool::from_global()?,
            seed: 0,
        })
    }

    /// Replaces the worker pool; `0` means one worker per core.
    pub fn with_workers(mut self, threads: usize) -> Result<Self> {
        self.pool = WorkerPool::new(threads)?;
        Ok(self)
    }

    /// Seed of the noise generator used by stochastic sources.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn workers(&self) -> usize {
        self.pool.threads()
    }

    /// Evolves every propagator through all time-slices of the lattice.
    ///
    /// All preconditions are checked before the links are touched. The
    /// links are divided by the common tadpole factor for the duration of
    /// the batch and restored before returning, on success or failure.
    pub fn evolve_batch<const N: usize>(
        &self,
        gauge: Option<&mut GaugeField<N>>,
        batch: &mut [Propagator<'_, N>],
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let gauge = gauge.ok_or(EvolutionError::MissingGauge)?;
        if gauge.volume() != self.lattice.volume() {
            return Err(EvolutionError::GaugeVolumeMismatch {
                expected: self.lattice.volume(),
                actual: gauge.volume(),
            });
        }

        let u0 = batch[0].params.tadpole;
        let mut slicings: Vec<SliceGeometry> = Vec::new();
        let mut slicing_of = Vec::with_capacity(batch.len());
        for prop in batch.iter() {
            let params = &prop.params;
            params.validate()?;
            if params.tadpole != u0 {
                return Err(EvolutionError::TadpoleMismatch {
                    first: u0,
                    other: params.tadpole,
                });
            }
            let axis = params.time_axis;
            let k = match slicings.iter().position(|g| g.time_axis() == axis) {
                Some(k) => k,
                None => {
                    slicings.push(SliceGeometry::new(&self.lattice, axis)?);
                    slicings.len() - 1
                }
            };
            slicing_of.push(k);
            let geom = &slicings[k];
            if geom.locate(prop.origin).is_none() {
                return Err(EvolutionError::parameters(format!(
                    "origin {:?} lies outside the {:?} lattice",
                    prop.origin,
                    self.lattice.dims()
                )));
            }
            let expected = (geom.nt(), geom.v3());
            if prop.output.shape() != expected {
                return Err(EvolutionError::OutputShape {
                    expected,
                    actual: prop.output.shape(),
                });
            }
            if params.fused_correction && !params.allows_fused_correction() {
                warn!(
                    "Fused correction requested with composite terms active, \
                     using a separate accumulator"
                );
            }
        }

        let session = if batch.iter().any(|p| p.source.needs_rng()) {
            Some(RngSession::acquire(self.seed)?)
        } else {
            None
        };

        info!(
            "Evolving {} propagator(s) on {:?} with {} worker(s), u0 = {}",
            batch.len(),
            self.lattice.dims(),
            self.pool.threads(),
            u0
        );
        let slicings = &slicings;
        let slicing_of = &slicing_of;
        let session = session.as_ref();
        let total = batch.len();

        // scaling and restoring the links are passes too, so the guard
        // lives inside the pool
        self.pool.install(|| {
            let guard = gauge.tadpole_scaled(u0);
            let links: &GaugeField<N> = &guard;
            for (index, prop) in batch.iter_mut().enumerate() {
                let geom = &slicings[slicing_of[index]];
                let timer = Instant::now();
                info!(
                    "Propagator {}/{}: {:?} source at {:?}, {:?}",
                    index + 1,
                    total,
                    prop.source,
                    prop.origin,
                    prop.params.direction
                );
                let noise = session.map(|s| (s, index as u64));
                let mut run = PropagatorRun::new(
                    geom,
                    links,
                    prop.params.clone(),
                    prop.origin,
                    prop.source,
                    noise,
                )?;
                prop.output.write_slice(run.time(), run.current());
                for _ in 1..geom.nt() {
                    run.step();
                    prop.output.write_slice(run.time(), run.current());
                }
                info!(
                    "Propagator {}/{} done in {:.3} s",
                    index + 1,
                    total,
                    timer.elapsed().as_secs_f64()
                );
            }
            Ok(())
        })
    }
}

/// Buffers and state of one propagator in flight.
///
/// The links handed in are used as they are; [`Evolver::evolve_batch`]
/// passes them already divided by the tadpole factor.
pub struct PropagatorRun<'g, const N: usize> {
    geom: &'g SliceGeometry,
    gauge: &'g GaugeField<N>,
    params: HamiltonianParams,
    t: usize,
    steps: usize,
    /// Still on the slice the source was placed on.
    at_source: bool,
    fused: bool,
    strength: Option<FieldStrength<N>>,
    current: Field<N>,
    next: Field<N>,
    acc: Field<N>,
    scratch: Scratch<N>,
}

impl<'g, const N: usize> PropagatorRun<'g, N> {
    /// Starts from `source` placed at `origin`.
    pub fn new(
        geom: &'g SliceGeometry,
        gauge: &'g GaugeField<N>,
        params: HamiltonianParams,
        origin: [usize; NDIM],
        source: SourceKind,
        noise: Option<(&RngSession, u64)>,
    ) -> Result<Self> {
        let (t, j) = geom.locate(origin).ok_or_else(|| {
            EvolutionError::parameters(format!("origin {:?} lies outside the lattice", origin))
        })?;
        let mut field = Field::new(geom.v3());
        source.initialize(geom, j, &mut field, noise)?;
        let mut run = Self::from_field(geom, gauge, params, t, field)?;
        run.at_source = true;
        Ok(run)
    }

    /// Continues from an existing field at slice `t`, as if it had been
    /// evolved there; the next step applies the correction in every mode.
    pub fn from_field(
        geom: &'g SliceGeometry,
        gauge: &'g GaugeField<N>,
        params: HamiltonianParams,
        t: usize,
        field: Field<N>,
    ) -> Result<Self> {
        params.validate()?;
        if params.time_axis != geom.time_axis() {
            return Err(EvolutionError::parameters(format!(
                "time axis {} does not match the slicing along {}",
                params.time_axis,
                geom.time_axis()
            )));
        }
        if gauge.volume() != geom.lattice().volume() {
            return Err(EvolutionError::GaugeVolumeMismatch {
                expected: geom.lattice().volume(),
                actual: gauge.volume(),
            });
        }
        if t >= geom.nt() || field.len() != geom.v3() {
            return Err(EvolutionError::parameters(format!(
                "slice {} with {} sites does not fit {} slices of {}",
                t,
                field.len(),
                geom.nt(),
                geom.v3()
            )));
        }

        let v3 = geom.v3();
        let fused = params.fused_correction && params.allows_fused_correction();
        let mut run = Self {
            geom,
            gauge,
            params,
            t,
            steps: 0,
            at_source: false,
            fused,
            strength: None,
            current: field,
            next: Field::new(v3),
            acc: Field::new(v3),
            scratch: Scratch::new(v3),
        };
        run.refresh_strength();
        Ok(run)
    }

    pub fn current(&self) -> &Field<N> {
        &self.current
    }

    pub fn into_field(self) -> Field<N> {
        self.current
    }

    /// Time coordinate of [`PropagatorRun::current`].
    pub fn time(&self) -> usize {
        self.t
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn params(&self) -> &HamiltonianParams {
        &self.params
    }

    /// Advances the field by one time-slice.
    pub fn step(&mut self) {
        let correct = self.params.has_correction();
        let factor = self.params.correction_factor();

        // without splitting, the source slice takes no correction
        if correct && (self.params.symmetric || !self.at_source) {
            self.apply_correction(factor);
        }
        self.kinetic_substeps();
        self.apply_temporal_link();
        self.refresh_strength();
        self.kinetic_substeps();
        if correct && self.params.symmetric {
            self.apply_correction(factor);
        }
        self.steps += 1;
        self.at_source = false;

        if log_enabled!(Level::Debug) {
            debug!(
                "Slice t = {} after {} step(s): |G|² = {:.6e}",
                self.t,
                self.steps,
                self.current.norm_sqr()
            );
        }
    }

    /// The field strength carries the two-hop links of improved stencils,
    /// so it is kept whenever either needs it.
    fn refresh_strength(&mut self) {
        self.strength = if self.params.has_correction() || self.params.improved {
            Some(FieldStrength::compute(
                self.geom,
                self.gauge,
                self.t,
                self.params.improved,
                self.params.tadpole,
            ))
        } else {
            None
        };
    }

    /// `n` times `G ← G + c0/(4nM) Δ G`.
    fn kinetic_substeps(&mut self) {
        let weight = self.params.kinetic_weight();
        let stencil = stencil(
            self.geom,
            self.gauge,
            self.t,
            self.strength.as_ref(),
            self.params.improved,
        );
        for _ in 0..self.params.substeps {
            let current = &self.current;
            par_fill(self.next.as_mut_slice(), |j| {
                let mut r = current[j];
                r.accumulate_scaled(&stencil.laplacian_at(current, j), weight);
                r
            });
            std::mem::swap(&mut self.current, &mut self.next);
        }
    }

    /// Moves the field to the neighbouring slice.
    fn apply_temporal_link(&mut self) {
        let geom = self.geom;
        let gauge = self.gauge;
        let axis = geom.time_axis();
        let t = self.t;
        let current = &self.current;
        match self.params.direction {
            Direction::Forward => {
                let t_next = geom.next_time(t, true);
                par_fill(self.next.as_mut_slice(), |j| {
                    current[j].left_multiply_dagger(gauge.link(geom.site(t, j), axis))
                });
                self.t = t_next;
            }
            Direction::Backward => {
                let t_next = geom.next_time(t, false);
                par_fill(self.next.as_mut_slice(), |j| {
                    current[j].left_multiply(gauge.link(geom.site(t_next, j), axis))
                });
                self.t = t_next;
            }
        }
        std::mem::swap(&mut self.current, &mut self.next);
    }

    /// `G ← G - f δH G`.
    fn apply_correction(&mut self, factor: f64) {
        let Some(strength) = self.strength.as_ref() else {
            return;
        };
        let stencil = stencil(
            self.geom,
            self.gauge,
            self.t,
            Some(strength),
            self.params.improved,
        );
        let ctx = TermContext::new(stencil, strength, &self.params);
        let current = &self.current;

        if self.fused {
            par_fill(self.next.as_mut_slice(), |j| current[j]);
            accumulate_corrections(
                &ctx,
                current,
                &mut self.next,
                -factor,
                &mut self.scratch,
                None,
            );
        } else {
            par_fill(self.acc.as_mut_slice(), |_| FieldValue::ZERO);
            accumulate_corrections(
                &ctx,
                current,
                &mut self.acc,
                1.0,
                &mut self.scratch,
                Some(&mut self.next),
            );
            let acc = &self.acc;
            par_fill(self.next.as_mut_slice(), |j| {
                let mut r = current[j];
                r.accumulate_scaled(&acc[j], -factor);
                r
            });
        }
        std::mem::swap(&mut self.current, &mut self.next);
    }
}

fn stencil<'a, const N: usize>(
    geom: &'a SliceGeometry,
    gauge: &'a GaugeField<N>,
    t: usize,
    strength: Option<&'a FieldStrength<N>>,
    improved: bool,
) -> Stencil<'a, N> {
    match strength {
        Some(s) if improved => Stencil::improved(geom, gauge, t, s.two_hop()),
        _ => Stencil::naive(geom, gauge, t),
    }
}
