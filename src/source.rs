//! Initial time-slice of a propagator.
use crate::error::{EvolutionError, Result};
use crate::field::{Field, FieldValue};
use crate::lattice::SliceGeometry;
use crate::matrix::C64;
use crate::parallel::{par_chunks, par_fill};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether an [`RngSession`] is currently alive.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Spatial profile of a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Unit spin/colour block at the origin only.
    Point,
    /// Plane wave `e^{ip·(x-x0)}`, `p_i = 2π k_i / L_i`, on the whole slice.
    Wall { momentum: [i64; 3] },
    /// Plane wave times an independent random phase at every site.
    StochasticWall { momentum: [i64; 3] },
}

impl SourceKind {
    pub fn needs_rng(&self) -> bool {
        matches!(self, SourceKind::StochasticWall { .. })
    }

    /// Overwrites `field` with this source placed at slice index `origin`.
    ///
    /// Stochastic sources draw from `noise`, a live session and the stream
    /// reserved for this propagator.
    pub fn initialize<const N: usize>(
        &self,
        geom: &SliceGeometry,
        origin: usize,
        field: &mut Field<N>,
        noise: Option<(&RngSession, u64)>,
    ) -> Result<()> {
        match *self {
            SourceKind::Point => {
                par_fill(field.as_mut_slice(), |_| FieldValue::ZERO);
                field[origin] = FieldValue::unit(C64::new(1.0, 0.0));
            }
            SourceKind::Wall { momentum } => {
                par_fill(field.as_mut_slice(), |j| {
                    FieldValue::unit(plane_wave(geom, origin, momentum, j))
                });
            }
            SourceKind::StochasticWall { momentum } => {
                let (session, stream) = noise.ok_or(EvolutionError::RngUnavailable)?;
                let mut phases = vec![C64::new(0.0, 0.0); geom.v3()];
                session.fill_phases(stream, &mut phases);
                par_fill(field.as_mut_slice(), |j| {
                    FieldValue::unit(plane_wave(geom, origin, momentum, j) * phases[j])
                });
            }
        }
        Ok(())
    }
}

fn plane_wave(geom: &SliceGeometry, origin: usize, momentum: [i64; 3], j: usize) -> C64 {
    let x = geom.spatial_coords(j);
    let x0 = geom.spatial_coords(origin);
    let dims = geom.spatial_dims();
    let phase: f64 = (0..3)
        .map(|i| TAU * momentum[i] as f64 / dims[i] as f64 * (x[i] as f64 - x0[i] as f64))
        .sum();
    C64::from_polar(1.0, phase)
}

/// Exclusive handle to the process-wide noise generator.
///
/// Only one session may be alive at a time; the slot is released when the
/// session is dropped. Every site draws from its own position in a
/// per-propagator ChaCha stream, so the noise does not depend on how a slice
/// is split among workers.
pub struct RngSession {
    base: ChaCha8Rng,
}

impl RngSession {
    pub fn acquire(seed: u64) -> Result<Self> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EvolutionError::RngUnavailable)?;
        Ok(Self {
            base: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn is_active() -> bool {
        SESSION_ACTIVE.load(Ordering::SeqCst)
    }

    /// `out[j] = e^{iθ_j}` with `θ_j` uniform in `[0, 2π)`, drawn from `stream`.
    pub fn fill_phases(&self, stream: u64, out: &mut [C64]) {
        par_chunks(out, |j0, part| {
            let mut rng = self.base.clone();
            rng.set_stream(stream);
            // one f64 per site, two 32-bit words each
            rng.set_word_pos(2 * j0 as u128);
            for z in part.iter_mut() {
                let u: f64 = rng.random();
                *z = C64::from_polar(1.0, TAU * u);
            }
        });
    }
}

impl Drop for RngSession {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}
