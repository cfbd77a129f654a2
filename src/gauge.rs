//! Per-site, per-direction parallel transporters.
use crate::error::{EvolutionError, Result};
use crate::lattice::{Lattice, NDIM};
use crate::matrix::{ColorMatrix, C64};
use crate::parallel::par_update;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::Deref;

/// Gauge links stored as `links[site * 4 + mu]`.
#[derive(Clone, Debug, PartialEq)]
pub struct GaugeField<const N: usize> {
    links: Vec<ColorMatrix<N>>,
}

impl<const N: usize> GaugeField<N> {
    /// Every link is the identity.
    pub fn cold(volume: usize) -> Self {
        Self {
            links: vec![ColorMatrix::identity(); volume * NDIM],
        }
    }

    /// Seeded random unitary links `1 + spread·G`, `G` complex Gaussian,
    /// projected back onto U(N) by Gram-Schmidt over the rows.
    pub fn random(volume: usize, spread: f64, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let links = (0..volume * NDIM)
            .map(|_| {
                let mut m = ColorMatrix::identity();
                for row in m.m.iter_mut() {
                    for z in row.iter_mut() {
                        *z += C64::new(gaussian(&mut rng), gaussian(&mut rng)) * spread;
                    }
                }
                unitarize(m)
            })
            .collect();
        Self { links }
    }

    pub fn from_links(links: Vec<ColorMatrix<N>>) -> Result<Self> {
        if links.len() % NDIM != 0 {
            return Err(EvolutionError::lattice(format!(
                "{} links is not a whole number of sites",
                links.len()
            )));
        }
        Ok(Self { links })
    }

    pub fn volume(&self) -> usize {
        self.links.len() / NDIM
    }

    #[inline]
    pub fn link(&self, site: usize, mu: usize) -> &ColorMatrix<N> {
        &self.links[site * NDIM + mu]
    }

    #[inline]
    pub fn link_mut(&mut self, site: usize, mu: usize) -> &mut ColorMatrix<N> {
        &mut self.links[site * NDIM + mu]
    }

    /// Multiplies every link by `f` in place.
    pub fn scale(&mut self, f: f64) {
        par_update(&mut self.links, |_, u| *u = u.scale(f));
    }

    /// Divides the links by `u0` until the returned guard is dropped.
    pub fn tadpole_scaled(&mut self, u0: f64) -> TadpoleGuard<'_, N> {
        self.scale(1.0 / u0);
        TadpoleGuard { field: self, u0 }
    }

    fn plaquette(&self, lattice: &Lattice, site: usize, mu: usize, nu: usize) -> ColorMatrix<N> {
        let x_mu = lattice.neighbor_forward(site, mu);
        let x_nu = lattice.neighbor_forward(site, nu);
        self.link(site, mu)
            .multiply(self.link(x_mu, nu))
            .multiply_dagger(self.link(x_nu, mu))
            .multiply_dagger(self.link(site, nu))
    }

    /// `<Re Tr P / N>` over every site and plane.
    pub fn average_plaquette(&self, lattice: &Lattice) -> f64 {
        let mut sum = 0.0;
        for site in 0..lattice.volume() {
            for mu in 0..NDIM {
                for nu in mu + 1..NDIM {
                    sum += self.plaquette(lattice, site, mu, nu).re_trace();
                }
            }
        }
        sum / (lattice.volume() * 6 * N) as f64
    }

    /// Mean-link estimate `<Re Tr P / N>^(1/4)`.
    pub fn plaquette_tadpole(&self, lattice: &Lattice) -> f64 {
        self.average_plaquette(lattice).max(0.0).powf(0.25)
    }
}

/// Keeps a gauge field divided by the tadpole factor; restores it on drop,
/// whichever way the holder exits.
pub struct TadpoleGuard<'a, const N: usize> {
    field: &'a mut GaugeField<N>,
    u0: f64,
}

impl<const N: usize> TadpoleGuard<'_, N> {
    pub fn u0(&self) -> f64 {
        self.u0
    }
}

impl<const N: usize> Deref for TadpoleGuard<'_, N> {
    type Target = GaugeField<N>;
    fn deref(&self) -> &GaugeField<N> {
        self.field
    }
}

impl<const N: usize> Drop for TadpoleGuard<'_, N> {
    fn drop(&mut self) {
        self.field.scale(self.u0);
    }
}

fn gaussian(rng: &mut impl Rng) -> f64 {
    // Box-Muller; 1 - u keeps the logarithm finite
    let u: f64 = rng.random();
    let v: f64 = rng.random();
    (-2.0 * (1.0 - u).ln()).sqrt() * (std::f64::consts::TAU * v).cos()
}

fn unitarize<const N: usize>(mut m: ColorMatrix<N>) -> ColorMatrix<N> {
    for i in 0..N {
        for k in 0..i {
            let dot: C64 = (0..N).map(|j| m.m[k][j].conj() * m.m[i][j]).sum();
            for j in 0..N {
                let sub = m.m[k][j] * dot;
                m.m[i][j] -= sub;
            }
        }
        let norm = m.m[i].iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        for z in m.m[i].iter_mut() {
            *z /= norm;
        }
    }
    m
}
