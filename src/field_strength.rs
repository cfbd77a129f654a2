//! Chromo-electric and chromo-magnetic fields of one time-slice.
//!
//! Each component is the clover average of the four plaquette leaves around
//! a site, projected onto Hermitian traceless matrices. Computation is pure
//! in the links, so recomputing from the same inputs gives the same bits.
use crate::gauge::GaugeField;
use crate::lattice::{Lattice, SliceGeometry};
use crate::matrix::{ColorMatrix, C64};
use crate::parallel::par_fill;

/// Transporters across two sites along each spatial direction:
/// `W⁺(x,i) = U(x,i) U(x+i,i)` and `W⁻(x,i) = U†(x-i,i) U†(x-2i,i)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TwoHopLinks<const N: usize> {
    plus: Vec<[ColorMatrix<N>; 3]>,
    minus: Vec<[ColorMatrix<N>; 3]>,
}

impl<const N: usize> TwoHopLinks<N> {
    pub fn compute(geom: &SliceGeometry, gauge: &GaugeField<N>, t: usize) -> Self {
        let link = |j: usize, i: usize| gauge.link(geom.site(t, j), geom.spatial_axis(i));
        let mut plus = vec![[ColorMatrix::ZERO; 3]; geom.v3()];
        let mut minus = vec![[ColorMatrix::ZERO; 3]; geom.v3()];
        par_fill(&mut plus, |j| {
            std::array::from_fn(|i| link(j, i).multiply(link(geom.up(j, i), i)))
        });
        par_fill(&mut minus, |j| {
            std::array::from_fn(|i| {
                let d = geom.down(j, i);
                link(d, i).dagger_multiply_dagger(link(geom.down(d, i), i))
            })
        });
        Self { plus, minus }
    }

    #[inline]
    pub fn plus(&self, j: usize, i: usize) -> &ColorMatrix<N> {
        &self.plus[j][i]
    }

    #[inline]
    pub fn minus(&self, j: usize, i: usize) -> &ColorMatrix<N> {
        &self.minus[j][i]
    }
}

/// `E_i` and `B_i` at every site of one slice, plus the slice's two-hop links.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldStrength<const N: usize> {
    t: usize,
    electric: Vec<[ColorMatrix<N>; 3]>,
    magnetic: Vec<[ColorMatrix<N>; 3]>,
    two_hop: TwoHopLinks<N>,
}

impl<const N: usize> FieldStrength<N> {
    /// Fields at slice `t`. With `improved`, each clover is blended with the
    /// parallel-transported clovers at the four in-plane neighbours, the
    /// central weight carrying the tadpole factor `u0`.
    pub fn compute(
        geom: &SliceGeometry,
        gauge: &GaugeField<N>,
        t: usize,
        improved: bool,
        u0: f64,
    ) -> Self {
        let lattice = geom.lattice();
        let time = geom.time_axis();
        let efac = (4.0 + 1.0 / (u0 * u0)) / 3.0;
        let component = |site: usize, mu: usize, nu: usize| {
            if improved {
                improved_clover(lattice, gauge, site, mu, nu, efac)
            } else {
                clover(lattice, gauge, site, mu, nu)
            }
        };

        let mut electric = vec![[ColorMatrix::ZERO; 3]; geom.v3()];
        let mut magnetic = vec![[ColorMatrix::ZERO; 3]; geom.v3()];
        par_fill(&mut electric, |j| {
            let site = geom.site(t, j);
            std::array::from_fn(|i| component(site, geom.spatial_axis(i), time))
        });
        par_fill(&mut magnetic, |j| {
            let site = geom.site(t, j);
            std::array::from_fn(|i| {
                let (a, b) = ((i + 1) % 3, (i + 2) % 3);
                component(site, geom.spatial_axis(a), geom.spatial_axis(b))
            })
        });

        Self {
            t,
            electric,
            magnetic,
            two_hop: TwoHopLinks::compute(geom, gauge, t),
        }
    }

    pub fn time(&self) -> usize {
        self.t
    }

    #[inline]
    pub fn electric(&self, j: usize, i: usize) -> &ColorMatrix<N> {
        &self.electric[j][i]
    }

    #[inline]
    pub fn magnetic(&self, j: usize, i: usize) -> &ColorMatrix<N> {
        &self.magnetic[j][i]
    }

    pub fn two_hop(&self) -> &TwoHopLinks<N> {
        &self.two_hop
    }
}

/// Sum of the four plaquette leaves in the `(mu, nu)` plane that touch `site`.
fn clover_sum<const N: usize>(
    lattice: &Lattice,
    gauge: &GaugeField<N>,
    site: usize,
    mu: usize,
    nu: usize,
) -> ColorMatrix<N> {
    let u = |s: usize, d: usize| gauge.link(s, d);
    let fwd = |s: usize, d: usize| lattice.neighbor_forward(s, d);
    let bwd = |s: usize, d: usize| lattice.neighbor_backward(s, d);

    let xpm = fwd(site, mu);
    let xpn = fwd(site, nu);
    let xmm = bwd(site, mu);
    let xmn = bwd(site, nu);
    let xmm_pn = fwd(xmm, nu);
    let xmm_mn = bwd(xmm, nu);
    let xmn_pm = fwd(xmn, mu);

    let leaf1 = u(site, mu)
        .multiply(u(xpm, nu))
        .multiply_dagger(u(xpn, mu))
        .multiply_dagger(u(site, nu));
    let leaf2 = u(site, nu)
        .multiply_dagger(u(xmm_pn, mu))
        .multiply_dagger(u(xmm, nu))
        .multiply(u(xmm, mu));
    let leaf3 = u(xmm, mu)
        .dagger_multiply_dagger(u(xmm_mn, nu))
        .multiply(u(xmm_mn, mu))
        .multiply(u(xmn, nu));
    let leaf4 = u(xmn, nu)
        .dagger_multiply(u(xmn, mu))
        .multiply(u(xmn_pm, nu))
        .multiply_dagger(u(site, mu));

    leaf1 + leaf2 + leaf3 + leaf4
}

/// `F = HermitianTraceless(-(i/4) Q)`
fn clover<const N: usize>(
    lattice: &Lattice,
    gauge: &GaugeField<N>,
    site: usize,
    mu: usize,
    nu: usize,
) -> ColorMatrix<N> {
    clover_sum(lattice, gauge, site, mu, nu)
        .scale_complex(C64::new(0.0, -0.25))
        .hermitian_traceless()
}

fn improved_clover<const N: usize>(
    lattice: &Lattice,
    gauge: &GaugeField<N>,
    site: usize,
    mu: usize,
    nu: usize,
    efac: f64,
) -> ColorMatrix<N> {
    let mut f = clover(lattice, gauge, site, mu, nu).scale(efac);
    for rho in [mu, nu] {
        let up = lattice.neighbor_forward(site, rho);
        let down = lattice.neighbor_backward(site, rho);
        let u = gauge.link(site, rho);
        let v = gauge.link(down, rho);
        let from_up = u
            .multiply(&clover(lattice, gauge, up, mu, nu))
            .multiply_dagger(u);
        let from_down = v
            .dagger_multiply(&clover(lattice, gauge, down, mu, nu))
            .multiply(v);
        f.accumulate_scaled(&(from_up + from_down), -1.0 / 6.0);
    }
    f
}
