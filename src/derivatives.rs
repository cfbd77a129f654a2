//! Covariant finite differences on one time-slice.
//!
//! Every operator is linear in the source field and reads it through the
//! slice-local periodic tables of [`SliceGeometry`]. Improved variants need
//! the two-hop transporters precomputed with the field strength.
use crate::field::{Field, FieldValue};
use crate::field_strength::TwoHopLinks;
use crate::gauge::GaugeField;
use crate::lattice::SliceGeometry;
use crate::matrix::ColorMatrix;
use crate::parallel::par_fill;

/// Derivative operators bound to one slice of one gauge configuration.
#[derive(Clone, Copy)]
pub struct Stencil<'a, const N: usize> {
    geom: &'a SliceGeometry,
    gauge: &'a GaugeField<N>,
    t: usize,
    two_hop: Option<&'a TwoHopLinks<N>>,
}

impl<'a, const N: usize> Stencil<'a, N> {
    /// Nearest-neighbour operators at slice `t`.
    pub fn naive(geom: &'a SliceGeometry, gauge: &'a GaugeField<N>, t: usize) -> Self {
        Self {
            geom,
            gauge,
            t,
            two_hop: None,
        }
    }

    /// Operators with the next-nearest-neighbour corrections.
    pub fn improved(
        geom: &'a SliceGeometry,
        gauge: &'a GaugeField<N>,
        t: usize,
        two_hop: &'a TwoHopLinks<N>,
    ) -> Self {
        Self {
            geom,
            gauge,
            t,
            two_hop: Some(two_hop),
        }
    }

    pub fn is_improved(&self) -> bool {
        self.two_hop.is_some()
    }

    pub fn time(&self) -> usize {
        self.t
    }

    pub fn geometry(&self) -> &'a SliceGeometry {
        self.geom
    }

    #[inline]
    fn link(&self, j: usize, i: usize) -> &'a ColorMatrix<N> {
        self.gauge
            .link(self.geom.site(self.t, j), self.geom.spatial_axis(i))
    }

    /// `U(x,i) S(x+i)`
    #[inline]
    fn hop_up(&self, src: &Field<N>, j: usize, i: usize) -> FieldValue<N> {
        src[self.geom.up(j, i)].left_multiply(self.link(j, i))
    }

    /// `U†(x-i,i) S(x-i)`
    #[inline]
    fn hop_down(&self, src: &Field<N>, j: usize, i: usize) -> FieldValue<N> {
        let d = self.geom.down(j, i);
        src[d].left_multiply_dagger(self.link(d, i))
    }

    /// `(W⁺ S(x+2i), W⁻ S(x-2i))` through the precomputed transporters.
    #[inline]
    fn two_hops(
        &self,
        w: &TwoHopLinks<N>,
        src: &Field<N>,
        j: usize,
        i: usize,
    ) -> (FieldValue<N>, FieldValue<N>) {
        let up2 = self.geom.up(self.geom.up(j, i), i);
        let down2 = self.geom.down(self.geom.down(j, i), i);
        (
            src[up2].left_multiply(w.plus(j, i)),
            src[down2].left_multiply(w.minus(j, i)),
        )
    }

    /// Naive second difference along `i`.
    pub fn grad2_at(&self, src: &Field<N>, j: usize, i: usize) -> FieldValue<N> {
        let mut r = self.hop_up(src, j, i);
        r.add(&self.hop_down(src, j, i));
        r.accumulate_scaled(&src[j], -2.0);
        r
    }

    /// Central first difference along `i`, improved when two-hop links are bound.
    pub fn grad1_at(&self, src: &Field<N>, j: usize, i: usize) -> FieldValue<N> {
        let mut r = FieldValue::ZERO;
        match self.two_hop {
            None => {
                r.accumulate_scaled(&self.hop_up(src, j, i), 0.5);
                r.accumulate_scaled(&self.hop_down(src, j, i), -0.5);
            }
            Some(w) => {
                let (up2, down2) = self.two_hops(w, src, j, i);
                r.accumulate_scaled(&self.hop_up(src, j, i), 2.0 / 3.0);
                r.accumulate_scaled(&self.hop_down(src, j, i), -2.0 / 3.0);
                r.accumulate_scaled(&up2, -1.0 / 12.0);
                r.accumulate_scaled(&down2, 1.0 / 12.0);
            }
        }
        r
    }

    /// Sum of second differences over the three spatial directions.
    pub fn laplacian_at(&self, src: &Field<N>, j: usize) -> FieldValue<N> {
        let mut r = FieldValue::ZERO;
        match self.two_hop {
            None => {
                for i in 0..3 {
                    r.add(&self.grad2_at(src, j, i));
                }
            }
            Some(w) => {
                for i in 0..3 {
                    let (up2, down2) = self.two_hops(w, src, j, i);
                    r.accumulate_scaled(&self.grad2_at(src, j, i), 4.0 / 3.0);
                    r.accumulate_scaled(&up2, -1.0 / 12.0);
                    r.accumulate_scaled(&down2, -1.0 / 12.0);
                    r.accumulate_scaled(&src[j], 2.0 / 12.0);
                }
            }
        }
        r
    }

    /// Fourth difference along `i`: the five-point stencil, or with two-hop
    /// links bound the doubled-step second difference minus four single steps.
    pub fn grad4_at(&self, src: &Field<N>, j: usize, i: usize) -> FieldValue<N> {
        match self.two_hop {
            None => {
                let geom = self.geom;
                let (u, d) = (geom.up(j, i), geom.down(j, i));
                let link_up = self.link(u, i);
                let link_down = self.link(d, i);
                let mut r = src[geom.up(u, i)]
                    .left_multiply(link_up)
                    .left_multiply(self.link(j, i));
                r.accumulate_scaled(&self.hop_up(src, j, i), -4.0);
                r.accumulate_scaled(&src[j], 6.0);
                r.accumulate_scaled(&self.hop_down(src, j, i), -4.0);
                let dd = geom.down(d, i);
                let far = src[dd]
                    .left_multiply_dagger(self.link(dd, i))
                    .left_multiply_dagger(link_down);
                r.add(&far);
                r
            }
            Some(w) => {
                let (up2, down2) = self.two_hops(w, src, j, i);
                let mut r = up2;
                r.add(&down2);
                r.accumulate_scaled(&src[j], -2.0);
                r.accumulate_scaled(&self.grad2_at(src, j, i), -4.0);
                r
            }
        }
    }

    /// `dst = Δ src`
    pub fn laplacian(&self, src: &Field<N>, dst: &mut Field<N>) {
        par_fill(dst.as_mut_slice(), |j| self.laplacian_at(src, j));
    }

    /// `dst = ∇_i src`
    pub fn grad1(&self, src: &Field<N>, i: usize, dst: &mut Field<N>) {
        par_fill(dst.as_mut_slice(), |j| self.grad1_at(src, j, i));
    }

    /// `dst = ∇²_i src`, always the naive stencil.
    pub fn grad2(&self, src: &Field<N>, i: usize, dst: &mut Field<N>) {
        par_fill(dst.as_mut_slice(), |j| self.grad2_at(src, j, i));
    }

    /// `dst = ∇⁴_i src`; improved stencils apply `1 - ∇²_i/6` on top,
    /// which takes a second pass through `scratch`.
    pub fn grad4(&self, src: &Field<N>, i: usize, dst: &mut Field<N>, scratch: &mut Field<N>) {
        if self.is_improved() {
            par_fill(scratch.as_mut_slice(), |j| self.grad4_at(src, j, i));
            let scratch = &*scratch;
            par_fill(dst.as_mut_slice(), |j| {
                let mut r = scratch[j];
                r.accumulate_scaled(&self.grad2_at(scratch, j, i), -1.0 / 6.0);
                r
            });
        } else {
            par_fill(dst.as_mut_slice(), |j| self.grad4_at(src, j, i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::random_field;
    use crate::lattice::Lattice;
    use crate::matrix::C64;

    const EPS: f64 = 1e-20;

    fn setup() -> (SliceGeometry, GaugeField<2>, TwoHopLinks<2>) {
        let lattice = Lattice::new([4, 5, 3, 6]).unwrap();
        let geom = SliceGeometry::new(&lattice, 1).unwrap();
        let gauge = GaugeField::random(lattice.volume(), 0.5, 17);
        let w = TwoHopLinks::compute(&geom, &gauge, 2);
        (geom, gauge, w)
    }

    fn distance<const N: usize>(a: &Field<N>, b: &Field<N>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let mut d = *x;
                d.accumulate_scaled(y, -1.0);
                d.norm_sqr()
            })
            .sum()
    }

    fn check_operator(v3: usize, op: impl Fn(&Field<2>, usize) -> FieldValue<2>) {
        let s = random_field::<2>(v3, 1);
        let t = random_field::<2>(v3, 2);
        let (a, b) = (0.7, -1.3);
        let combined = Field::from_values(
            s.iter()
                .zip(t.iter())
                .map(|(x, y)| {
                    let mut r = x.scale(a);
                    r.accumulate_scaled(y, b);
                    r
                })
                .collect(),
        );
        for j in 0..v3 {
            let mut expected = op(&s, j).scale(a);
            expected.accumulate_scaled(&op(&t, j), b);
            expected.accumulate_scaled(&op(&combined, j), -1.0);
            assert!(expected.norm_sqr() < EPS);
        }
    }

    fn check_linearity(stencil: Stencil<'_, 2>, v3: usize) {
        check_operator(v3, |f, j| stencil.grad1_at(f, j, 1));
        check_operator(v3, |f, j| stencil.grad2_at(f, j, 2));
        check_operator(v3, |f, j| stencil.laplacian_at(f, j));
        check_operator(v3, |f, j| stencil.grad4_at(f, j, 0));
    }

    #[test]
    fn test_linearity() {
        let (geom, gauge, w) = setup();
        check_linearity(Stencil::naive(&geom, &gauge, 2), geom.v3());
        check_linearity(Stencil::improved(&geom, &gauge, 2, &w), geom.v3());
    }

    #[test]
    fn test_two_hop_grad4_matches_five_point() {
        let (geom, gauge, w) = setup();
        let src = random_field::<2>(geom.v3(), 5);
        let naive = Stencil::naive(&geom, &gauge, 2);
        let improved = Stencil::improved(&geom, &gauge, 2, &w);
        for j in 0..geom.v3() {
            for i in 0..3 {
                let mut d = naive.grad4_at(&src, j, i);
                d.accumulate_scaled(&improved.grad4_at(&src, j, i), -1.0);
                assert!(d.norm_sqr() < EPS);
            }
        }
    }

    /// Plane wave `e^{ik·x}` on unit links is an eigenvector of every stencil.
    #[test]
    fn test_free_plane_wave_eigenvalues() {
        let lattice = Lattice::new([6, 6, 6, 2]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::<1>::cold(lattice.volume());
        let w = TwoHopLinks::compute(&geom, &gauge, 0);
        let k = [1.0, 2.0, 0.0].map(|n: f64| std::f64::consts::TAU * n / 6.0);
        let wave = Field::from_values(
            (0..geom.v3())
                .map(|j| {
                    let x = geom.spatial_coords(j);
                    let phase: f64 = (0..3).map(|i| k[i] * x[i] as f64).sum();
                    FieldValue::unit(C64::from_polar(1.0, phase))
                })
                .collect(),
        );

        let sin2 = |p: f64| (p / 2.0).sin().powi(2);
        let naive_lap: f64 = k.iter().map(|&p| -4.0 * sin2(p)).sum();
        let improved_lap: f64 = k
            .iter()
            .map(|&p| -16.0 / 3.0 * sin2(p) + 1.0 / 3.0 * sin2(2.0 * p))
            .sum();
        let grad4_x = 16.0 * sin2(k[0]).powi(2);

        let naive = Stencil::naive(&geom, &gauge, 0);
        let improved = Stencil::improved(&geom, &gauge, 0, &w);
        let mut out = Field::new(geom.v3());
        let mut scratch = Field::new(geom.v3());

        naive.laplacian(&wave, &mut out);
        let expected = Field::from_values(wave.iter().map(|v| v.scale(naive_lap)).collect());
        assert!(distance(&out, &expected) < EPS);

        improved.laplacian(&wave, &mut out);
        let expected = Field::from_values(wave.iter().map(|v| v.scale(improved_lap)).collect());
        assert!(distance(&out, &expected) < EPS);

        naive.grad4(&wave, 0, &mut out, &mut scratch);
        let expected = Field::from_values(wave.iter().map(|v| v.scale(grad4_x)).collect());
        assert!(distance(&out, &expected) < EPS);

        improved.grad4(&wave, 0, &mut out, &mut scratch);
        let factor = grad4_x * (1.0 + 4.0 * sin2(k[0]) / 6.0);
        let expected = Field::from_values(wave.iter().map(|v| v.scale(factor)).collect());
        assert!(distance(&out, &expected) < EPS);

        // ∇_x e^{ikx} = i sin(k) e^{ikx}
        naive.grad1(&wave, 0, &mut out);
        let expected = Field::from_values(
            wave.iter()
                .map(|v| v.scale_complex(C64::new(0.0, k[0].sin())))
                .collect(),
        );
        assert!(distance(&out, &expected) < EPS);
    }

    #[test]
    fn test_field_passes_match_site_operators() {
        let (geom, gauge, w) = setup();
        let src = random_field::<2>(geom.v3(), 9);
        let stencil = Stencil::improved(&geom, &gauge, 2, &w);
        let mut out = Field::new(geom.v3());
        stencil.grad2(&src, 1, &mut out);
        for j in 0..geom.v3() {
            assert_eq!(out[j], stencil.grad2_at(&src, j, 1));
        }
        stencil.grad1(&src, 2, &mut out);
        for j in 0..geom.v3() {
            assert_eq!(out[j], stencil.grad1_at(&src, j, 2));
        }
    }
}
