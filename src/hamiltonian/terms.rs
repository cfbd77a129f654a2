//! Evaluators for the correction terms of the Hamiltonian.
//!
//! Every evaluator adds `scale · c_k · O_k(src)` to the accumulator. Inputs
//! are only read; intermediates live in the caller's [`Scratch`] and, for
//! composite terms, in the spare buffer the driver lends.
use super::{HamiltonianParams, TermKind};
use crate::derivatives::Stencil;
use crate::field::{Field, FieldValue, Pauli};
use crate::field_strength::FieldStrength;
use crate::matrix::ColorMatrix;
use crate::parallel::{par_fill, par_update};

/// Number of term-local scratch fields.
pub const SCRATCH_FIELDS: usize = 4;

/// Term-local intermediates, owned by the driver and reused every slice.
pub struct Scratch<const N: usize> {
    fields: [Field<N>; SCRATCH_FIELDS],
}

impl<const N: usize> Scratch<N> {
    pub fn new(len: usize) -> Self {
        Self {
            fields: std::array::from_fn(|_| Field::new(len)),
        }
    }
}

/// Read-only inputs shared by all terms at one slice.
#[derive(Clone, Copy)]
pub struct TermContext<'a, const N: usize> {
    stencil: Stencil<'a, N>,
    strength: &'a FieldStrength<N>,
    params: &'a HamiltonianParams,
}

impl<'a, const N: usize> TermContext<'a, N> {
    pub fn new(
        stencil: Stencil<'a, N>,
        strength: &'a FieldStrength<N>,
        params: &'a HamiltonianParams,
    ) -> Self {
        Self {
            stencil,
            strength,
            params,
        }
    }

    fn mass(&self) -> f64 {
        self.params.mass
    }

    /// `dst = Δ src`
    fn laplacian(&self, src: &Field<N>, dst: &mut Field<N>) {
        self.stencil.laplacian(src, dst);
    }

    /// `dst[k] = E_k · src` for the three spatial directions.
    fn electric_times(&self, src: &Field<N>, dst: &mut [Field<N>]) {
        for (k, out) in dst.iter_mut().take(3).enumerate() {
            par_fill(out.as_mut_slice(), |j| {
                src[j].left_multiply(self.strength.electric(j, k))
            });
        }
    }

    /// `Σ_i σ_i B_i · src` at slice index `j`.
    fn sigma_b_at(&self, src: &Field<N>, j: usize) -> FieldValue<N> {
        let mut r = FieldValue::ZERO;
        for (i, sigma) in Pauli::ALL.into_iter().enumerate() {
            let b = src[j].left_multiply(self.strength.magnetic(j, i));
            r.accumulate_sigma(&b, sigma, 1.0);
        }
        r
    }

    /// `Σ_i (∇_i(E_i G) - E_i ∇_i G)` given `e_src[k] = E_k G`.
    fn darwin_at(&self, src: &Field<N>, e_src: &[Field<N>], j: usize) -> FieldValue<N> {
        let mut r = FieldValue::ZERO;
        for i in 0..3 {
            r.add(&self.stencil.grad1_at(&e_src[i], j, i));
            let d = self.stencil.grad1_at(src, j, i);
            r.accumulate_scaled(&d.left_multiply(self.strength.electric(j, i)), -1.0);
        }
        r
    }

    /// `σ·X G` with `X_i = ε_ijk (∇_j(E_k G) - E_j ∇_k G)`, given `e_src[k] = E_k G`.
    fn spin_orbit_at(&self, src: &Field<N>, e_src: &[Field<N>], j: usize) -> FieldValue<N> {
        let stencil = &self.stencil;
        let e = |k: usize| self.strength.electric(j, k);
        let mut r = FieldValue::ZERO;
        for (i, sigma) in Pauli::ALL.into_iter().enumerate() {
            let (a, b) = ((i + 1) % 3, (i + 2) % 3);
            let mut x = stencil.grad1_at(&e_src[b], j, a);
            x.accumulate_scaled(&stencil.grad1_at(&e_src[a], j, b), -1.0);
            x.accumulate_scaled(&stencil.grad1_at(src, j, b).left_multiply(e(a)), -1.0);
            x.add(&stencil.grad1_at(src, j, a).left_multiply(e(b)));
            r.accumulate_sigma(&x, sigma, 1.0);
        }
        r
    }

    /// `acc += f · Δ(Δ src)`
    fn laplacian_squared(&self, src: &Field<N>, acc: &mut Field<N>, f: f64, tmp: &mut Field<N>) {
        self.laplacian(src, tmp);
        let tmp = &*tmp;
        par_update(acc.as_mut_slice(), |j, a| {
            a.accumulate_scaled(&self.stencil.laplacian_at(tmp, j), f)
        });
    }

    /// `acc += f · (Σ_i M_i M_i) src` for the electric or magnetic components.
    fn squared_field(
        &self,
        src: &Field<N>,
        acc: &mut Field<N>,
        f: f64,
        component: impl Fn(usize, usize) -> &'a ColorMatrix<N> + Sync,
    ) {
        par_update(acc.as_mut_slice(), |j, a| {
            let m = (0..3).fold(ColorMatrix::ZERO, |s, i| {
                s + component(j, i).multiply(component(j, i))
            });
            a.accumulate_scaled(&src[j].left_multiply(&m), f);
        });
    }
}

fn accumulate<const N: usize>(acc: &mut Field<N>, from: &Field<N>, f: f64) {
    par_update(acc.as_mut_slice(), |j, a| a.accumulate_scaled(&from[j], f));
}

impl TermKind {
    /// Adds `scale · c_k · O_k(src)` to `acc`.
    ///
    /// Composite terms need `spare`; the driver withholds it only when none
    /// of them is active.
    pub(crate) fn apply<const N: usize>(
        self,
        ctx: &TermContext<'_, N>,
        src: &Field<N>,
        acc: &mut Field<N>,
        scale: f64,
        scratch: &mut Scratch<N>,
        spare: Option<&mut Field<N>>,
    ) {
        let params = ctx.params;
        let m = ctx.mass();
        let n = params.substeps as f64;
        let c = scale * params.coefficient(self);
        let [s0, s1, s2, s3] = &mut scratch.fields;

        match self {
            // The driver applies c0 through its substeps, never through the
            // correction walk; at scale -1/(2n) this arm is one substep.
            TermKind::Kinetic => {
                let f = -c / (2.0 * m);
                ctx.laplacian(src, s0);
                accumulate(acc, s0, f);
            }
            TermKind::QuarticKinetic => {
                ctx.laplacian_squared(src, acc, -c / (8.0 * m.powi(3)), s0);
            }
            TermKind::Darwin => {
                let f = c / (8.0 * m * m);
                let mut e_src = [std::mem::take(s0), std::mem::take(s1), std::mem::take(s2)];
                ctx.electric_times(src, &mut e_src);
                par_update(acc.as_mut_slice(), |j, a| {
                    a.accumulate_scaled_i(&ctx.darwin_at(src, &e_src, j), f)
                });
                [*s0, *s1, *s2] = e_src;
            }
            TermKind::SpinOrbit => {
                let f = -c / (8.0 * m * m);
                let mut e_src = [std::mem::take(s0), std::mem::take(s1), std::mem::take(s2)];
                ctx.electric_times(src, &mut e_src);
                par_update(acc.as_mut_slice(), |j, a| {
                    a.accumulate_scaled(&ctx.spin_orbit_at(src, &e_src, j), f)
                });
                [*s0, *s1, *s2] = e_src;
            }
            TermKind::SigmaB => {
                let f = -c / (2.0 * m);
                par_update(acc.as_mut_slice(), |j, a| {
                    a.accumulate_scaled(&ctx.sigma_b_at(src, j), f)
                });
            }
            TermKind::QuarticDerivative => {
                let f = c / (24.0 * m);
                for i in 0..3 {
                    ctx.stencil.grad4(src, i, s1, s0);
                    accumulate(acc, s1, f);
                }
            }
            TermKind::KineticStepCorrection => {
                ctx.laplacian_squared(src, acc, -c / (16.0 * n * m * m), s0);
            }
            TermKind::KineticSigmaBAnticommutator => {
                let f = -c / (8.0 * m.powi(3));
                let spare = spare.expect("composite term evaluated without a spare buffer");
                par_fill(s0.as_mut_slice(), |j| ctx.sigma_b_at(src, j));
                ctx.laplacian(s0, spare);
                ctx.laplacian(src, s1);
                let (outer, inner) = (&*spare, &*s1);
                par_update(acc.as_mut_slice(), |j, a| {
                    a.accumulate_scaled(&outer[j], f);
                    a.accumulate_scaled(&ctx.sigma_b_at(inner, j), f);
                });
            }
            TermKind::QuarticSpinOrbit => {
                let f = -3.0 * c / (64.0 * m.powi(4));
                let spare = spare.expect("composite term evaluated without a spare buffer");
                let mut e_src = [std::mem::take(s0), std::mem::take(s1), std::mem::take(s2)];

                // Δ (σ·X G)
                ctx.electric_times(src, &mut e_src);
                par_fill(s3.as_mut_slice(), |j| ctx.spin_orbit_at(src, &e_src, j));
                ctx.laplacian(s3, spare);

                // σ·X (Δ G)
                ctx.laplacian(src, s3);
                ctx.electric_times(s3, &mut e_src);
                let (outer, inner) = (&*spare, &*s3);
                par_update(acc.as_mut_slice(), |j, a| {
                    a.accumulate_scaled(&outer[j], f);
                    a.accumulate_scaled(&ctx.spin_orbit_at(inner, &e_src, j), f);
                });
                [*s0, *s1, *s2] = e_src;
            }
            TermKind::ElectricSquared => {
                let strength = ctx.strength;
                ctx.squared_field(src, acc, -c / (8.0 * m.powi(3)), |j, i| {
                    strength.electric(j, i)
                });
            }
            TermKind::MagneticSquared => {
                let strength = ctx.strength;
                ctx.squared_field(src, acc, -c / (8.0 * m.powi(3)), |j, i| {
                    strength.magnetic(j, i)
                });
            }
            TermKind::KineticCubed => {
                let f = -c / (16.0 * m.powi(5));
                let spare = spare.expect("composite term evaluated without a spare buffer");
                ctx.laplacian(src, s0);
                ctx.laplacian(s0, s1);
                ctx.laplacian(s1, spare);
                accumulate(acc, spare, f);
            }
        }
    }
}

/// Adds `scale · δH · src` to `acc`, evaluating only the active correction terms.
pub(crate) fn accumulate_corrections<const N: usize>(
    ctx: &TermContext<'_, N>,
    src: &Field<N>,
    acc: &mut Field<N>,
    scale: f64,
    scratch: &mut Scratch<N>,
    mut spare: Option<&mut Field<N>>,
) {
    for kind in ctx.params.active_corrections() {
        kind.apply(ctx, src, acc, scale, scratch, spare.as_deref_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::random_field;
    use crate::gauge::GaugeField;
    use crate::hamiltonian::NUM_TERMS;
    use crate::lattice::{Lattice, SliceGeometry};

    struct Setup {
        geom: SliceGeometry,
        gauge: GaugeField<2>,
        strength: FieldStrength<2>,
    }

    fn setup(improved: bool) -> Setup {
        let lattice = Lattice::new([4, 3, 5, 4]).unwrap();
        let geom = SliceGeometry::new(&lattice, 3).unwrap();
        let gauge = GaugeField::random(lattice.volume(), 0.5, 31);
        let strength = FieldStrength::compute(&geom, &gauge, 1, improved, 1.0);
        Setup {
            geom,
            gauge,
            strength,
        }
    }

    impl Setup {
        fn context<'a>(&'a self, params: &'a HamiltonianParams) -> TermContext<'a, 2> {
            let stencil = if params.improved {
                Stencil::improved(&self.geom, &self.gauge, 1, self.strength.two_hop())
            } else {
                Stencil::naive(&self.geom, &self.gauge, 1)
            };
            TermContext::new(stencil, &self.strength, params)
        }

        fn run(&self, params: &HamiltonianParams, kind: TermKind, src: &Field<2>) -> Field<2> {
            let ctx = self.context(params);
            let v3 = self.geom.v3();
            let mut acc = random_field::<2>(v3, 77);
            let mut scratch = Scratch::new(v3);
            let mut spare = Field::new(v3);
            kind.apply(&ctx, src, &mut acc, 0.5, &mut scratch, Some(&mut spare));
            acc
        }
    }

    #[test]
    fn test_zero_coefficient_changes_nothing() {
        for improved in [false, true] {
            let s = setup(improved);
            let params = HamiltonianParams {
                coefficients: [0.0; NUM_TERMS],
                improved,
                ..Default::default()
            };
            let src = random_field::<2>(s.geom.v3(), 3);
            let untouched = random_field::<2>(s.geom.v3(), 77);
            for kind in TermKind::ALL {
                assert_eq!(s.run(&params, kind, &src), untouched, "{:?}", kind);
            }

            // skipped by the registry walk
            let ctx = s.context(&params);
            let mut acc = untouched.clone();
            let mut scratch = Scratch::new(s.geom.v3());
            accumulate_corrections(&ctx, &src, &mut acc, 1.0, &mut scratch, None);
            assert_eq!(acc, untouched);
        }
    }

    #[test]
    fn test_terms_are_linear_in_coefficient() {
        let s = setup(true);
        let src = random_field::<2>(s.geom.v3(), 4);
        let base = random_field::<2>(s.geom.v3(), 77);
        for kind in TermKind::corrections() {
            let one = HamiltonianParams {
                improved: true,
                mass: 1.7,
                substeps: 2,
                ..Default::default()
            }
            .with_coefficient(kind, 1.0);
            let two = one.clone().with_coefficient(kind, 2.0);
            let d1 = s.run(&one, kind, &src);
            let d2 = s.run(&two, kind, &src);
            let mut err = 0.0;
            let mut size = 0.0;
            for j in 0..s.geom.v3() {
                let mut a = d2[j];
                a.accumulate_scaled(&base[j], -1.0);
                let mut b = d1[j];
                b.accumulate_scaled(&base[j], -1.0);
                size += b.norm_sqr();
                b = b.scale(2.0);
                b.accumulate_scaled(&a, -1.0);
                err += b.norm_sqr();
            }
            assert!(size > 0.0, "{:?} contributes nothing", kind);
            assert!(err < 1e-20 * size.max(1.0), "{:?}", kind);
        }
    }

    #[test]
    fn test_kinetic_term_matches_laplacian() {
        let s = setup(false);
        let params = HamiltonianParams {
            mass: 2.0,
            ..Default::default()
        };
        let src = random_field::<2>(s.geom.v3(), 6);
        let out = s.run(&params, TermKind::Kinetic, &src);
        let base = random_field::<2>(s.geom.v3(), 77);
        let stencil = Stencil::naive(&s.geom, &s.gauge, 1);
        for j in 0..s.geom.v3() {
            // 0.5 · (-Δ/(2·2))
            let mut expected = base[j];
            expected.accumulate_scaled(&stencil.laplacian_at(&src, j), -0.125);
            expected.accumulate_scaled(&out[j], -1.0);
            assert!(expected.norm_sqr() < 1e-24);
        }
    }

    #[test]
    fn test_sigma_b_is_hermitian_in_spin_colour() {
        // <T, σ·B S> = <σ·B T, S> since σ_i and B_i are both Hermitian
        let s = setup(false);
        let ctx_params = HamiltonianParams::default();
        let ctx = s.context(&ctx_params);
        let a = random_field::<2>(s.geom.v3(), 8);
        let b = random_field::<2>(s.geom.v3(), 9);
        let inner = |x: &FieldValue<2>, y: &FieldValue<2>| {
            x.slots
                .iter()
                .zip(y.slots.iter())
                .map(|(p, q)| p.dagger_multiply(q).trace())
                .sum::<crate::matrix::C64>()
        };
        let mut lhs = crate::matrix::C64::new(0.0, 0.0);
        let mut rhs = lhs;
        for j in 0..s.geom.v3() {
            lhs += inner(&a[j], &ctx.sigma_b_at(&b, j));
            rhs += inner(&ctx.sigma_b_at(&a, j), &b[j]);
        }
        assert!((lhs - rhs).norm() < 1e-10);
    }
}
