//! Fixed-size complex matrices: the colour algebra under every link and field.
//!
//! Two interchangeable backends implement the hot products. The `packed`
//! backend is selected by the default `packed-kernel` feature; `scalar` is the
//! portable reference. Callers only see [`ColorMatrix`].
#[cfg_attr(not(feature = "packed-kernel"), allow(dead_code))]
mod packed;
#[cfg_attr(feature = "packed-kernel", allow(dead_code))]
mod scalar;

#[cfg(feature = "packed-kernel")]
use packed as kernel;
#[cfg(not(feature = "packed-kernel"))]
use scalar as kernel;

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

pub use num_complex::Complex64 as C64;

pub(crate) const CZERO: C64 = C64::new(0.0, 0.0);
pub(crate) const CONE: C64 = C64::new(1.0, 0.0);
pub(crate) const CI: C64 = C64::new(0.0, 1.0);

type Block<const N: usize> = [[C64; N]; N];

/// N×N complex matrix, row-major: `m[row][col]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatrix<const N: usize> {
    pub m: [[C64; N]; N],
}

impl<const N: usize> Default for ColorMatrix<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> ColorMatrix<N> {
    pub const ZERO: Self = Self { m: [[CZERO; N]; N] };

    pub fn identity() -> Self {
        Self::diagonal(CONE)
    }

    /// `z` times the identity.
    pub fn diagonal(z: C64) -> Self {
        let mut r = Self::ZERO;
        for i in 0..N {
            r.m[i][i] = z;
        }
        r
    }

    pub fn from_fn(mut f: impl FnMut(usize, usize) -> C64) -> Self {
        let mut r = Self::ZERO;
        for (i, row) in r.m.iter_mut().enumerate() {
            for (j, x) in row.iter_mut().enumerate() {
                *x = f(i, j);
            }
        }
        r
    }

    /// `self · rhs`
    #[inline]
    pub fn multiply(&self, rhs: &Self) -> Self {
        Self {
            m: kernel::multiply(&self.m, &rhs.m),
        }
    }

    /// `self† · rhs`
    #[inline]
    pub fn dagger_multiply(&self, rhs: &Self) -> Self {
        Self {
            m: kernel::dagger_multiply(&self.m, &rhs.m),
        }
    }

    /// `self · rhs†`
    #[inline]
    pub fn multiply_dagger(&self, rhs: &Self) -> Self {
        Self {
            m: kernel::multiply_dagger(&self.m, &rhs.m),
        }
    }

    /// `self† · rhs†`
    #[inline]
    pub fn dagger_multiply_dagger(&self, rhs: &Self) -> Self {
        Self {
            m: kernel::dagger_multiply_dagger(&self.m, &rhs.m),
        }
    }

    /// `self += s · rhs`
    #[inline]
    pub fn accumulate_scaled(&mut self, rhs: &Self, s: f64) {
        kernel::accumulate_scaled(&mut self.m, &rhs.m, s);
    }

    /// `self += z · rhs`
    #[inline]
    pub fn accumulate_scaled_complex(&mut self, rhs: &Self, z: C64) {
        for (row, rrow) in self.m.iter_mut().zip(rhs.m.iter()) {
            for (x, y) in row.iter_mut().zip(rrow.iter()) {
                *x += *y * z;
            }
        }
    }

    pub fn scale(&self, s: f64) -> Self {
        let mut r = Self::ZERO;
        r.accumulate_scaled(self, s);
        r
    }

    pub fn scale_complex(&self, z: C64) -> Self {
        let mut r = Self::ZERO;
        r.accumulate_scaled_complex(self, z);
        r
    }

    /// Conjugate transpose.
    pub fn dagger(&self) -> Self {
        Self::from_fn(|i, j| self.m[j][i].conj())
    }

    pub fn trace(&self) -> C64 {
        (0..N).map(|i| self.m[i][i]).sum()
    }

    pub fn re_trace(&self) -> f64 {
        (0..N).map(|i| self.m[i][i].re).sum()
    }

    /// Squared Frobenius norm.
    pub fn norm_sqr(&self) -> f64 {
        self.m.iter().flatten().map(|z| z.norm_sqr()).sum()
    }

    /// Projects onto the Hermitian traceless matrices:
    /// `(M + M†)/2 - Tr[(M + M†)/2] / N`.
    pub fn hermitian_traceless(&self) -> Self {
        let mut r = Self::from_fn(|i, j| (self.m[i][j] + self.m[j][i].conj()) * 0.5);
        let shift = r.trace() / N as f64;
        for i in 0..N {
            r.m[i][i] -= shift;
        }
        r
    }
}

impl<const N: usize> Mul for ColorMatrix<N> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        self.multiply(&rhs)
    }
}

impl<const N: usize> Mul<f64> for ColorMatrix<N> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl<const N: usize> Add for ColorMatrix<N> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            m: kernel::add(&self.m, &rhs.m),
        }
    }
}

impl<const N: usize> AddAssign for ColorMatrix<N> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.m = kernel::add(&self.m, &rhs.m);
    }
}

impl<const N: usize> Sub for ColorMatrix<N> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        let mut r = self;
        r.accumulate_scaled(&rhs, -1.0);
        r
    }
}

impl<const N: usize> SubAssign for ColorMatrix<N> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.accumulate_scaled(&rhs, -1.0);
    }
}

impl<const N: usize> Neg for ColorMatrix<N> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        self.scale(-1.0)
    }
}
