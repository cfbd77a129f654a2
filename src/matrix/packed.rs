//! Packed backend: real and imaginary parts are accumulated in separate
//! row buffers so the innermost loop is a pair of independent real axpys,
//! which the compiler vectorizes for every fixed `N`.
#![allow(clippy::needless_range_loop)]
use super::{Block, C64, CZERO};

#[inline(always)]
fn parts<const N: usize, const DAGGER: bool>(m: &Block<N>, row: usize, col: usize) -> (f64, f64) {
    if DAGGER {
        let z = m[col][row];
        (z.re, -z.im)
    } else {
        let z = m[row][col];
        (z.re, z.im)
    }
}

#[inline]
fn product<const N: usize, const DA: bool, const DB: bool>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    let mut re = [[0.0f64; N]; N];
    let mut im = [[0.0f64; N]; N];
    for i in 0..N {
        let (row_re, row_im) = (&mut re[i], &mut im[i]);
        for k in 0..N {
            let (ar, ai) = parts::<N, DA>(a, i, k);
            for j in 0..N {
                let (br, bi) = parts::<N, DB>(b, k, j);
                row_re[j] += ar * br - ai * bi;
                row_im[j] += ar * bi + ai * br;
            }
        }
    }

    let mut r = [[CZERO; N]; N];
    for i in 0..N {
        for j in 0..N {
            r[i][j] = C64::new(re[i][j], im[i][j]);
        }
    }
    r
}

#[inline]
pub(crate) fn multiply<const N: usize>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    product::<N, false, false>(a, b)
}

#[inline]
pub(crate) fn dagger_multiply<const N: usize>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    product::<N, true, false>(a, b)
}

#[inline]
pub(crate) fn multiply_dagger<const N: usize>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    product::<N, false, true>(a, b)
}

#[inline]
pub(crate) fn dagger_multiply_dagger<const N: usize>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    product::<N, true, true>(a, b)
}

#[inline]
pub(crate) fn add<const N: usize>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    let mut r = *a;
    for i in 0..N {
        for j in 0..N {
            r[i][j].re += b[i][j].re;
            r[i][j].im += b[i][j].im;
        }
    }
    r
}

/// `acc += s * b`
#[inline]
pub(crate) fn accumulate_scaled<const N: usize>(acc: &mut Block<N>, b: &Block<N>, s: f64) {
    for i in 0..N {
        for j in 0..N {
            acc[i][j].re += b[i][j].re * s;
            acc[i][j].im += b[i][j].im * s;
        }
    }
}
