//! Portable backend: plain loops over complex numbers.
use super::{Block, C64, CZERO};

#[inline(always)]
fn element<const N: usize, const DAGGER: bool>(m: &Block<N>, row: usize, col: usize) -> C64 {
    if DAGGER {
        m[col][row].conj()
    } else {
        m[row][col]
    }
}

#[inline]
fn product<const N: usize, const DA: bool, const DB: bool>(a: &Block<N>, b: &Block<N>) -> Block<N> {
    let mut r = [[CZERO; N]; N];
    for (i, row) in r.iter_mut().enumerate() {
        for (j, out) in row.iter_mut().enumerate() {
            let mut s = CZERO;
            for k in 0..N {
                s += element::<N, DA>(a, i, k) * element::<N, DB>(b, k, j);
            }
            *out = s;
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
    for (row, brow) in r.iter_mut().zip(b.iter()) {
        for (x, y) in row.iter_mut().zip(brow.iter()) {
            *x += *y;
        }
    }
    r
}

/// `acc += s * b`
#[inline]
pub(crate) fn accumulate_scaled<const N: usize>(acc: &mut Block<N>, b: &Block<N>, s: f64) {
    for (row, brow) in acc.iter_mut().zip(b.iter()) {
        for (x, y) in row.iter_mut().zip(brow.iter()) {
            *x += *y * s;
        }
    }
}
