//! Four-slot spin/colour values and whole-slice fields.
//!
//! A [`FieldValue`] is a 2×2 spin matrix of colour matrices, slot `2*a + b`
//! holding spin component `(a, b)`. Pauli matrices act on the left spin index,
//! colour matrices on the left colour index, so the two actions commute.
use crate::matrix::{ColorMatrix, C64, CI, CZERO};
use std::ops::{Index, IndexMut};

pub const SLOTS: usize = 4;

/// A unit-modulus weight applied by [`FieldValue::accumulate_weighted`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    PlusOne,
    PlusI,
    MinusOne,
    MinusI,
}

impl Phase {
    #[inline]
    pub fn value(self) -> C64 {
        match self {
            Phase::PlusOne => C64::new(1.0, 0.0),
            Phase::PlusI => CI,
            Phase::MinusOne => C64::new(-1.0, 0.0),
            Phase::MinusI => -CI,
        }
    }
}

/// Pauli matrix acting on the spin index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pauli {
    X,
    Y,
    Z,
}

impl Pauli {
    /// Pauli matrices in spatial order, `σ_i` for `i = 0, 1, 2`.
    pub const ALL: [Pauli; 3] = [Pauli::X, Pauli::Y, Pauli::Z];

    /// Source slot and phase for every destination slot of `σ · S`.
    pub const fn maps(self) -> ([usize; SLOTS], [Phase; SLOTS]) {
        use Phase::*;
        match self {
            Pauli::X => ([2, 3, 0, 1], [PlusOne, PlusOne, PlusOne, PlusOne]),
            Pauli::Y => ([2, 3, 0, 1], [MinusI, MinusI, PlusI, PlusI]),
            Pauli::Z => ([0, 1, 2, 3], [PlusOne, PlusOne, MinusOne, MinusOne]),
        }
    }
}

/// The evolved quantity at one site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldValue<const N: usize> {
    pub slots: [ColorMatrix<N>; SLOTS],
}

impl<const N: usize> Default for FieldValue<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> FieldValue<N> {
    pub const ZERO: Self = Self {
        slots: [ColorMatrix::ZERO; SLOTS],
    };

    /// Identity in spin and colour, times `z`.
    pub fn unit(z: C64) -> Self {
        let mut r = Self::ZERO;
        r.slots[0] = ColorMatrix::diagonal(z);
        r.slots[3] = ColorMatrix::diagonal(z);
        r
    }

    #[inline]
    pub fn zero(&mut self) {
        *self = Self::ZERO;
    }

    #[inline]
    pub fn add(&mut self, other: &Self) {
        for (x, y) in self.slots.iter_mut().zip(other.slots.iter()) {
            *x += *y;
        }
    }

    /// `self += fac · other`
    #[inline]
    pub fn accumulate_scaled(&mut self, other: &Self, fac: f64) {
        for (x, y) in self.slots.iter_mut().zip(other.slots.iter()) {
            x.accumulate_scaled(y, fac);
        }
    }

    /// `self += i · fac · other`
    #[inline]
    pub fn accumulate_scaled_i(&mut self, other: &Self, fac: f64) {
        let z = C64::new(0.0, fac);
        for (x, y) in self.slots.iter_mut().zip(other.slots.iter()) {
            x.accumulate_scaled_complex(y, z);
        }
    }

    /// `self[d] += fac · phase[d] · other[index[d]]` for every slot `d`.
    #[inline]
    pub fn accumulate_weighted(
        &mut self,
        other: &Self,
        index: &[usize; SLOTS],
        phase: &[Phase; SLOTS],
        fac: f64,
    ) {
        for d in 0..SLOTS {
            let src = &other.slots[index[d]];
            match phase[d] {
                Phase::PlusOne => self.slots[d].accumulate_scaled(src, fac),
                Phase::MinusOne => self.slots[d].accumulate_scaled(src, -fac),
                Phase::PlusI => self.slots[d].accumulate_scaled_complex(src, C64::new(0.0, fac)),
                Phase::MinusI => {
                    self.slots[d].accumulate_scaled_complex(src, C64::new(0.0, -fac))
                }
            }
        }
    }

    /// `self += fac · σ · other`
    #[inline]
    pub fn accumulate_sigma(&mut self, other: &Self, sigma: Pauli, fac: f64) {
        let (index, phase) = sigma.maps();
        self.accumulate_weighted(other, &index, &phase, fac);
    }

    /// `M · self`, the same colour matrix applied to every slot.
    #[inline]
    pub fn left_multiply(&self, m: &ColorMatrix<N>) -> Self {
        Self {
            slots: self.slots.map(|s| m.multiply(&s)),
        }
    }

    /// `M† · self`
    #[inline]
    pub fn left_multiply_dagger(&self, m: &ColorMatrix<N>) -> Self {
        Self {
            slots: self.slots.map(|s| m.dagger_multiply(&s)),
        }
    }

    pub fn scale(&self, fac: f64) -> Self {
        let mut r = Self::ZERO;
        r.accumulate_scaled(self, fac);
        r
    }

    pub fn norm_sqr(&self) -> f64 {
        self.slots.iter().map(ColorMatrix::norm_sqr).sum()
    }

    /// Overall complex scale, used by sources.
    pub fn scale_complex(&self, z: C64) -> Self {
        Self {
            slots: self.slots.map(|s| s.scale_complex(z)),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.slots.iter().flat_map(|s| s.m.iter().flatten()).all(|z| *z == CZERO)
    }
}

/// One time-slice worth of [`FieldValue`]s, indexed by slice-local site.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Field<const N: usize> {
    values: Vec<FieldValue<N>>,
}

impl<const N: usize> Field<N> {
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![FieldValue::ZERO; len],
        }
    }

    pub fn from_values(values: Vec<FieldValue<N>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldValue<N>] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [FieldValue<N>] {
        &mut self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldValue<N>> {
        self.values.iter()
    }

    pub fn norm_sqr(&self) -> f64 {
        self.values.iter().map(FieldValue::norm_sqr).sum()
    }
}

impl<const N: usize> Index<usize> for Field<N> {
    type Output = FieldValue<N>;
    #[inline]
    fn index(&self, j: usize) -> &FieldValue<N> {
        &self.values[j]
    }
}

impl<const N: usize> IndexMut<usize> for Field<N> {
    #[inline]
    fn index_mut(&mut self, j: usize) -> &mut FieldValue<N> {
        &mut self.values[j]
    }
}
