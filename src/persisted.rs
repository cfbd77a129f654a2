//! Reduced-precision storage of a whole propagator.
use crate::field::{Field, FieldValue, SLOTS};
use crate::matrix::{ColorMatrix, C64};
use crate::traits::FieldSink;
use anyhow::{anyhow, ensure, Context, Result};
use flate2::{
    read::{GzDecoder, GzEncoder},
    Compression,
};
use num_complex::Complex32;
use std::io::Read;
use std::path::Path;

const MAGIC: &[u8; 8] = b"NRQCDPF1";
const HEADER_LEN: usize = MAGIC.len() + 3 * 4;

/// `Complex32` array of shape `(time extent, spatial volume, 4·N²)`.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedField<const N: usize> {
    nt: usize,
    v3: usize,
    data: Vec<Complex32>,
}

impl<const N: usize> PersistedField<N> {
    /// Entries per site.
    pub const STRIDE: usize = SLOTS * N * N;

    pub fn new(nt: usize, v3: usize) -> Self {
        Self {
            nt,
            v3,
            data: vec![Complex32::new(0.0, 0.0); nt * v3 * Self::STRIDE],
        }
    }

    pub fn nt(&self) -> usize {
        self.nt
    }

    pub fn v3(&self) -> usize {
        self.v3
    }

    pub fn as_slice(&self) -> &[Complex32] {
        &self.data
    }

    #[inline]
    fn offset(&self, t: usize, j: usize) -> usize {
        (t * self.v3 + j) * Self::STRIDE
    }

    /// Value at slice `t`, site `j`, widened back to double precision.
    pub fn value(&self, t: usize, j: usize) -> FieldValue<N> {
        let mut entries = self.data[self.offset(t, j)..].iter();
        let mut r = FieldValue::ZERO;
        for slot in r.slots.iter_mut() {
            for z in slot.m.iter_mut().flatten() {
                if let Some(e) = entries.next() {
                    *z = C64::new(e.re as f64, e.im as f64);
                }
            }
        }
        r
    }

    pub fn slice_norm_sqr(&self, t: usize) -> f64 {
        let start = self.offset(t, 0);
        self.data[start..start + self.v3 * Self::STRIDE]
            .iter()
            .map(|z| (z.re as f64).powi(2) + (z.im as f64).powi(2))
            .sum()
    }

    /// Little-endian binary: magic, `N`, `nt`, `v3` as `u32`, then `(re, im)` pairs.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 8);
        bytes.extend_from_slice(MAGIC);
        for x in [N, self.nt, self.v3] {
            let x = u32::try_from(x).with_context(|| format!("{} does not fit the header", x))?;
            bytes.extend_from_slice(&x.to_le_bytes());
        }
        for z in self.data.iter() {
            bytes.extend_from_slice(&z.re.to_le_bytes());
            bytes.extend_from_slice(&z.im.to_le_bytes());
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= HEADER_LEN, "Truncated header");
        ensure!(&bytes[..MAGIC.len()] == MAGIC, "Not a persisted field");
        let word = |k: usize| {
            let at = MAGIC.len() + 4 * k;
            let mut w = [0u8; 4];
            w.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(w) as usize
        };
        let (n, nt, v3) = (word(0), word(1), word(2));
        ensure!(n == N, "Stored colour dimension {} but {} was requested", n, N);

        let expected_len = nt
            .checked_mul(v3)
            .and_then(|x| x.checked_mul(Self::STRIDE))
            .and_then(|x| x.checked_mul(8))
            .ok_or_else(|| anyhow!("Shape ({}, {}) overflows", nt, v3))?;
        let body = &bytes[HEADER_LEN..];
        ensure!(
            body.len() == expected_len,
            "Expected {} bytes of data, found {}",
            expected_len,
            body.len()
        );
        let data = body
            .chunks_exact(8)
            .map(|c| {
                let f = |k: usize| f32::from_le_bytes([c[k], c[k + 1], c[k + 2], c[k + 3]]);
                Complex32::new(f(0), f(4))
            })
            .collect();
        Ok(Self { nt, v3, data })
    }

    /// Writes the field, gzip-compressed when the path ends in `.gz`.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = self.to_bytes()?;
        let bytes = if is_gzip(path) {
            let mut encoder = GzEncoder::new(&raw[..], Compression::default());
            let mut compressed = Vec::new();
            encoder
                .read_to_end(&mut compressed)
                .context("Failed to compress field data")?;
            compressed
        } else {
            raw
        };
        std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed = if is_gzip(path) {
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut raw = Vec::new();
            decoder
                .read_to_end(&mut raw)
                .context("Failed to decompress field data")?;
            Self::from_bytes(&raw)
        } else {
            Self::from_bytes(&bytes)
        };
        parsed.with_context(|| format!("Invalid field file {}", path.display()))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

impl<const N: usize> FieldSink<N> for PersistedField<N> {
    fn shape(&self) -> (usize, usize) {
        (self.nt, self.v3)
    }

    fn write_slice(&mut self, t: usize, field: &Field<N>) {
        let start = self.offset(t, 0);
        let out = &mut self.data[start..start + self.v3 * Self::STRIDE];
        for (chunk, value) in out.chunks_exact_mut(Self::STRIDE).zip(field.iter()) {
            let entries = value.slots.iter().flat_map(|s: &ColorMatrix<N>| s.m.iter().flatten());
            for (dst, z) in chunk.iter_mut().zip(entries) {
                *dst = Complex32::new(z.re as f32, z.im as f32);
            }
        }
    }
}
