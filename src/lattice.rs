//! Periodic 4-D grid navigation and its time-slice decomposition.
use crate::error::{EvolutionError, Result};

/// Number of space-time directions.
pub const NDIM: usize = 4;

/// Flattened periodic grid with direction 0 running fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    dims: [usize; NDIM],
    forward: Vec<[usize; NDIM]>,
    backward: Vec<[usize; NDIM]>,
}

impl Lattice {
    pub fn new(dims: [usize; NDIM]) -> Result<Self> {
        if dims.contains(&0) {
            return Err(EvolutionError::lattice(format!(
                "every extent must be at least 1, got {:?}",
                dims
            )));
        }
        let volume = dims
            .iter()
            .try_fold(1usize, |v, &d| v.checked_mul(d))
            .ok_or_else(|| EvolutionError::lattice(format!("volume of {:?} overflows", dims)))?;

        let mut lattice = Self {
            dims,
            forward: Vec::with_capacity(volume),
            backward: Vec::with_capacity(volume),
        };
        for site in 0..volume {
            let x = lattice.coords(site);
            let mut fwd = [0; NDIM];
            let mut bwd = [0; NDIM];
            for mu in 0..NDIM {
                let mut y = x;
                y[mu] = (x[mu] + 1) % dims[mu];
                fwd[mu] = lattice.site(y);
                y[mu] = (x[mu] + dims[mu] - 1) % dims[mu];
                bwd[mu] = lattice.site(y);
            }
            lattice.forward.push(fwd);
            lattice.backward.push(bwd);
        }
        Ok(lattice)
    }

    pub fn dims(&self) -> [usize; NDIM] {
        self.dims
    }

    pub fn volume(&self) -> usize {
        self.forward.len()
    }

    pub fn coords(&self, mut site: usize) -> [usize; NDIM] {
        let mut x = [0; NDIM];
        for (xi, &d) in x.iter_mut().zip(self.dims.iter()) {
            *xi = site % d;
            site /= d;
        }
        x
    }

    /// Inverse of [`Lattice::coords`]; coordinates are taken modulo the extents.
    pub fn site(&self, x: [usize; NDIM]) -> usize {
        x.iter()
            .zip(self.dims.iter())
            .rev()
            .fold(0, |acc, (&xi, &d)| acc * d + xi % d)
    }

    #[inline]
    pub fn neighbor_forward(&self, site: usize, mu: usize) -> usize {
        self.forward[site][mu]
    }

    #[inline]
    pub fn neighbor_backward(&self, site: usize, mu: usize) -> usize {
        self.backward[site][mu]
    }
}

/// The lattice seen as a stack of time-slices along one axis.
///
/// A slice index `j` enumerates the spatial sites of one slice, the first
/// spatial axis running fastest. `up`/`down` are slice-local periodic
/// neighbours, so stencils never leave the slice they work on.
#[derive(Clone, Debug)]
pub struct SliceGeometry {
    lattice: Lattice,
    time_axis: usize,
    spatial_axes: [usize; 3],
    spatial_dims: [usize; 3],
    sites: Vec<usize>,
    locations: Vec<(usize, usize)>,
    up: Vec<[usize; 3]>,
    down: Vec<[usize; 3]>,
}

impl SliceGeometry {
    pub fn new(lattice: &Lattice, time_axis: usize) -> Result<Self> {
        if time_axis >= NDIM {
            return Err(EvolutionError::parameters(format!(
                "time axis {} is not a lattice direction",
                time_axis
            )));
        }
        let mut spatial_axes = [0; 3];
        for (slot, mu) in spatial_axes
            .iter_mut()
            .zip((0..NDIM).filter(|&mu| mu != time_axis))
        {
            *slot = mu;
        }
        let dims = lattice.dims();
        let spatial_dims = spatial_axes.map(|mu| dims[mu]);
        let nt = dims[time_axis];
        let v3 = spatial_dims.iter().product::<usize>();

        let mut sites = Vec::with_capacity(nt * v3);
        let mut locations = vec![(0, 0); lattice.volume()];
        for t in 0..nt {
            for j in 0..v3 {
                let s = Self::spatial_coords_in(&spatial_dims, j);
                let mut x = [0; NDIM];
                x[time_axis] = t;
                for (i, &mu) in spatial_axes.iter().enumerate() {
                    x[mu] = s[i];
                }
                let site = lattice.site(x);
                sites.push(site);
                locations[site] = (t, j);
            }
        }

        let slice_index = |s: [usize; 3]| {
            s[0] + spatial_dims[0] * (s[1] + spatial_dims[1] * s[2])
        };
        let mut up = Vec::with_capacity(v3);
        let mut down = Vec::with_capacity(v3);
        for j in 0..v3 {
            let s = Self::spatial_coords_in(&spatial_dims, j);
            let mut u = [0; 3];
            let mut d = [0; 3];
            for i in 0..3 {
                let mut y = s;
                y[i] = (s[i] + 1) % spatial_dims[i];
                u[i] = slice_index(y);
                y[i] = (s[i] + spatial_dims[i] - 1) % spatial_dims[i];
                d[i] = slice_index(y);
            }
            up.push(u);
            down.push(d);
        }

        Ok(Self {
            lattice: lattice.clone(),
            time_axis,
            spatial_axes,
            spatial_dims,
            sites,
            locations,
            up,
            down,
        })
    }

    fn spatial_coords_in(dims: &[usize; 3], mut j: usize) -> [usize; 3] {
        let mut s = [0; 3];
        for (si, &d) in s.iter_mut().zip(dims.iter()) {
            *si = j % d;
            j /= d;
        }
        s
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn time_axis(&self) -> usize {
        self.time_axis
    }

    /// Lattice direction of spatial direction `i`.
    #[inline]
    pub fn spatial_axis(&self, i: usize) -> usize {
        self.spatial_axes[i]
    }

    pub fn spatial_dims(&self) -> [usize; 3] {
        self.spatial_dims
    }

    /// Time extent.
    pub fn nt(&self) -> usize {
        self.lattice.dims()[self.time_axis]
    }

    /// Spatial volume, the length of every slice field.
    pub fn v3(&self) -> usize {
        self.up.len()
    }

    /// 4-D site of slice index `j` at time `t`.
    #[inline]
    pub fn site(&self, t: usize, j: usize) -> usize {
        self.sites[t * self.v3() + j]
    }

    /// `(t, j)` of a 4-D site.
    pub fn location(&self, site: usize) -> (usize, usize) {
        self.locations[site]
    }

    /// `(t, j)` of 4-D coordinates, or `None` if they lie outside the lattice.
    pub fn locate(&self, x: [usize; NDIM]) -> Option<(usize, usize)> {
        let dims = self.lattice.dims();
        if x.iter().zip(dims.iter()).any(|(&xi, &d)| xi >= d) {
            return None;
        }
        Some(self.locations[self.lattice.site(x)])
    }

    pub fn spatial_coords(&self, j: usize) -> [usize; 3] {
        Self::spatial_coords_in(&self.spatial_dims, j)
    }

    #[inline]
    pub fn up(&self, j: usize, i: usize) -> usize {
        self.up[j][i]
    }

    #[inline]
    pub fn down(&self, j: usize, i: usize) -> usize {
        self.down[j][i]
    }

    /// Slice reached from `t` by one step, wrapping at the ends.
    pub fn next_time(&self, t: usize, forward: bool) -> usize {
        let nt = self.nt();
        if forward {
            (t + 1) % nt
        } else {
            (t + nt - 1) % nt
        }
    }
}
