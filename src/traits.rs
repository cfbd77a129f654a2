use crate::field::Field;

/// Destination of an evolved propagator, one time-slice at a time.
pub trait FieldSink<const N: usize> {
    /// Returns `(time extent, spatial volume)` this sink was sized for.
    ///
    /// The driver checks it against the lattice before any evolution starts,
    /// so [`FieldSink::write_slice`] never sees a field of the wrong length.
    fn shape(&self) -> (usize, usize);

    /// Stores the field of time-slice `t`.
    ///
    /// # Parameters
    /// * `t` - Time coordinate along the propagator's time axis
    /// * `field` - Values indexed by slice-local site
    ///
    /// Slices arrive in evolution order starting at the source time, and each
    /// slice is written exactly once per propagator.
    fn write_slice(&mut self, t: usize, field: &Field<N>);
}
