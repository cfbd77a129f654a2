#![warn(clippy::all)]

mod derivatives;
mod direction;
mod error;
mod evolution;
mod field;
mod field_strength;
mod gauge;
mod hamiltonian;
mod lattice;
mod matrix;
mod parallel;
mod persisted;
mod source;
mod traits;

pub use derivatives::Stencil;
pub use direction::Direction;
pub use error::EvolutionError;
pub use evolution::{Evolver, Propagator, PropagatorRun};
pub use field::{Field, FieldValue, Pauli, Phase, SLOTS};
pub use field_strength::{FieldStrength, TwoHopLinks};
pub use gauge::{GaugeField, TadpoleGuard};
pub use hamiltonian::{HamiltonianParams, TermKind, COEFFICIENT_TOLERANCE, NUM_TERMS};
pub use lattice::{Lattice, SliceGeometry, NDIM};
pub use matrix::{ColorMatrix, C64};
pub use parallel::WorkerPool;
pub use persisted::PersistedField;
pub use source::{RngSession, SourceKind};
pub use traits::FieldSink;

pub const VERSION: &str = "0.1.0";

use std::sync::atomic::AtomicU32;
/// Worker threads for pools built without an explicit count; 0 means all cores.
pub static WORKER_THREADS: AtomicU32 = AtomicU32::new(0);
