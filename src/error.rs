//! Failures detected before any time-slice work starts.
//!
//! Once a batch is running no per-site step can fail, so every variant here
//! is raised during validation, with the gauge links still untouched.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvolutionError {
    /// Propagators of one batch disagree on the tadpole factor.
    #[error("tadpole factors differ within a batch: {first} vs {other}")]
    TadpoleMismatch { first: f64, other: f64 },

    #[error("tadpole factor must be positive and finite, got {0}")]
    InvalidTadpole(f64),

    #[error("no gauge field supplied")]
    MissingGauge,

    #[error("gauge field holds {actual} sites, lattice has {expected}")]
    GaugeVolumeMismatch { expected: usize, actual: usize },

    #[error("invalid Hamiltonian parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid lattice: {0}")]
    InvalidLattice(String),

    /// The output sink cannot hold `(time extent, spatial volume)` slices.
    #[error("output sink has shape {actual:?}, expected {expected:?}")]
    OutputShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// The random generator is held by another session.
    #[error("random generator is already in use")]
    RngUnavailable,

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

impl EvolutionError {
    pub fn parameters(message: impl Into<String>) -> Self {
        EvolutionError::InvalidParameters(message.into())
    }

    pub fn lattice(message: impl Into<String>) -> Self {
        EvolutionError::InvalidLattice(message.into())
    }
}

pub type Result<T, E = EvolutionError> = std::result::Result<T, E>;
