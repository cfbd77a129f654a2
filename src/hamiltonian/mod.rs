//! The coefficient-gated NRQCD Hamiltonian.
//!
//! [`HamiltonianParams`] is the per-propagator configuration; [`TermKind`]
//! is the ordered registry of operators the driver dispatches over.
pub(crate) mod terms;

use crate::direction::Direction;
use crate::error::{EvolutionError, Result};
use crate::lattice::NDIM;

pub use terms::{Scratch, TermContext};

/// Coefficients with magnitude at or below this are treated as absent.
pub const COEFFICIENT_TOLERANCE: f64 = 1e-12;

/// Number of Wilson coefficients, `c0..c11`.
pub const NUM_TERMS: usize = 12;

/// Every operator of the Hamiltonian, indexed by its coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// `-Δ/(2M)`, applied by the driver's substeps rather than the registry.
    Kinetic,
    /// `-(Δ)²/(8M³)`
    QuarticKinetic,
    /// `i/(8M²) Σ (∇·E - E·∇)`
    Darwin,
    /// `-1/(8M²) σ·(∇×E - E×∇)`
    SpinOrbit,
    /// `-1/(2M) σ·B`
    SigmaB,
    /// `Σ ∇⁴_i/(24M)`
    QuarticDerivative,
    /// `-(Δ)²/(16 n M²)`
    KineticStepCorrection,
    /// `-1/(8M³) {Δ, σ·B}`
    KineticSigmaBAnticommutator,
    /// `-3/(64M⁴) {Δ, σ·(∇×E - E×∇)}`
    QuarticSpinOrbit,
    /// `-1/(8M³) Σ E_i E_i`
    ElectricSquared,
    /// `-1/(8M³) Σ B_i B_i`
    MagneticSquared,
    /// `-(Δ)³/(16M⁵)`
    KineticCubed,
}

impl TermKind {
    pub const ALL: [TermKind; NUM_TERMS] = [
        TermKind::Kinetic,
        TermKind::QuarticKinetic,
        TermKind::Darwin,
        TermKind::SpinOrbit,
        TermKind::SigmaB,
        TermKind::QuarticDerivative,
        TermKind::KineticStepCorrection,
        TermKind::KineticSigmaBAnticommutator,
        TermKind::QuarticSpinOrbit,
        TermKind::ElectricSquared,
        TermKind::MagneticSquared,
        TermKind::KineticCubed,
    ];

    /// Index of the coefficient `c_k` that gates this term.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Terms that stage their outer Laplacian in the driver's spare buffer.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            TermKind::KineticSigmaBAnticommutator
                | TermKind::QuarticSpinOrbit
                | TermKind::KineticCubed
        )
    }

    /// Terms evaluated by the correction step, in registry order.
    pub fn corrections() -> impl Iterator<Item = TermKind> {
        Self::ALL.into_iter().skip(1)
    }
}

/// Everything that defines one propagator's Hamiltonian and time stepping.
#[derive(Clone, Debug, PartialEq)]
pub struct HamiltonianParams {
    /// Wilson coefficients `c0..c11`, indexed by [`TermKind::index`].
    pub coefficients: [f64; NUM_TERMS],
    /// Bare quark mass `M0` in lattice units.
    pub mass: f64,
    /// Kinetic substeps `n` on each side of the temporal link.
    pub substeps: usize,
    /// Tadpole factor `u0`; links are divided by it during evolution.
    pub tadpole: f64,
    pub time_axis: usize,
    pub direction: Direction,
    /// Split the correction into halves at both ends of every slice.
    pub symmetric: bool,
    /// Use next-nearest-neighbour derivatives and the improved field strength.
    pub improved: bool,
    /// Accumulate the correction straight into the ping-pong buffer when the
    /// active terms allow it.
    pub fused_correction: bool,
}

impl Default for HamiltonianParams {
    fn default() -> Self {
        let mut coefficients = [0.0; NUM_TERMS];
        coefficients[TermKind::Kinetic.index()] = 1.0;
        Self {
            coefficients,
            mass: 1.0,
            substeps: 1,
            tadpole: 1.0,
            time_axis: NDIM - 1,
            direction: Direction::Forward,
            symmetric: false,
            improved: false,
            fused_correction: false,
        }
    }
}

impl HamiltonianParams {
    pub fn coefficient(&self, kind: TermKind) -> f64 {
        self.coefficients[kind.index()]
    }

    pub fn with_coefficient(mut self, kind: TermKind, value: f64) -> Self {
        self.coefficients[kind.index()] = value;
        self
    }

    pub fn is_active(&self, kind: TermKind) -> bool {
        self.coefficient(kind).abs() > COEFFICIENT_TOLERANCE
    }

    /// Correction terms that will be evaluated.
    pub fn active_corrections(&self) -> impl Iterator<Item = TermKind> + '_ {
        TermKind::corrections().filter(move |&k| self.is_active(k))
    }

    pub fn has_correction(&self) -> bool {
        self.active_corrections().next().is_some()
    }

    /// Fusing needs the ping-pong buffer as accumulator, which composite
    /// terms already borrow as their spare.
    pub fn allows_fused_correction(&self) -> bool {
        self.active_corrections().all(|k| !k.is_composite())
    }

    /// Weight of each correction step: halves at both ends, or one whole.
    pub fn correction_factor(&self) -> f64 {
        if self.symmetric {
            0.5
        } else {
            1.0
        }
    }

    /// `c0 / (4 n M)`, the Laplacian weight of one kinetic substep.
    pub fn kinetic_weight(&self) -> f64 {
        self.coefficient(TermKind::Kinetic) / (4.0 * self.substeps as f64 * self.mass)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tadpole.is_finite() && self.tadpole > 0.0) {
            return Err(EvolutionError::InvalidTadpole(self.tadpole));
        }
        if self.substeps == 0 {
            return Err(EvolutionError::parameters("kinetic substeps must be at least 1"));
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(EvolutionError::parameters(format!(
                "mass must be positive and finite, got {}",
                self.mass
            )));
        }
        if self.time_axis >= NDIM {
            return Err(EvolutionError::parameters(format!(
                "time axis {} is not a lattice direction",
                self.time_axis
            )));
        }
        if let Some((k, c)) = self
            .coefficients
            .iter()
            .enumerate()
            .find(|(_, c)| !c.is_finite())
        {
            return Err(EvolutionError::parameters(format!("c{} is {}", k, c)));
        }
        Ok(())
    }
}
