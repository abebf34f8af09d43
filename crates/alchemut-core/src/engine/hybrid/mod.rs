//! # Hybrid Systems
//!
//! A hybrid system holds the atoms of both endpoints of a mutation at once:
//! mapped atoms appear once, unique-old and unique-new atoms coexist. Its
//! potential energy depends on an [`AlchemicalState`] and recovers the old
//! system at `lambda = 0` and the new system at `lambda = 1`, up to the valence
//! energy of the atoms that do not exist at that endpoint.
//!
//! Three variants are available through [`HybridVariant`]:
//!
//! - **Plain** mixes parameters linearly in `lambda` and softens the nonbonded
//!   interactions of unique atoms with softcore potentials.
//! - **Repartitioned** is valid at a single endstate only and supports solute
//!   tempering (REST) around the mutated residue at that endstate.
//! - **RestCapable** supports REST at any `lambda` and moves unique atoms out of
//!   the way by a "lifting" coordinate instead of softcore potentials.
//!
//! Interpolation settings ([`HybridSettings`]) are echoed verbatim on the built
//! system so that downstream samplers can reconstruct the schedule.

mod builder;
mod energy;

pub use builder::HybridBuilder;

use super::config::HybridSettings;
use super::transformation::AtomClass;
use crate::core::forcefield::system::{NonbondedException, NonbondedParticle};
use crate::core::models::Coordinates;
use crate::core::models::atom::Element;
use nalgebra::Point3;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum HybridError {
    #[error("Alchemical parameter {0} is outside [0, 1]")]
    InvalidLambda(f64),
    #[error("REST scale factor must be positive and finite, got {0}")]
    InvalidRestScale(f64),
    #[error("The {variant} hybrid system does not support REST scaling (requested {scale})")]
    RestScalingUnsupported { variant: &'static str, scale: f64 },
    #[error("Hybrid system is only valid at endstate {endstate}, requested lambda = {lambda}")]
    LambdaPinned { endstate: Endstate, lambda: f64 },
    #[error("Lifting distance must be positive, got {0}")]
    InvalidLifting(f64),
    #[error("Expected {expected} {side} positions, found {found}")]
    PositionCountMismatch {
        side: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Hybrid energy evaluation produced a non-finite {term} energy")]
    NonFinite { term: &'static str },
}

/// One of the two physical endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Endstate {
    Zero,
    One,
}

impl Endstate {
    pub const BOTH: [Endstate; 2] = [Endstate::Zero, Endstate::One];

    pub fn lambda(self) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

impl fmt::Display for Endstate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Flavor of hybrid system. Fields only exist on the variant they apply to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum HybridVariant {
    Plain,
    Repartitioned { endstate: Endstate },
    RestCapable { max_lifting: f64 },
}

impl HybridVariant {
    /// The REST-capable variant with the lifting distance from `settings`.
    pub fn rest_capable(settings: &HybridSettings) -> Self {
        Self::RestCapable {
            max_lifting: settings.w_lifting,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Repartitioned { .. } => "repartitioned",
            Self::RestCapable { .. } => "rest-capable",
        }
    }

    /// Endstates at which the system reproduces a physical endpoint.
    pub fn valid_endstates(&self) -> Vec<Endstate> {
        match self {
            Self::Repartitioned { endstate } => vec![*endstate],
            Self::Plain | Self::RestCapable { .. } => Endstate::BOTH.to_vec(),
        }
    }

    pub fn supports_rest(&self) -> bool {
        !matches!(self, Self::Plain)
    }
}

impl fmt::Display for HybridVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repartitioned { endstate } => write!(f, "repartitioned-endstate-{endstate}"),
            other => f.write_str(other.name()),
        }
    }
}

/// The knob that moves a hybrid system between its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AlchemicalParameter {
    /// Linear mixing coefficient in `[0, 1]`.
    Mixing,
    /// Mixing coefficient driving a fourth spatial coordinate of the unique
    /// atoms, from zero up to `max_distance` nm.
    Lifting { max_distance: f64 },
}

/// Point along the alchemical path, with an optional REST scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlchemicalState {
    pub lambda: f64,
    /// Scale of the REST region's interactions; 1 leaves them unchanged.
    pub rest_scale: f64,
}

impl AlchemicalState {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda,
            rest_scale: 1.0,
        }
    }

    pub fn at(endstate: Endstate) -> Self {
        Self::new(endstate.lambda())
    }

    pub fn with_rest_scale(self, rest_scale: f64) -> Self {
        Self { rest_scale, ..self }
    }
}

/// An atom of the merged topology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridAtom {
    pub name: String,
    #[serde(skip)]
    pub element: Element,
    pub residue_name: String,
    pub residue_number: String,
    pub chain_id: String,
    pub class: AtomClass,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
    /// Whether the atom belongs to the REST region.
    pub rest: bool,
}

/// Which endpoint system a valence term was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Only mapped atoms.
    Mapped,
    /// At least one unique-old atom.
    UniqueOld,
    /// At least one unique-new atom.
    UniqueNew,
}

/// Harmonic parameters `(equilibrium, k)` of a bond or angle.
pub(crate) type Harmonic = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HybridValenceTerm<const N: usize> {
    pub atoms: [usize; N],
    pub old: Option<Harmonic>,
    pub new: Option<Harmonic>,
    pub scope: Scope,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HybridTorsion {
    pub atoms: [usize; 4],
    pub periodicity: u32,
    pub phase: f64,
    pub k: f64,
    pub from_old: bool,
    pub scope: Scope,
}

/// Nonbonded parameters of an atom in each endpoint where it exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ParticlePair {
    pub old: Option<NonbondedParticle>,
    pub new: Option<NonbondedParticle>,
}

/// A combined system spanning both endpoints of one mutation.
#[derive(Debug, Clone)]
pub struct HybridSystem {
    variant: HybridVariant,
    settings: HybridSettings,
    atoms: Vec<HybridAtom>,
    positions: Coordinates,
    new_to_hybrid: Vec<usize>,
    particles: Vec<ParticlePair>,
    old_exceptions: HashMap<(usize, usize), NonbondedException>,
    new_exceptions: HashMap<(usize, usize), NonbondedException>,
    bonds: Vec<HybridValenceTerm<2>>,
    angles: Vec<HybridValenceTerm<3>>,
    torsions: Vec<HybridTorsion>,
}

impl HybridSystem {
    pub fn variant(&self) -> HybridVariant {
        self.variant
    }

    /// Interpolation settings the system was built with.
    pub fn settings(&self) -> &HybridSettings {
        &self.settings
    }

    pub fn alchemical_parameter(&self) -> AlchemicalParameter {
        match self.variant {
            HybridVariant::RestCapable { max_lifting } => AlchemicalParameter::Lifting {
                max_distance: max_lifting,
            },
            _ => AlchemicalParameter::Mixing,
        }
    }

    pub fn atoms(&self) -> &[HybridAtom] {
        &self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Hybrid coordinates: old positions for old atoms, proposed positions for unique-new atoms.
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Old atoms keep their index in the hybrid system.
    pub fn old_to_hybrid(&self, old: usize) -> Option<usize> {
        self.atoms
            .get(old)
            .filter(|a| a.old_index == Some(old))
            .map(|_| old)
    }

    pub fn new_to_hybrid(&self, new: usize) -> Option<usize> {
        self.new_to_hybrid.get(new).copied()
    }

    /// Hybrid indices of the REST region.
    pub fn rest_region(&self) -> Vec<usize> {
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| a.rest)
            .map(|(i, _)| i)
            .collect()
    }

    /// Coordinates of one endpoint's atoms, in that endpoint's atom order.
    pub fn endpoint_positions(&self, endstate: Endstate) -> Coordinates {
        let mut indexed: Vec<(usize, Point3<f64>)> = self
            .atoms
            .iter()
            .zip(&self.positions)
            .filter_map(|(atom, position)| {
                let index = match endstate {
                    Endstate::Zero => atom.old_index,
                    Endstate::One => atom.new_index,
                };
                index.map(|i| (i, *position))
            })
            .collect();
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, p)| p).collect()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn angle_count(&self) -> usize {
        self.angles.len()
    }

    pub fn torsion_count(&self) -> usize {
        self.torsions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_distinguish_repartitioned_endstates() {
        assert_eq!(HybridVariant::Plain.to_string(), "plain");
        let zero = HybridVariant::Repartitioned {
            endstate: Endstate::Zero,
        };
        assert_eq!(zero.to_string(), "repartitioned-endstate-0");
        assert_eq!(zero.valid_endstates(), vec![Endstate::Zero]);
        assert_eq!(HybridVariant::Plain.valid_endstates(), Endstate::BOTH.to_vec());
    }

    #[test]
    fn rest_capable_takes_lifting_from_settings() {
        let settings = HybridSettings {
            w_lifting: 0.45,
            ..HybridSettings::default()
        };
        let variant = HybridVariant::rest_capable(&settings);
        assert_eq!(variant, HybridVariant::RestCapable { max_lifting: 0.45 });
        assert!(variant.supports_rest());
        assert!(!HybridVariant::Plain.supports_rest());
    }

    #[test]
    fn states_default_to_unscaled_rest() {
        let state = AlchemicalState::at(Endstate::One);
        assert_eq!(state.lambda, 1.0);
        assert_eq!(state.rest_scale, 1.0);
        assert_eq!(state.with_rest_scale(0.5).rest_scale, 0.5);
    }
}
