//! Positions for the atoms that only exist in the new residue.
//!
//! Unique atoms are grown one at a time from internal coordinates: a bond
//! length, a bond angle and a torsion, each drawn from a discretized Boltzmann
//! distribution of the valence terms the atom shares with already placed atoms.
//! The same machinery scores the reverse move, yielding the log-probabilities
//! of both proposals and the valence energies that the hybrid endpoints need
//! to be compared with the real endpoints.

mod growth;

use super::config::GeometryConfig;
use super::transformation::MutationTransformation;
use crate::core::forcefield::energy::{EnergyError, EnergyEvaluator};
use crate::core::forcefield::potentials::thermodynamic_beta;
use crate::core::forcefield::system::ParametrizedSystem;
use crate::core::models::Coordinates;
use crate::core::models::system::MolecularTopology;
use crate::engine::utils::sampling::SamplingError;
use growth::{Growth, ring_atoms};
use nalgebra::Point3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, instrument};

const BOOKKEEPING_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Atom {atom} has no path of bonds to the placed atoms")]
    Disconnected { atom: usize },
    #[error("Atom {atom} lacks placed bond, angle or torsion reference atoms")]
    MissingReference { atom: usize },
    #[error("No bond term between atom {atom} and its reference atom {partner}")]
    MissingBondTerm { atom: usize, partner: usize },
    #[error("Reference atoms of atom {atom} are collinear")]
    DegenerateReferences { atom: usize },
    #[error("Expected {expected} old positions, found {found}")]
    PositionCountMismatch { expected: usize, found: usize },
    #[error(
        "{direction} growth energy {growth:.6} kT does not match the valence energy difference {expected:.6} kT"
    )]
    BookkeepingMismatch {
        direction: &'static str,
        growth: f64,
        expected: f64,
    },
    #[error("Sampling failed: {0}")]
    Sampling(#[from] SamplingError),
    #[error("Energy evaluation failed: {0}")]
    Energy(#[from] EnergyError),
}

/// An energy correction that is either computed or does not apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Correction {
    NotApplicable,
    Value(f64),
}

impl Correction {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::NotApplicable => None,
            Self::Value(value) => Some(value),
        }
    }

    /// The value, or zero where the correction does not apply.
    pub fn value_or_zero(self) -> f64 {
        self.value().unwrap_or(0.0)
    }

    pub fn is_applicable(self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => write!(f, "n/a"),
            Self::Value(value) => write!(f, "{value:.6}"),
        }
    }
}

/// Reduced valence energies of an endpoint after growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrowthEnergies {
    /// All valence terms.
    pub final_context: f64,
    /// Valence terms that involve no grown atom.
    pub atoms_with_positions: f64,
}

impl GrowthEnergies {
    /// Valence energy carried by the terms touching grown atoms.
    pub fn correction(&self) -> f64 {
        self.final_context - self.atoms_with_positions
    }
}

/// Result of a geometry proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryProposal {
    pub new_positions: Coordinates,
    /// Log-probability of the sampled unique-new coordinates.
    pub logp_forward: f64,
    /// Log-probability of proposing the existing unique-old coordinates.
    pub logp_reverse: f64,
    forward: Option<GrowthEnergies>,
    reverse: Option<GrowthEnergies>,
}

impl GeometryProposal {
    pub fn forward_energies(&self) -> Option<&GrowthEnergies> {
        self.forward.as_ref()
    }

    pub fn reverse_energies(&self) -> Option<&GrowthEnergies> {
        self.reverse.as_ref()
    }

    pub fn forward_final_context(&self) -> Correction {
        self.forward.map_or(Correction::NotApplicable, |e| Correction::Value(e.final_context))
    }

    pub fn forward_atoms_with_positions(&self) -> Correction {
        self.forward
            .map_or(Correction::NotApplicable, |e| Correction::Value(e.atoms_with_positions))
    }

    pub fn reverse_final_context(&self) -> Correction {
        self.reverse.map_or(Correction::NotApplicable, |e| Correction::Value(e.final_context))
    }

    pub fn reverse_atoms_with_positions(&self) -> Correction {
        self.reverse
            .map_or(Correction::NotApplicable, |e| Correction::Value(e.atoms_with_positions))
    }

    /// Reduced valence energy gained by the new endpoint for its unique atoms.
    pub fn added_valence_energy(&self) -> Correction {
        self.forward.map_or(Correction::NotApplicable, |e| Correction::Value(e.correction()))
    }

    /// Reduced valence energy carried by the unique atoms of the old endpoint.
    pub fn subtracted_valence_energy(&self) -> Correction {
        self.reverse.map_or(Correction::NotApplicable, |e| Correction::Value(e.correction()))
    }
}

/// Proposes new-endpoint coordinates by growing the unique-new atoms.
#[derive(Debug, Clone)]
pub struct GeometryEngine {
    config: GeometryConfig,
    beta: f64,
}

impl GeometryEngine {
    pub fn new(config: GeometryConfig, temperature: f64) -> Self {
        Self {
            config,
            beta: thermodynamic_beta(temperature),
        }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Proposes coordinates using the configured seed, or entropy if none is set.
    pub fn propose(
        &self,
        transformation: &MutationTransformation,
        old_positions: &[Point3<f64>],
        evaluator: &dyn EnergyEvaluator,
    ) -> Result<GeometryProposal, GeometryError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.propose_with_rng(transformation, old_positions, evaluator, &mut rng)
    }

    #[instrument(skip_all, name = "geometry_proposal")]
    pub fn propose_with_rng(
        &self,
        transformation: &MutationTransformation,
        old_positions: &[Point3<f64>],
        evaluator: &dyn EnergyEvaluator,
        rng: &mut StdRng,
    ) -> Result<GeometryProposal, GeometryError> {
        let map = transformation.atom_map();
        if old_positions.len() != map.old_count() {
            return Err(GeometryError::PositionCountMismatch {
                expected: map.old_count(),
                found: old_positions.len(),
            });
        }

        let mut new_positions = vec![Point3::origin(); map.new_count()];
        for (old, new) in map.mapped_pairs() {
            new_positions[new] = old_positions[old];
        }
        let check = !is_ring_mutation(transformation);
        if !check {
            debug!("Ring residue involved; growth bookkeeping check skipped.");
        }

        let (logp_forward, forward) = if map.unique_new().is_empty() {
            (0.0, None)
        } else {
            let rings = ring_atoms(transformation.new_topology(), transformation.new_residue_atoms());
            let growth = Growth::new(
                transformation.new_system(),
                transformation.new_topology(),
                map.unique_new(),
                &rings,
                &self.config,
                self.beta,
            );
            let result = growth.run(&mut new_positions, Some(rng))?;
            let energies = self.growth_energies(
                evaluator,
                transformation.new_system(),
                &new_positions,
                map.unique_new(),
            )?;
            if check {
                verify("Forward", result.reduced_energy, &energies)?;
            }
            (result.log_probability, Some(energies))
        };

        let (logp_reverse, reverse) = if map.unique_old().is_empty() {
            (0.0, None)
        } else {
            let rings = ring_atoms(transformation.old_topology(), transformation.old_residue_atoms());
            let growth = Growth::new(
                transformation.old_system(),
                transformation.old_topology(),
                map.unique_old(),
                &rings,
                &self.config,
                self.beta,
            );
            let mut scored = old_positions.to_vec();
            let result = growth.run::<StdRng>(&mut scored, None)?;
            let energies = self.growth_energies(
                evaluator,
                transformation.old_system(),
                old_positions,
                map.unique_old(),
            )?;
            if check {
                verify("Reverse", result.reduced_energy, &energies)?;
            }
            (result.log_probability, Some(energies))
        };

        info!(
            grown = map.unique_new().len(),
            removed = map.unique_old().len(),
            logp_forward,
            logp_reverse,
            "Proposed new coordinates."
        );
        Ok(GeometryProposal {
            new_positions,
            logp_forward,
            logp_reverse,
            forward,
            reverse,
        })
    }

    fn growth_energies(
        &self,
        evaluator: &dyn EnergyEvaluator,
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
        unique: &BTreeSet<usize>,
    ) -> Result<GrowthEnergies, GeometryError> {
        let all = evaluator.valence_energy(system, positions, &|_| true)?;
        let placed = evaluator.valence_energy(system, positions, &|atoms| {
            atoms.iter().all(|a| !unique.contains(a))
        })?;
        Ok(GrowthEnergies {
            final_context: all.reduced(self.beta),
            atoms_with_positions: placed.reduced(self.beta),
        })
    }
}

fn verify(direction: &'static str, growth: f64, energies: &GrowthEnergies) -> Result<(), GeometryError> {
    let expected = energies.correction();
    if (growth - expected).abs() > BOOKKEEPING_TOLERANCE * expected.abs().max(1.0) {
        return Err(GeometryError::BookkeepingMismatch {
            direction,
            growth,
            expected,
        });
    }
    Ok(())
}

fn has_ring_sidechain(topology: &MolecularTopology, atoms: &[usize]) -> bool {
    let Some(residue) = atoms.first().and_then(|&i| topology.residue_of(i)) else {
        return false;
    };
    residue.amino_acid().is_some_and(|aa| aa.has_ring_sidechain())
}

fn is_ring_mutation(transformation: &MutationTransformation) -> bool {
    has_ring_sidechain(transformation.old_topology(), transformation.old_residue_atoms())
        || has_ring_sidechain(transformation.new_topology(), transformation.new_residue_atoms())
}
