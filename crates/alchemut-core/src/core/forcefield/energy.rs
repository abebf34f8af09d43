use super::potentials;
use super::system::ParametrizedSystem;
use super::term::EnergyBreakdown;
use crate::core::utils::geometry::{angle, dihedral, distance};
use nalgebra::Point3;
use std::collections::HashSet;
use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error, PartialEq)]
pub enum EnergyError {
    #[error("System has {expected} particles but {found} positions were given")]
    PositionCountMismatch { expected: usize, found: usize },
    #[error("Energy evaluation produced a non-finite {term} energy")]
    NonFinite { term: &'static str },
}

/// Evaluates the potential energy of a parametrized system.
///
/// This is the seam to an external simulation engine; [`ReferenceEvaluator`] is
/// the in-crate implementation.
pub trait EnergyEvaluator {
    /// Total potential energy, split by force term.
    fn evaluate(
        &self,
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
    ) -> Result<EnergyBreakdown, EnergyError>;

    /// Energy of the valence terms (bonds, angles, torsions and 1-4 exceptions)
    /// whose atoms all satisfy `include`.
    ///
    /// Positions of atoms rejected by `include` are never read.
    fn valence_energy(
        &self,
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
        include: &dyn Fn(&[usize]) -> bool,
    ) -> Result<EnergyBreakdown, EnergyError>;
}

/// Direct-space, cutoff-free evaluation of every term.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEvaluator;

impl ReferenceEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn check_positions(system: &ParametrizedSystem, positions: &[Point3<f64>]) -> Result<(), EnergyError> {
        if system.particle_count() != positions.len() {
            return Err(EnergyError::PositionCountMismatch {
                expected: system.particle_count(),
                found: positions.len(),
            });
        }
        Ok(())
    }

    fn pairwise_nonbonded(system: &ParametrizedSystem, positions: &[Point3<f64>]) -> f64 {
        let excepted: HashSet<(usize, usize)> =
            system.exceptions.iter().map(|exception| exception.key()).collect();
        let n = system.particle_count();

        let row_energy = |i: usize| -> f64 {
            let pi = &system.particles[i];
            let mut energy = 0.0;
            for j in (i + 1)..n {
                if excepted.contains(&(i, j)) {
                    continue;
                }
                let pj = &system.particles[j];
                let r = distance(&positions[i], &positions[j]);
                energy += potentials::lennard_jones(
                    r,
                    potentials::combine_sigma(pi.sigma, pj.sigma),
                    potentials::combine_epsilon(pi.epsilon, pj.epsilon),
                );
                energy += potentials::coulomb(r, pi.charge * pj.charge);
            }
            energy
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..n;

        #[cfg(feature = "parallel")]
        let iterator = (0..n).into_par_iter();

        iterator.map(row_energy).sum()
    }

    fn exception_energy(
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
        include: &dyn Fn(&[usize]) -> bool,
    ) -> f64 {
        system
            .exceptions
            .iter()
            .filter(|exception| !exception.is_exclusion() && include(&exception.atoms[..]))
            .map(|exception| {
                let [i, j] = exception.atoms;
                let r = distance(&positions[i], &positions[j]);
                potentials::lennard_jones(r, exception.sigma, exception.epsilon)
                    + potentials::coulomb(r, exception.charge_product)
            })
            .sum()
    }

    fn bonded_energy(
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
        include: &dyn Fn(&[usize]) -> bool,
    ) -> EnergyBreakdown {
        let bond = system
            .bonds
            .iter()
            .filter(|term| include(&term.atoms[..]))
            .map(|term| {
                let [i, j] = term.atoms;
                potentials::harmonic(distance(&positions[i], &positions[j]), term.length, term.k)
            })
            .sum();
        let angle_energy = system
            .angles
            .iter()
            .filter(|term| include(&term.atoms[..]))
            .map(|term| {
                let [i, j, k] = term.atoms;
                potentials::harmonic(angle(&positions[i], &positions[j], &positions[k]), term.angle, term.k)
            })
            .sum();
        let torsion = system
            .torsions
            .iter()
            .filter(|term| include(&term.atoms[..]))
            .map(|term| {
                let [i, j, k, l] = term.atoms;
                let phi = dihedral(&positions[i], &positions[j], &positions[k], &positions[l]);
                potentials::periodic_torsion(phi, term.periodicity, term.phase, term.k)
            })
            .sum();
        EnergyBreakdown::new(bond, angle_energy, torsion, 0.0)
    }
}

fn ensure_finite(energy: EnergyBreakdown) -> Result<EnergyBreakdown, EnergyError> {
    let checks = [
        ("bond", energy.bond),
        ("angle", energy.angle),
        ("torsion", energy.torsion),
        ("nonbonded", energy.nonbonded),
    ];
    for (term, value) in checks {
        if !value.is_finite() {
            return Err(EnergyError::NonFinite { term });
        }
    }
    Ok(energy)
}

impl EnergyEvaluator for ReferenceEvaluator {
    fn evaluate(
        &self,
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
    ) -> Result<EnergyBreakdown, EnergyError> {
        Self::check_positions(system, positions)?;
        let all = |_: &[usize]| true;
        let mut energy = Self::bonded_energy(system, positions, &all);
        energy.nonbonded = Self::pairwise_nonbonded(system, positions)
            + Self::exception_energy(system, positions, &all);
        ensure_finite(energy)
    }

    fn valence_energy(
        &self,
        system: &ParametrizedSystem,
        positions: &[Point3<f64>],
        include: &dyn Fn(&[usize]) -> bool,
    ) -> Result<EnergyBreakdown, EnergyError> {
        Self::check_positions(system, positions)?;
        let mut energy = Self::bonded_energy(system, positions, include);
        energy.nonbonded = Self::exception_energy(system, positions, include);
        ensure_finite(energy)
    }
}
