use nalgebra::Vector3;
use serde::Serialize;
use std::collections::HashMap;

/// Nonbonded parameters of one particle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NonbondedParticle {
    pub charge: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

impl NonbondedParticle {
    pub fn new(charge: f64, sigma: f64, epsilon: f64) -> Self {
        Self {
            charge,
            sigma,
            epsilon,
        }
    }
}

/// A pair whose nonbonded interaction uses explicit parameters instead of the
/// combined particle parameters. A zero charge product and well depth excludes
/// the pair entirely.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NonbondedException {
    pub atoms: [usize; 2],
    pub charge_product: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

impl NonbondedException {
    pub fn is_exclusion(&self) -> bool {
        self.charge_product == 0.0 && self.epsilon == 0.0
    }

    pub fn key(&self) -> (usize, usize) {
        ordered_pair(self.atoms[0], self.atoms[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HarmonicBond {
    pub atoms: [usize; 2],
    pub length: f64,
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HarmonicAngle {
    pub atoms: [usize; 3],
    pub angle: f64,
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodicTorsion {
    pub atoms: [usize; 4],
    pub periodicity: u32,
    pub phase: f64,
    pub k: f64,
}

/// A parametrized molecular system: named force terms over the atoms of a topology.
///
/// Particle `i` corresponds to atom `i` of the topology the system was built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParametrizedSystem {
    pub particles: Vec<NonbondedParticle>,
    pub exceptions: Vec<NonbondedException>,
    pub bonds: Vec<HarmonicBond>,
    pub angles: Vec<HarmonicAngle>,
    pub torsions: Vec<PeriodicTorsion>,
    pub box_vectors: Option<[Vector3<f64>; 3]>,
}

impl ParametrizedSystem {
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn particle(&self, index: usize) -> Option<&NonbondedParticle> {
        self.particles.get(index)
    }

    pub fn total_charge(&self) -> f64 {
        self.particles.iter().map(|p| p.charge).sum()
    }

    /// Exception index keyed by ordered atom pair.
    pub fn exception_lookup(&self) -> HashMap<(usize, usize), usize> {
        self.exceptions
            .iter()
            .enumerate()
            .map(|(index, exception)| (exception.key(), index))
            .collect()
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&HarmonicBond> {
        self.bonds
            .iter()
            .find(|bond| ordered_pair(bond.atoms[0], bond.atoms[1]) == ordered_pair(a, b))
    }

    /// The angle term `a-center-c` in either direction.
    pub fn angle_between(&self, a: usize, center: usize, c: usize) -> Option<&HarmonicAngle> {
        self.angles.iter().find(|angle| {
            let [x, y, z] = angle.atoms;
            y == center && ((x == a && z == c) || (x == c && z == a))
        })
    }
}

#[inline]
pub fn ordered_pair(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> ParametrizedSystem {
        ParametrizedSystem {
            particles: vec![
                NonbondedParticle::new(-0.834, 0.315, 0.636),
                NonbondedParticle::new(0.417, 0.0, 0.0),
                NonbondedParticle::new(0.417, 0.0, 0.0),
            ],
            exceptions: vec![
                NonbondedException {
                    atoms: [1, 0],
                    charge_product: 0.0,
                    sigma: 1.0,
                    epsilon: 0.0,
                },
                NonbondedException {
                    atoms: [0, 2],
                    charge_product: 0.0,
                    sigma: 1.0,
                    epsilon: 0.0,
                },
            ],
            bonds: vec![
                HarmonicBond {
                    atoms: [0, 1],
                    length: 0.09572,
                    k: 462750.4,
                },
                HarmonicBond {
                    atoms: [0, 2],
                    length: 0.09572,
                    k: 462750.4,
                },
            ],
            angles: vec![HarmonicAngle {
                atoms: [1, 0, 2],
                angle: 1.82421,
                k: 836.8,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn total_charge_sums_particle_charges() {
        assert!(water().total_charge().abs() < 1e-12);
    }

    #[test]
    fn exception_lookup_uses_ordered_pairs() {
        let system = water();
        let lookup = system.exception_lookup();
        assert_eq!(lookup.get(&(0, 1)), Some(&0));
        assert_eq!(lookup.get(&(0, 2)), Some(&1));
        assert!(system.exceptions[0].is_exclusion());
    }

    #[test]
    fn bonded_term_lookups_ignore_direction() {
        let system = water();
        assert!(system.bond_between(1, 0).is_some());
        assert!(system.bond_between(1, 2).is_none());
        assert!(system.angle_between(2, 0, 1).is_some());
        assert!(system.angle_between(0, 1, 2).is_none());
    }
}
