use super::GeometryError;
use crate::core::forcefield::potentials;
use crate::core::forcefield::system::ParametrizedSystem;
use crate::core::models::system::MolecularTopology;
use crate::core::utils::geometry::{angle, dihedral, distance, place_from_internal};
use crate::engine::config::GeometryConfig;
use crate::engine::utils::sampling::BinnedDistribution;
use nalgebra::Point3;
use rand::Rng;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::f64::consts::PI;
use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const MIN_BOND_LENGTH: f64 = 1e-3;
const BOND_WIDTH_IN_SIGMAS: f64 = 6.0;

/// Indices of the valence terms an atom takes part in.
#[derive(Debug, Default, Clone)]
struct AtomTerms {
    bonds: Vec<usize>,
    angles: Vec<usize>,
    torsions: Vec<usize>,
    exceptions: Vec<usize>,
    ring_torsions: Vec<[usize; 4]>,
}

/// Reference atoms used to place an atom from internal coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct References {
    pub bond: usize,
    pub angle: usize,
    pub torsion: usize,
}

/// Sorts candidates heavy atoms first, then by index.
fn by_preference(topology: &MolecularTopology, mut atoms: Vec<usize>) -> Vec<usize> {
    atoms.sort_by_key(|&i| (topology.atom(i).is_some_and(|a| a.element.is_hydrogen()), i));
    atoms
}

/// Order in which unique atoms are grown: outward from the placed scaffold,
/// heavy atoms before hydrogens, lowest index first.
pub(crate) fn growth_order(
    topology: &MolecularTopology,
    unique: &BTreeSet<usize>,
) -> Result<Vec<usize>, GeometryError> {
    let mut placed: Vec<bool> = (0..topology.atom_count()).map(|i| !unique.contains(&i)).collect();
    let mut order = Vec::with_capacity(unique.len());
    while order.len() < unique.len() {
        let frontier: Vec<usize> = unique
            .iter()
            .copied()
            .filter(|&i| !placed[i] && topology.neighbors(i).iter().any(|&n| placed[n]))
            .collect();
        let Some(&next) = by_preference(topology, frontier).first() else {
            let stranded = unique.iter().copied().find(|&i| !placed[i]).unwrap_or_default();
            return Err(GeometryError::Disconnected { atom: stranded });
        };
        placed[next] = true;
        order.push(next);
    }
    Ok(order)
}

/// Chooses the bond, angle and torsion partners of `atom` among placed atoms.
pub(crate) fn references(
    topology: &MolecularTopology,
    atom: usize,
    placed: &[bool],
) -> Result<References, GeometryError> {
    let placed_neighbors = |of: usize, exclude: &[usize]| {
        let candidates = topology
            .neighbors(of)
            .iter()
            .copied()
            .filter(|&n| placed[n] && !exclude.contains(&n))
            .collect();
        by_preference(topology, candidates)
    };

    let missing = || GeometryError::MissingReference { atom };
    let bond = *placed_neighbors(atom, &[]).first().ok_or_else(missing)?;
    let angle = *placed_neighbors(bond, &[atom]).first().ok_or_else(missing)?;
    let torsion = placed_neighbors(angle, &[bond, atom])
        .first()
        .copied()
        .or_else(|| placed_neighbors(bond, &[angle, atom]).first().copied())
        .ok_or_else(missing)?;
    Ok(References {
        bond,
        angle,
        torsion,
    })
}

/// Atoms of `residue_atoms` that lie on a cycle of the bond graph.
pub(crate) fn ring_atoms(topology: &MolecularTopology, residue_atoms: &[usize]) -> BTreeSet<usize> {
    let members: BTreeSet<usize> = residue_atoms.iter().copied().collect();
    let mut rings = BTreeSet::new();
    for bond in topology.bonds() {
        let (u, v) = (bond.atom1, bond.atom2);
        if !members.contains(&u) || !members.contains(&v) {
            continue;
        }
        let mut seen = BTreeSet::from([u]);
        let mut queue = VecDeque::from([u]);
        let mut connected = false;
        while let Some(current) = queue.pop_front() {
            for &next in topology.neighbors(current) {
                if !members.contains(&next) || (current == u && next == v) || seen.contains(&next) {
                    continue;
                }
                if next == v {
                    connected = true;
                    break;
                }
                seen.insert(next);
                queue.push_back(next);
            }
            if connected {
                break;
            }
        }
        if connected {
            rings.insert(u);
            rings.insert(v);
        }
    }
    rings
}

/// Outcome of growing the unique atoms of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GrowthResult {
    pub log_probability: f64,
    /// Sum of the reduced valence energies added at each step, bias excluded.
    pub reduced_energy: f64,
}

/// Sequential internal-coordinate growth of the unique atoms of one endpoint.
pub(crate) struct Growth<'a> {
    system: &'a ParametrizedSystem,
    topology: &'a MolecularTopology,
    unique: &'a BTreeSet<usize>,
    config: &'a GeometryConfig,
    beta: f64,
    terms: HashMap<usize, AtomTerms>,
}

impl<'a> Growth<'a> {
    pub fn new(
        system: &'a ParametrizedSystem,
        topology: &'a MolecularTopology,
        unique: &'a BTreeSet<usize>,
        ring_atoms: &BTreeSet<usize>,
        config: &'a GeometryConfig,
        beta: f64,
    ) -> Self {
        let mut terms: HashMap<usize, AtomTerms> =
            unique.iter().map(|&i| (i, AtomTerms::default())).collect();
        let mut record = |atoms: &[usize], push: &mut dyn FnMut(&mut AtomTerms)| {
            for atom in atoms {
                if let Some(entry) = terms.get_mut(atom) {
                    push(entry);
                }
            }
        };
        for (index, term) in system.bonds.iter().enumerate() {
            record(&term.atoms, &mut |t| t.bonds.push(index));
        }
        for (index, term) in system.angles.iter().enumerate() {
            record(&term.atoms, &mut |t| t.angles.push(index));
        }
        let mut biased: BTreeSet<[usize; 4]> = BTreeSet::new();
        for (index, term) in system.torsions.iter().enumerate() {
            record(&term.atoms, &mut |t| t.torsions.push(index));
            if term.atoms.iter().all(|a| ring_atoms.contains(a)) {
                biased.insert(term.atoms);
            }
        }
        for (index, exception) in system.exceptions.iter().enumerate() {
            if !exception.is_exclusion() {
                record(&exception.atoms, &mut |t| t.exceptions.push(index));
            }
        }
        for quad in biased {
            record(&quad, &mut |t| t.ring_torsions.push(quad));
        }
        Self {
            system,
            topology,
            unique,
            config,
            beta,
            terms,
        }
    }

    /// Valence energy of the terms containing `atom` whose other atoms are placed,
    /// with `atom` at `candidate`. The second value is the ring bias.
    fn step_energy(
        &self,
        positions: &[Point3<f64>],
        placed: &[bool],
        atom: usize,
        candidate: &Point3<f64>,
    ) -> (f64, f64) {
        let Some(terms) = self.terms.get(&atom) else {
            return (0.0, 0.0);
        };
        let at = |i: usize| if i == atom { candidate } else { &positions[i] };
        let ready = |atoms: &[usize]| atoms.iter().all(|&i| i == atom || placed[i]);

        let mut energy = 0.0;
        for &index in &terms.bonds {
            let term = &self.system.bonds[index];
            if ready(&term.atoms) {
                let [i, j] = term.atoms;
                energy += potentials::harmonic(distance(at(i), at(j)), term.length, term.k);
            }
        }
        for &index in &terms.angles {
            let term = &self.system.angles[index];
            if ready(&term.atoms) {
                let [i, j, k] = term.atoms;
                energy += potentials::harmonic(angle(at(i), at(j), at(k)), term.angle, term.k);
            }
        }
        for &index in &terms.torsions {
            let term = &self.system.torsions[index];
            if ready(&term.atoms) {
                let [i, j, k, l] = term.atoms;
                let phi = dihedral(at(i), at(j), at(k), at(l));
                energy += potentials::periodic_torsion(phi, term.periodicity, term.phase, term.k);
            }
        }
        for &index in &terms.exceptions {
            let exception = &self.system.exceptions[index];
            if ready(&exception.atoms) {
                let [i, j] = exception.atoms;
                let r = distance(at(i), at(j));
                energy += potentials::lennard_jones(r, exception.sigma, exception.epsilon)
                    + potentials::coulomb(r, exception.charge_product);
            }
        }

        let mut bias = 0.0;
        for quad in &terms.ring_torsions {
            if ready(quad) {
                let [i, j, k, l] = *quad;
                let phi = dihedral(at(i), at(j), at(k), at(l));
                bias += self.config.ring_bias_force_constant * (1.0 - (2.0 * phi).cos());
            }
        }
        (energy, bias)
    }

    fn bond_distribution(&self, length: f64, k: f64) -> Result<BinnedDistribution, GeometryError> {
        let sigma = (1.0 / (self.beta * k)).sqrt();
        let lower = (length - BOND_WIDTH_IN_SIGMAS * sigma).max(MIN_BOND_LENGTH);
        let upper = length + BOND_WIDTH_IN_SIGMAS * sigma;
        let energies: Vec<f64> = BinnedDistribution::bin_centers(lower, upper, self.config.bond_divisions)?
            .into_iter()
            .map(|r| self.beta * potentials::harmonic(r, length, k) - 2.0 * r.ln())
            .collect();
        Ok(BinnedDistribution::from_reduced_energies(lower, upper, &energies)?)
    }

    fn angle_distribution(&self, term: Option<(f64, f64)>) -> Result<BinnedDistribution, GeometryError> {
        let energies: Vec<f64> = BinnedDistribution::bin_centers(0.0, PI, self.config.angle_divisions)?
            .into_iter()
            .map(|theta| {
                let harmonic = term.map_or(0.0, |(theta0, k)| {
                    self.beta * potentials::harmonic(theta, theta0, k)
                });
                harmonic - theta.sin().ln()
            })
            .collect();
        Ok(BinnedDistribution::from_reduced_energies(0.0, PI, &energies)?)
    }

    fn torsion_distribution(
        &self,
        positions: &[Point3<f64>],
        placed: &[bool],
        atom: usize,
        refs: References,
        r: f64,
        theta: f64,
    ) -> Result<BinnedDistribution, GeometryError> {
        let centers = BinnedDistribution::bin_centers(-PI, PI, self.config.torsion_divisions)?;
        let reduced = |phi: &f64| -> Result<f64, GeometryError> {
            let candidate = place_from_internal(
                &positions[refs.bond],
                &positions[refs.angle],
                &positions[refs.torsion],
                r,
                theta,
                *phi,
            )
            .ok_or(GeometryError::DegenerateReferences { atom })?;
            let (energy, bias) = self.step_energy(positions, placed, atom, &candidate);
            Ok(self.beta * (energy + bias))
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = centers.iter();

        #[cfg(feature = "parallel")]
        let iterator = centers.par_iter();

        let energies = iterator.map(reduced).collect::<Result<Vec<f64>, _>>()?;
        Ok(BinnedDistribution::from_reduced_energies(-PI, PI, &energies)?)
    }

    /// Grows every unique atom in order.
    ///
    /// With an RNG the atoms are placed by sampling and `positions` is updated;
    /// without one the existing positions of the unique atoms are scored.
    pub fn run<R: Rng>(
        &self,
        positions: &mut [Point3<f64>],
        mut rng: Option<&mut R>,
    ) -> Result<GrowthResult, GeometryError> {
        let order = growth_order(self.topology, self.unique)?;
        let mut placed: Vec<bool> = (0..positions.len()).map(|i| !self.unique.contains(&i)).collect();
        let mut log_probability = 0.0;
        let mut reduced_energy = 0.0;

        for atom in order {
            let refs = references(self.topology, atom, &placed)?;
            let bond = self
                .system
                .bond_between(atom, refs.bond)
                .ok_or(GeometryError::MissingBondTerm {
                    atom,
                    partner: refs.bond,
                })?;
            let angle_term = self
                .system
                .angle_between(atom, refs.bond, refs.angle)
                .map(|term| (term.angle, term.k));

            let bond_dist = self.bond_distribution(bond.length, bond.k)?;
            let angle_dist = self.angle_distribution(angle_term)?;

            let (r, theta) = match rng.as_deref_mut() {
                Some(rng) => {
                    let r_bin = bond_dist.sample(rng)?;
                    let theta_bin = angle_dist.sample(rng)?;
                    log_probability += bond_dist.log_probability(r_bin) + angle_dist.log_probability(theta_bin);
                    (bond_dist.center(r_bin), angle_dist.center(theta_bin))
                }
                None => {
                    let r = distance(&positions[atom], &positions[refs.bond]);
                    let theta = angle(&positions[atom], &positions[refs.bond], &positions[refs.angle]);
                    log_probability += bond_dist.log_probability(bond_dist.bin_of(r))
                        + angle_dist.log_probability(angle_dist.bin_of(theta));
                    (r, theta)
                }
            };

            let torsion_dist = self.torsion_distribution(positions, &placed, atom, refs, r, theta)?;
            match rng.as_deref_mut() {
                Some(rng) => {
                    let phi_bin = torsion_dist.sample(rng)?;
                    log_probability += torsion_dist.log_probability(phi_bin);
                    positions[atom] = place_from_internal(
                        &positions[refs.bond],
                        &positions[refs.angle],
                        &positions[refs.torsion],
                        r,
                        theta,
                        torsion_dist.center(phi_bin),
                    )
                    .ok_or(GeometryError::DegenerateReferences { atom })?;
                }
                None => {
                    let phi = dihedral(
                        &positions[refs.torsion],
                        &positions[refs.angle],
                        &positions[refs.bond],
                        &positions[atom],
                    );
                    log_probability += torsion_dist.log_probability(torsion_dist.bin_of(phi));
                }
            }

            let (energy, _) = self.step_energy(positions, &placed, atom, &positions[atom]);
            reduced_energy += self.beta * energy;
            placed[atom] = true;
            trace!(atom, r, theta, log_probability, "Grew atom.");
        }

        Ok(GrowthResult {
            log_probability,
            reduced_energy,
        })
    }
}
