use super::{
    HybridAtom, HybridError, HybridSystem, HybridTorsion, HybridValenceTerm, HybridVariant, ParticlePair, Scope,
};
use crate::core::forcefield::system::{NonbondedException, ordered_pair};
use crate::core::models::system::MolecularTopology;
use crate::engine::config::HybridSettings;
use crate::engine::transformation::{AtomClass, MutationTransformation};
use crate::engine::utils::neighbors::ReferenceCloud;
use nalgebra::Point3;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, instrument};

/// Assembles hybrid systems from one transformation and its two coordinate sets.
///
/// Any number of variants can be built from the same builder; the
/// transformation is only read.
pub struct HybridBuilder<'a> {
    transformation: &'a MutationTransformation,
    old_positions: &'a [Point3<f64>],
    new_positions: &'a [Point3<f64>],
    settings: &'a HybridSettings,
}

impl<'a> HybridBuilder<'a> {
    pub fn new(
        transformation: &'a MutationTransformation,
        old_positions: &'a [Point3<f64>],
        new_positions: &'a [Point3<f64>],
        settings: &'a HybridSettings,
    ) -> Result<Self, HybridError> {
        let map = transformation.atom_map();
        for (side, expected, found) in [
            ("old", map.old_count(), old_positions.len()),
            ("new", map.new_count(), new_positions.len()),
        ] {
            if expected != found {
                return Err(HybridError::PositionCountMismatch { side, expected, found });
            }
        }
        Ok(Self {
            transformation,
            old_positions,
            new_positions,
            settings,
        })
    }

    #[instrument(skip_all, name = "hybrid_build", fields(variant = %variant))]
    pub fn build(&self, variant: HybridVariant) -> Result<HybridSystem, HybridError> {
        if let HybridVariant::RestCapable { max_lifting } = variant {
            if !(max_lifting > 0.0 && max_lifting.is_finite()) {
                return Err(HybridError::InvalidLifting(max_lifting));
            }
        }

        let t = self.transformation;
        let map = t.atom_map();
        let old_count = map.old_count();

        let mut new_to_hybrid = vec![0; map.new_count()];
        for (old, new) in map.mapped_pairs() {
            new_to_hybrid[new] = old;
        }
        for (offset, &new) in map.unique_new().iter().enumerate() {
            new_to_hybrid[new] = old_count + offset;
        }

        let mut atoms = Vec::with_capacity(old_count + map.unique_new().len());
        let mut positions = Vec::with_capacity(atoms.capacity());
        for old in 0..old_count {
            let class = map.class_of_old(old).unwrap_or(AtomClass::UniqueOld);
            atoms.push(describe(t.old_topology(), old, class, Some(old), map.old_to_new(old)));
            positions.push(self.old_positions[old]);
        }
        for &new in map.unique_new() {
            atoms.push(describe(t.new_topology(), new, AtomClass::UniqueNew, None, Some(new)));
            positions.push(self.new_positions[new]);
        }

        let old_system = t.old_system();
        let new_system = t.new_system();
        let mut particles: Vec<ParticlePair> = (0..old_count)
            .map(|old| ParticlePair {
                old: old_system.particle(old).copied(),
                new: map.old_to_new(old).and_then(|new| new_system.particle(new).copied()),
            })
            .collect();
        particles.extend(map.unique_new().iter().map(|&new| ParticlePair {
            old: None,
            new: new_system.particle(new).copied(),
        }));

        let scope_of = |hybrid: &[usize]| {
            if hybrid.iter().any(|&i| atoms[i].class == AtomClass::UniqueOld) {
                Scope::UniqueOld
            } else if hybrid.iter().any(|&i| atoms[i].class == AtomClass::UniqueNew) {
                Scope::UniqueNew
            } else {
                Scope::Mapped
            }
        };
        let to_new = |atoms: &[usize]| -> Vec<usize> { atoms.iter().map(|&j| new_to_hybrid[j]).collect() };

        let remap = |exception: &NonbondedException, atoms: [usize; 2]| NonbondedException {
            atoms: [atoms[0].min(atoms[1]), atoms[0].max(atoms[1])],
            ..*exception
        };
        let old_exceptions: HashMap<(usize, usize), NonbondedException> = old_system
            .exceptions
            .iter()
            .map(|e| (e.key(), remap(e, e.atoms)))
            .collect();
        let new_exceptions: HashMap<(usize, usize), NonbondedException> = new_system
            .exceptions
            .iter()
            .map(|e| {
                let [a, b] = e.atoms;
                let hybrid = [new_to_hybrid[a], new_to_hybrid[b]];
                (ordered_pair(hybrid[0], hybrid[1]), remap(e, hybrid))
            })
            .collect();

        let mut bonds: BTreeMap<(usize, usize), HybridValenceTerm<2>> = BTreeMap::new();
        for term in &old_system.bonds {
            let key = ordered_pair(term.atoms[0], term.atoms[1]);
            bonds
                .entry(key)
                .or_insert_with(|| HybridValenceTerm {
                    atoms: [key.0, key.1],
                    old: None,
                    new: None,
                    scope: scope_of(&term.atoms),
                })
                .old = Some((term.length, term.k));
        }
        for term in &new_system.bonds {
            let hybrid = to_new(&term.atoms);
            let key = ordered_pair(hybrid[0], hybrid[1]);
            bonds
                .entry(key)
                .or_insert_with(|| HybridValenceTerm {
                    atoms: [key.0, key.1],
                    old: None,
                    new: None,
                    scope: scope_of(&hybrid),
                })
                .new = Some((term.length, term.k));
        }

        let angle_key = |[i, j, k]: [usize; 3]| if i < k { [i, j, k] } else { [k, j, i] };
        let mut angles: BTreeMap<[usize; 3], HybridValenceTerm<3>> = BTreeMap::new();
        for term in &old_system.angles {
            let key = angle_key(term.atoms);
            angles
                .entry(key)
                .or_insert_with(|| HybridValenceTerm {
                    atoms: key,
                    old: None,
                    new: None,
                    scope: scope_of(&key),
                })
                .old = Some((term.angle, term.k));
        }
        for term in &new_system.angles {
            let hybrid = to_new(&term.atoms);
            let key = angle_key([hybrid[0], hybrid[1], hybrid[2]]);
            angles
                .entry(key)
                .or_insert_with(|| HybridValenceTerm {
                    atoms: key,
                    old: None,
                    new: None,
                    scope: scope_of(&key),
                })
                .new = Some((term.angle, term.k));
        }

        let mut torsions: Vec<HybridTorsion> = old_system
            .torsions
            .iter()
            .map(|term| HybridTorsion {
                atoms: term.atoms,
                periodicity: term.periodicity,
                phase: term.phase,
                k: term.k,
                from_old: true,
                scope: scope_of(&term.atoms),
            })
            .collect();
        torsions.extend(new_system.torsions.iter().map(|term| {
            let hybrid = to_new(&term.atoms);
            let atoms = [hybrid[0], hybrid[1], hybrid[2], hybrid[3]];
            HybridTorsion {
                atoms,
                periodicity: term.periodicity,
                phase: term.phase,
                k: term.k,
                from_old: false,
                scope: scope_of(&atoms),
            }
        }));

        let rest = self.rest_region(&positions);
        for index in &rest {
            atoms[*index].rest = true;
        }

        let system = HybridSystem {
            variant,
            settings: self.settings.clone(),
            atoms,
            positions,
            new_to_hybrid,
            particles,
            old_exceptions,
            new_exceptions,
            bonds: bonds.into_values().collect(),
            angles: angles.into_values().collect(),
            torsions,
        };
        info!(
            atoms = system.atom_count(),
            bonds = system.bond_count(),
            angles = system.angle_count(),
            torsions = system.torsion_count(),
            rest_atoms = rest.len(),
            "Built hybrid system."
        );
        Ok(system)
    }

    /// The mutated residue plus every solute residue with an atom within the REST
    /// radius of it. Water and ions are never part of the region.
    fn rest_region(&self, positions: &[Point3<f64>]) -> BTreeSet<usize> {
        let t = self.transformation;
        let mut region: BTreeSet<usize> = t.old_residue_atoms().iter().copied().collect();
        region.extend(t.new_residue_atoms().iter().map(|&new| self.hybrid_of_new(new)));

        let radius = self.settings.effective_rest_radius();
        let site = ReferenceCloud::new(region.iter().map(|&i| &positions[i]));
        let topology = t.old_topology();
        for (_, residue) in topology.residues_iter() {
            let solvent = residue.is_water()
                || topology
                    .chain(residue.chain_id)
                    .is_some_and(|c| c.chain_type.is_solvent());
            if solvent || residue.atoms().iter().any(|i| region.contains(i)) {
                continue;
            }
            if residue.atoms().iter().any(|&i| site.is_within(&positions[i], radius)) {
                debug!(residue = %residue.name, number = %residue.number, "Residue joins the REST region.");
                region.extend(residue.atoms().iter().copied());
            }
        }
        region
    }

    fn hybrid_of_new(&self, new: usize) -> usize {
        let map = self.transformation.atom_map();
        map.new_to_old(new).unwrap_or_else(|| {
            map.old_count() + map.unique_new().range(..new).count()
        })
    }
}

fn describe(
    topology: &MolecularTopology,
    index: usize,
    class: AtomClass,
    old_index: Option<usize>,
    new_index: Option<usize>,
) -> HybridAtom {
    let atom = topology.atom(index);
    let residue = topology.residue_of(index);
    HybridAtom {
        name: atom.map(|a| a.name.clone()).unwrap_or_default(),
        element: atom.map(|a| a.element).unwrap_or_default(),
        residue_name: residue.map(|r| r.name.clone()).unwrap_or_default(),
        residue_number: residue.map(|r| r.number.clone()).unwrap_or_default(),
        chain_id: residue
            .and_then(|r| topology.chain(r.chain_id))
            .map(|c| c.id.clone())
            .unwrap_or_default(),
        class,
        old_index,
        new_index,
        rest: false,
    }
}
