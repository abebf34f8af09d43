use super::config::MutationSite;
use crate::core::forcefield::system::ParametrizedSystem;
use crate::core::models::system::MolecularTopology;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtomMapError {
    #[error("{side} atom index {index} is out of range ({count} atoms)")]
    IndexOutOfRange {
        side: &'static str,
        index: usize,
        count: usize,
    },
    #[error("New atom {new} is mapped from both old atoms {first} and {second}")]
    NotInjective { new: usize, first: usize, second: usize },
    #[error("Core atom {0} is not part of the mapping")]
    CoreNotMapped(usize),
    #[error("Old atom {0} is not an environment atom and cannot be promoted to core")]
    NotEnvironment(usize),
}

/// Role of an atom in a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AtomClass {
    /// Mapped atom whose parameters change between the endpoints.
    Core,
    /// Mapped atom outside the alchemical region.
    Environment,
    /// Present only in the old topology.
    UniqueOld,
    /// Present only in the new topology.
    UniqueNew,
}

impl AtomClass {
    pub fn is_unique(self) -> bool {
        matches!(self, Self::UniqueOld | Self::UniqueNew)
    }
}

/// Correspondence between the atoms of the old and new topologies.
///
/// Every old index is either mapped or unique-old, every new index is either
/// mapped or unique-new, and mapped pairs form a bijection. Mapped atoms are
/// further split into core and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomMap {
    old_to_new: BTreeMap<usize, usize>,
    new_to_old: BTreeMap<usize, usize>,
    core_old: BTreeSet<usize>,
    unique_old: BTreeSet<usize>,
    unique_new: BTreeSet<usize>,
    old_count: usize,
    new_count: usize,
}

impl AtomMap {
    /// Builds the map from mapped pairs (old → new) and the subset of mapped old
    /// atoms that form the core. All other atoms become unique.
    pub fn new(
        old_count: usize,
        new_count: usize,
        old_to_new: BTreeMap<usize, usize>,
        core_old: BTreeSet<usize>,
    ) -> Result<Self, AtomMapError> {
        let mut new_to_old = BTreeMap::new();
        for (&old, &new) in &old_to_new {
            if old >= old_count {
                return Err(AtomMapError::IndexOutOfRange {
                    side: "Old",
                    index: old,
                    count: old_count,
                });
            }
            if new >= new_count {
                return Err(AtomMapError::IndexOutOfRange {
                    side: "New",
                    index: new,
                    count: new_count,
                });
            }
            if let Some(first) = new_to_old.insert(new, old) {
                return Err(AtomMapError::NotInjective {
                    new,
                    first,
                    second: old,
                });
            }
        }
        if let Some(&unmapped) = core_old.iter().find(|i| !old_to_new.contains_key(i)) {
            return Err(AtomMapError::CoreNotMapped(unmapped));
        }

        let unique_old = (0..old_count).filter(|i| !old_to_new.contains_key(i)).collect();
        let unique_new = (0..new_count).filter(|j| !new_to_old.contains_key(j)).collect();
        Ok(Self {
            old_to_new,
            new_to_old,
            core_old,
            unique_old,
            unique_new,
            old_count,
            new_count,
        })
    }

    pub fn old_count(&self) -> usize {
        self.old_count
    }

    pub fn new_count(&self) -> usize {
        self.new_count
    }

    pub fn old_to_new(&self, old: usize) -> Option<usize> {
        self.old_to_new.get(&old).copied()
    }

    pub fn new_to_old(&self, new: usize) -> Option<usize> {
        self.new_to_old.get(&new).copied()
    }

    /// Mapped pairs `(old, new)` in ascending old index.
    pub fn mapped_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.old_to_new.iter().map(|(&o, &n)| (o, n))
    }

    pub fn mapped_count(&self) -> usize {
        self.old_to_new.len()
    }

    pub fn unique_old(&self) -> &BTreeSet<usize> {
        &self.unique_old
    }

    pub fn unique_new(&self) -> &BTreeSet<usize> {
        &self.unique_new
    }

    pub fn core_old(&self) -> &BTreeSet<usize> {
        &self.core_old
    }

    pub fn core_new(&self) -> BTreeSet<usize> {
        self.core_old
            .iter()
            .filter_map(|old| self.old_to_new(*old))
            .collect()
    }

    pub fn class_of_old(&self, old: usize) -> Option<AtomClass> {
        if old >= self.old_count {
            None
        } else if self.unique_old.contains(&old) {
            Some(AtomClass::UniqueOld)
        } else if self.core_old.contains(&old) {
            Some(AtomClass::Core)
        } else {
            Some(AtomClass::Environment)
        }
    }

    pub fn class_of_new(&self, new: usize) -> Option<AtomClass> {
        if new >= self.new_count {
            None
        } else if self.unique_new.contains(&new) {
            Some(AtomClass::UniqueNew)
        } else {
            self.new_to_old(new).and_then(|old| self.class_of_old(old))
        }
    }

    /// Whether the map has neither unique-old nor unique-new atoms.
    pub fn is_map_only(&self) -> bool {
        self.unique_old.is_empty() && self.unique_new.is_empty()
    }

    /// Moves a mapped environment atom into the core.
    pub(crate) fn promote_to_core(&mut self, old: usize) -> Result<(), AtomMapError> {
        if self.class_of_old(old) != Some(AtomClass::Environment) {
            return Err(AtomMapError::NotEnvironment(old));
        }
        self.core_old.insert(old);
        Ok(())
    }
}

/// Everything known about one point mutation of one phase.
///
/// The atom map and the new system's nonbonded parameters are amended once by
/// counter-ion conversion; nothing else changes after construction.
#[derive(Debug, Clone)]
pub struct MutationTransformation {
    site: MutationSite,
    old_topology: MolecularTopology,
    new_topology: MolecularTopology,
    old_system: ParametrizedSystem,
    new_system: ParametrizedSystem,
    atom_map: AtomMap,
    old_residue_atoms: Vec<usize>,
    new_residue_atoms: Vec<usize>,
    charge_resolved: bool,
}

impl MutationTransformation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        site: MutationSite,
        old_topology: MolecularTopology,
        new_topology: MolecularTopology,
        old_system: ParametrizedSystem,
        new_system: ParametrizedSystem,
        atom_map: AtomMap,
        old_residue_atoms: Vec<usize>,
        new_residue_atoms: Vec<usize>,
    ) -> Self {
        Self {
            site,
            old_topology,
            new_topology,
            old_system,
            new_system,
            atom_map,
            old_residue_atoms,
            new_residue_atoms,
            charge_resolved: false,
        }
    }

    pub fn site(&self) -> &MutationSite {
        &self.site
    }

    pub fn old_topology(&self) -> &MolecularTopology {
        &self.old_topology
    }

    pub fn new_topology(&self) -> &MolecularTopology {
        &self.new_topology
    }

    pub fn old_system(&self) -> &ParametrizedSystem {
        &self.old_system
    }

    pub fn new_system(&self) -> &ParametrizedSystem {
        &self.new_system
    }

    pub fn atom_map(&self) -> &AtomMap {
        &self.atom_map
    }

    /// Old-topology indices of the mutated residue.
    pub fn old_residue_atoms(&self) -> &[usize] {
        &self.old_residue_atoms
    }

    /// New-topology indices of the mutated residue.
    pub fn new_residue_atoms(&self) -> &[usize] {
        &self.new_residue_atoms
    }

    pub fn old_residue_name(&self) -> &str {
        self.old_residue_atoms
            .first()
            .and_then(|&i| self.old_topology.residue_of(i))
            .map_or("", |r| r.name.as_str())
    }

    pub fn new_residue_name(&self) -> &str {
        &self.site.target
    }

    pub fn is_charge_resolved(&self) -> bool {
        self.charge_resolved
    }

    pub(crate) fn systems_mut(&mut self) -> (&mut ParametrizedSystem, &mut ParametrizedSystem) {
        (&mut self.old_system, &mut self.new_system)
    }

    /// The parts counter-ion conversion amends. Marks the transformation as resolved.
    pub(crate) fn begin_charge_resolution(&mut self) -> (&mut AtomMap, &mut ParametrizedSystem) {
        self.charge_resolved = true;
        (&mut self.atom_map, &mut self.new_system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(usize, usize)]) -> BTreeMap<usize, usize> {
        entries.iter().copied().collect()
    }

    #[test]
    fn categories_partition_both_index_ranges() {
        let map = AtomMap::new(
            5,
            6,
            pairs(&[(0, 0), (1, 1), (2, 3), (4, 5)]),
            [1, 2].into_iter().collect(),
        )
        .unwrap();

        assert_eq!(map.unique_old().iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(map.unique_new().iter().copied().collect::<Vec<_>>(), vec![2, 4]);
        for old in 0..5 {
            let mapped = map.old_to_new(old).is_some();
            assert_ne!(mapped, map.unique_old().contains(&old));
        }
        for new in 0..6 {
            let mapped = map.new_to_old(new).is_some();
            assert_ne!(mapped, map.unique_new().contains(&new));
        }
        for (old, new) in map.mapped_pairs() {
            assert_eq!(map.new_to_old(new), Some(old));
        }
    }

    #[test]
    fn classes_follow_core_and_uniqueness() {
        let map = AtomMap::new(3, 3, pairs(&[(0, 0), (1, 2)]), [1].into_iter().collect()).unwrap();
        assert_eq!(map.class_of_old(0), Some(AtomClass::Environment));
        assert_eq!(map.class_of_old(1), Some(AtomClass::Core));
        assert_eq!(map.class_of_old(2), Some(AtomClass::UniqueOld));
        assert_eq!(map.class_of_new(2), Some(AtomClass::Core));
        assert_eq!(map.class_of_new(1), Some(AtomClass::UniqueNew));
        assert_eq!(map.class_of_new(3), None);
        assert_eq!(map.core_new().into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn non_injective_mapping_is_rejected() {
        let result = AtomMap::new(3, 3, pairs(&[(0, 1), (2, 1)]), BTreeSet::new());
        assert_eq!(
            result,
            Err(AtomMapError::NotInjective {
                new: 1,
                first: 0,
                second: 2
            })
        );
    }

    #[test]
    fn out_of_range_and_unmapped_core_are_rejected() {
        assert!(matches!(
            AtomMap::new(2, 2, pairs(&[(0, 4)]), BTreeSet::new()),
            Err(AtomMapError::IndexOutOfRange { side: "New", .. })
        ));
        assert_eq!(
            AtomMap::new(2, 2, pairs(&[(0, 0)]), [1].into_iter().collect()),
            Err(AtomMapError::CoreNotMapped(1))
        );
    }

    #[test]
    fn promotion_only_applies_to_environment_atoms() {
        let mut map = AtomMap::new(3, 2, pairs(&[(0, 0), (1, 1)]), [0].into_iter().collect()).unwrap();
        map.promote_to_core(1).unwrap();
        assert_eq!(map.class_of_old(1), Some(AtomClass::Core));
        assert_eq!(map.promote_to_core(1), Err(AtomMapError::NotEnvironment(1)));
        assert_eq!(map.promote_to_core(2), Err(AtomMapError::NotEnvironment(2)));
    }

    #[test]
    fn identity_map_has_no_unique_atoms() {
        let map = AtomMap::new(2, 2, pairs(&[(0, 0), (1, 1)]), BTreeSet::new()).unwrap();
        assert!(map.is_map_only());
        assert_eq!(map.mapped_count(), 2);
    }
}
