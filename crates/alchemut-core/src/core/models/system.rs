use super::atom::{Atom, Element};
use super::chain::{Chain, ChainType};
use super::ids::{ChainId, ResidueId};
use super::residue::Residue;
use super::topology::{Bond, BondOrder};
use nalgebra::Vector3;
use slotmap::SlotMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Chain key does not belong to this topology")]
    UnknownChain,
    #[error("Residue key does not belong to this topology")]
    UnknownResidue,
    #[error("Atom index {index} is out of range (topology has {count} atoms)")]
    AtomOutOfRange { index: usize, count: usize },
    #[error("Residue {residue} already contains an atom named '{name}'")]
    DuplicateAtomName { residue: String, name: String },
    #[error("An atom cannot be bonded to itself (index {0})")]
    SelfBond(usize),
}

/// The atom/residue/chain graph of a molecular structure, independent of coordinates.
///
/// Atom indices are dense, stable integers `0..N` and double as indices into the
/// matching [`Coordinates`](super::Coordinates). Residues and chains are addressed by
/// slot-map keys and kept in the order in which they were added.
#[derive(Debug, Clone, Default)]
pub struct MolecularTopology {
    /// Atoms in index order.
    atoms: Vec<Atom>,
    /// Primary storage for residues using a slot map for efficient ID management.
    residues: SlotMap<ResidueId, Residue>,
    /// Primary storage for chains using a slot map for efficient ID management.
    chains: SlotMap<ChainId, Chain>,
    /// Chains in insertion order.
    chain_order: Vec<ChainId>,
    /// List of all bonds in the topology.
    bonds: Vec<Bond>,
    /// Lookup map for finding residues by chain and residue number.
    residue_lookup: HashMap<(ChainId, String), ResidueId>,
    /// Lookup map for finding chains by their identifier.
    chain_lookup: HashMap<String, ChainId>,
    /// Bonded neighbours, indexed by atom.
    adjacency: Vec<Vec<usize>>,
    /// Periodic box vectors in nanometres, if the structure is periodic.
    box_vectors: Option<[Vector3<f64>; 3]>,
}

impl MolecularTopology {
    /// Creates a new, empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    /// Returns the residue that owns the atom at `index`.
    pub fn residue_of(&self, index: usize) -> Option<&Residue> {
        self.atoms
            .get(index)
            .and_then(|atom| self.residues.get(atom.residue_id))
    }

    /// Iterates over residues in chain order, then residue order within each chain.
    pub fn residues_iter(&self) -> impl Iterator<Item = (ResidueId, &Residue)> {
        self.chain_order.iter().flat_map(move |chain_id| {
            self.chains[*chain_id]
                .residues
                .iter()
                .map(move |res_id| (*res_id, &self.residues[*res_id]))
        })
    }

    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    /// Iterates over chains in insertion order.
    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chain_order
            .iter()
            .map(move |chain_id| (*chain_id, &self.chains[*chain_id]))
    }

    pub fn find_chain(&self, id: &str) -> Option<ChainId> {
        self.chain_lookup.get(id).copied()
    }

    pub fn find_residue(&self, chain_id: ChainId, number: &str) -> Option<ResidueId> {
        self.residue_lookup
            .get(&(chain_id, number.to_string()))
            .copied()
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Returns the indices of atoms bonded to `index`.
    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency.get(index).map_or(&[], |n| n.as_slice())
    }

    pub fn are_bonded(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).contains(&b)
    }

    pub fn box_vectors(&self) -> Option<&[Vector3<f64>; 3]> {
        self.box_vectors.as_ref()
    }

    pub fn set_box_vectors(&mut self, vectors: Option<[Vector3<f64>; 3]>) {
        self.box_vectors = vectors;
    }

    /// Whether the atom at `index` belongs to a water residue.
    pub fn is_water_atom(&self, index: usize) -> bool {
        self.residue_of(index).is_some_and(Residue::is_water)
    }

    /// Adds a chain, or returns the existing chain with the same identifier.
    pub fn add_chain(&mut self, id: &str, chain_type: ChainType) -> ChainId {
        if let Some(existing) = self.chain_lookup.get(id) {
            return *existing;
        }
        let chain_id = self.chains.insert(Chain::new(id, chain_type));
        self.chain_order.push(chain_id);
        self.chain_lookup.insert(id.to_string(), chain_id);
        chain_id
    }

    /// Adds a residue to a chain, or returns the existing residue with the same number.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::UnknownChain`] if `chain_id` is not part of this topology.
    pub fn add_residue(
        &mut self,
        chain_id: ChainId,
        number: &str,
        name: &str,
    ) -> Result<ResidueId, TopologyError> {
        if !self.chains.contains_key(chain_id) {
            return Err(TopologyError::UnknownChain);
        }
        let key = (chain_id, number.to_string());
        if let Some(existing) = self.residue_lookup.get(&key) {
            return Ok(*existing);
        }
        let residue_id = self.residues.insert(Residue::new(number, name, chain_id));
        self.chains[chain_id].residues.push(residue_id);
        self.residue_lookup.insert(key, residue_id);
        Ok(residue_id)
    }

    /// Appends an atom to a residue and returns its dense index.
    ///
    /// # Errors
    ///
    /// Fails if the residue is unknown or already has an atom with this name.
    pub fn add_atom(
        &mut self,
        residue_id: ResidueId,
        name: &str,
        element: Element,
    ) -> Result<usize, TopologyError> {
        let residue = self
            .residues
            .get_mut(residue_id)
            .ok_or(TopologyError::UnknownResidue)?;
        if residue.atom_by_name(name).is_some() {
            return Err(TopologyError::DuplicateAtomName {
                residue: format!("{}{}", residue.name, residue.number),
                name: name.to_string(),
            });
        }
        let index = self.atoms.len();
        residue.add_atom(name, index);
        self.atoms.push(Atom::new(name, element, residue_id));
        self.adjacency.push(Vec::new());
        Ok(index)
    }

    /// Adds a bond between two atoms. Adding an existing bond again is a no-op.
    pub fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) -> Result<(), TopologyError> {
        let count = self.atoms.len();
        for index in [a, b] {
            if index >= count {
                return Err(TopologyError::AtomOutOfRange { index, count });
            }
        }
        if a == b {
            return Err(TopologyError::SelfBond(a));
        }
        if self.are_bonded(a, b) {
            return Ok(());
        }
        self.bonds.push(Bond::new(a, b, order));
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
        Ok(())
    }

    pub fn rename_residue(&mut self, residue_id: ResidueId, name: &str) -> Result<(), TopologyError> {
        let residue = self
            .residues
            .get_mut(residue_id)
            .ok_or(TopologyError::UnknownResidue)?;
        residue.name = name.to_string();
        Ok(())
    }

    /// All bond angles `i-j-k` (with `i < k`) implied by the bond graph.
    pub fn angles(&self) -> Vec<[usize; 3]> {
        let mut angles = Vec::new();
        for (center, neighbors) in self.adjacency.iter().enumerate() {
            for (n, &i) in neighbors.iter().enumerate() {
                for &k in &neighbors[n + 1..] {
                    let (first, last) = if i < k { (i, k) } else { (k, i) };
                    angles.push([first, center, last]);
                }
            }
        }
        angles
    }

    /// All proper torsions `i-j-k-l` implied by the bond graph, each listed once.
    pub fn proper_torsions(&self) -> Vec<[usize; 4]> {
        let mut torsions = Vec::new();
        for bond in &self.bonds {
            let (j, k) = if bond.atom1 < bond.atom2 {
                (bond.atom1, bond.atom2)
            } else {
                (bond.atom2, bond.atom1)
            };
            for &i in self.neighbors(j) {
                if i == k {
                    continue;
                }
                for &l in self.neighbors(k) {
                    if l == j || l == i {
                        continue;
                    }
                    torsions.push([i, j, k, l]);
                }
            }
        }
        torsions
    }

    /// Atom pairs separated by exactly one, two and three bonds, as ordered `(lo, hi)` pairs.
    ///
    /// A pair reachable through both a short and a long path is reported only at its
    /// shortest separation.
    pub fn bonded_pairs(&self) -> BondedPairs {
        let mut pairs = BondedPairs::default();
        let ordered = |a: usize, b: usize| if a < b { (a, b) } else { (b, a) };
        for bond in &self.bonds {
            pairs.one_two.insert(ordered(bond.atom1, bond.atom2));
        }
        for [i, _, k] in self.angles() {
            let pair = ordered(i, k);
            if !pairs.one_two.contains(&pair) {
                pairs.one_three.insert(pair);
            }
        }
        for [i, _, _, l] in self.proper_torsions() {
            let pair = ordered(i, l);
            if i != l && !pairs.one_two.contains(&pair) && !pairs.one_three.contains(&pair) {
                pairs.one_four.insert(pair);
            }
        }
        pairs
    }

    /// Builds a copy of this topology without the given atoms.
    ///
    /// Returns the pruned topology together with the old-to-new index map. Residues
    /// and chains left without atoms are dropped.
    pub fn without_atoms(
        &self,
        removed: &HashSet<usize>,
    ) -> Result<(MolecularTopology, Vec<Option<usize>>), TopologyError> {
        let mut pruned = MolecularTopology::new();
        let mut index_map = vec![None; self.atoms.len()];
        for (_, chain) in self.chains_iter() {
            for residue_id in chain.residues() {
                let residue = &self.residues[*residue_id];
                let kept: Vec<usize> = residue
                    .atoms()
                    .iter()
                    .copied()
                    .filter(|index| !removed.contains(index))
                    .collect();
                if kept.is_empty() {
                    continue;
                }
                let new_chain = pruned.add_chain(&chain.id, chain.chain_type);
                let new_residue = pruned.add_residue(new_chain, &residue.number, &residue.name)?;
                for old_index in kept {
                    let atom = &self.atoms[old_index];
                    index_map[old_index] = Some(pruned.add_atom(new_residue, &atom.name, atom.element)?);
                }
            }
        }
        for bond in &self.bonds {
            if let (Some(a), Some(b)) = (index_map[bond.atom1], index_map[bond.atom2]) {
                pruned.add_bond(a, b, bond.order)?;
            }
        }
        pruned.box_vectors = self.box_vectors;
        Ok((pruned, index_map))
    }

    /// Appends another topology's chains, atoms and bonds after this one's.
    ///
    /// Chains whose identifier is already taken receive the next free single-letter
    /// identifier. Returns the old-to-new index map of the appended atoms.
    pub fn append(&mut self, other: &MolecularTopology) -> Result<Vec<usize>, TopologyError> {
        let mut index_map = vec![0usize; other.atoms.len()];
        for (_, chain) in other.chains_iter() {
            let chain_label = if self.chain_lookup.contains_key(&chain.id) {
                self.next_free_chain_label()
            } else {
                chain.id.clone()
            };
            let chain_id = self.add_chain(&chain_label, chain.chain_type);
            for residue_id in chain.residues() {
                let residue = &other.residues[*residue_id];
                let new_residue = self.add_residue(chain_id, &residue.number, &residue.name)?;
                for index in residue.atoms() {
                    let atom = &other.atoms[*index];
                    index_map[*index] = self.add_atom(new_residue, &atom.name, atom.element)?;
                }
            }
        }
        for bond in &other.bonds {
            self.add_bond(index_map[bond.atom1], index_map[bond.atom2], bond.order)?;
        }
        Ok(index_map)
    }

    fn next_free_chain_label(&self) -> String {
        ('A'..='Z')
            .chain('a'..='z')
            .chain('0'..='9')
            .map(|c| c.to_string())
            .find(|label| !self.chain_lookup.contains_key(label))
            .unwrap_or_else(|| format!("X{}", self.chains.len()))
    }

    /// Indices of all atoms in residues for which `predicate` holds, in ascending order.
    pub fn atoms_where(&self, predicate: impl Fn(&Residue) -> bool) -> BTreeSet<usize> {
        self.residues
            .values()
            .filter(|residue| predicate(residue))
            .flat_map(|residue| residue.atoms().iter().copied())
            .collect()
    }
}

/// Atom pairs grouped by bond separation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondedPairs {
    pub one_two: BTreeSet<(usize, usize)>,
    pub one_three: BTreeSet<(usize, usize)>,
    pub one_four: BTreeSet<(usize, usize)>,
}

impl BondedPairs {
    /// Pairs whose nonbonded interaction is fully excluded.
    pub fn is_excluded(&self, pair: (usize, usize)) -> bool {
        self.one_two.contains(&pair) || self.one_three.contains(&pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestRefs {
        topology: MolecularTopology,
        chain: ChainId,
        residue: ResidueId,
    }

    // Butane-like chain C1-C2-C3-C4 inside a single residue.
    fn setup_chain_of_four() -> TestRefs {
        let mut topology = MolecularTopology::new();
        let chain = topology.add_chain("A", ChainType::Protein);
        let residue = topology.add_residue(chain, "1", "BUT").unwrap();
        for name in ["C1", "C2", "C3", "C4"] {
            topology.add_atom(residue, name, Element::C).unwrap();
        }
        for (a, b) in [(0, 1), (1, 2), (2, 3)] {
            topology.add_bond(a, b, BondOrder::Single).unwrap();
        }
        TestRefs {
            topology,
            chain,
            residue,
        }
    }

    mod core_functionality {
        use super::*;

        #[test]
        fn atoms_receive_dense_indices() {
            let refs = setup_chain_of_four();
            assert_eq!(refs.topology.atom_count(), 4);
            assert_eq!(refs.topology.atom(2).unwrap().name, "C3");
            assert_eq!(refs.topology.residue(refs.residue).unwrap().atoms(), &[0, 1, 2, 3]);
        }

        #[test]
        fn add_chain_and_residue_are_idempotent() {
            let mut refs = setup_chain_of_four();
            let chain_again = refs.topology.add_chain("A", ChainType::Protein);
            assert_eq!(chain_again, refs.chain);
            let residue_again = refs.topology.add_residue(refs.chain, "1", "BUT").unwrap();
            assert_eq!(residue_again, refs.residue);
            assert_eq!(refs.topology.residue_count(), 1);
        }

        #[test]
        fn add_bond_is_idempotent_and_validates_indices() {
            let mut refs = setup_chain_of_four();
            refs.topology.add_bond(1, 0, BondOrder::Single).unwrap();
            assert_eq!(refs.topology.bonds().len(), 3);
            assert_eq!(
                refs.topology.add_bond(0, 9, BondOrder::Single),
                Err(TopologyError::AtomOutOfRange { index: 9, count: 4 })
            );
            assert_eq!(
                refs.topology.add_bond(2, 2, BondOrder::Single),
                Err(TopologyError::SelfBond(2))
            );
        }

        #[test]
        fn duplicate_atom_names_are_rejected() {
            let mut refs = setup_chain_of_four();
            let result = refs.topology.add_atom(refs.residue, "C1", Element::C);
            assert!(matches!(result, Err(TopologyError::DuplicateAtomName { .. })));
        }

        #[test]
        fn lookup_by_identifiers() {
            let refs = setup_chain_of_four();
            assert_eq!(refs.topology.find_chain("A"), Some(refs.chain));
            assert_eq!(refs.topology.find_chain("B"), None);
            assert_eq!(refs.topology.find_residue(refs.chain, "1"), Some(refs.residue));
            assert_eq!(refs.topology.find_residue(refs.chain, "2"), None);
        }
    }

    mod graph_queries {
        use super::*;

        #[test]
        fn angles_and_torsions_follow_bond_graph() {
            let refs = setup_chain_of_four();
            let mut angles = refs.topology.angles();
            angles.sort();
            assert_eq!(angles, vec![[0, 1, 2], [1, 2, 3]]);
            assert_eq!(refs.topology.proper_torsions(), vec![[0, 1, 2, 3]]);
        }

        #[test]
        fn bonded_pairs_are_classified_by_separation() {
            let refs = setup_chain_of_four();
            let pairs = refs.topology.bonded_pairs();
            assert_eq!(pairs.one_two.len(), 3);
            assert!(pairs.one_three.contains(&(0, 2)));
            assert!(pairs.one_three.contains(&(1, 3)));
            assert_eq!(pairs.one_four.iter().collect::<Vec<_>>(), vec![&(0, 3)]);
            assert!(pairs.is_excluded((0, 2)));
            assert!(!pairs.is_excluded((0, 3)));
        }

        #[test]
        fn ring_pairs_use_shortest_separation() {
            let mut topology = MolecularTopology::new();
            let chain = topology.add_chain("A", ChainType::Ligand);
            let residue = topology.add_residue(chain, "1", "CPR").unwrap();
            for name in ["C1", "C2", "C3"] {
                topology.add_atom(residue, name, Element::C).unwrap();
            }
            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                topology.add_bond(a, b, BondOrder::Single).unwrap();
            }
            let pairs = topology.bonded_pairs();
            assert_eq!(pairs.one_two.len(), 3);
            assert!(pairs.one_three.is_empty());
            assert!(pairs.one_four.is_empty());
        }
    }

    mod restructuring {
        use super::*;

        #[test]
        fn without_atoms_renumbers_and_keeps_bonds() {
            let refs = setup_chain_of_four();
            let removed: HashSet<usize> = [1].into_iter().collect();
            let (pruned, map) = refs.topology.without_atoms(&removed).unwrap();
            assert_eq!(pruned.atom_count(), 3);
            assert_eq!(map, vec![Some(0), None, Some(1), Some(2)]);
            assert_eq!(pruned.bonds().len(), 1);
            assert!(pruned.are_bonded(1, 2));
        }

        #[test]
        fn append_offsets_indices_and_renames_clashing_chains() {
            let mut refs = setup_chain_of_four();
            let other = setup_chain_of_four().topology;
            let map = refs.topology.append(&other).unwrap();
            assert_eq!(map, vec![4, 5, 6, 7]);
            assert_eq!(refs.topology.atom_count(), 8);
            assert!(refs.topology.are_bonded(4, 5));
            assert!(refs.topology.find_chain("B").is_some());
            assert_eq!(refs.topology.chains_iter().count(), 2);
        }

        #[test]
        fn water_atoms_are_detected_by_residue_name() {
            let mut topology = MolecularTopology::new();
            let chain = topology.add_chain("W", ChainType::Water);
            let residue = topology.add_residue(chain, "1", "HOH").unwrap();
            let o = topology.add_atom(residue, "O", Element::O).unwrap();
            assert!(topology.is_water_atom(o));
        }
    }
}
