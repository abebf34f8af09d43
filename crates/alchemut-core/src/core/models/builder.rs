use super::Coordinates;
use super::atom::Element;
use super::chain::ChainType;
use super::ids::{ChainId, ResidueId};
use super::system::{MolecularTopology, TopologyError};
use super::topology::BondOrder;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// Incrementally assembles a [`MolecularTopology`] and its coordinates.
///
/// File readers feed records in file order; the builder keeps track of the current
/// chain and residue and of the file's own atom serial numbers so that connectivity
/// records can be resolved once all atoms are known.
pub struct MolecularTopologyBuilder {
    topology: MolecularTopology,
    positions: Coordinates,

    // --- Builder-specific state for efficient construction ---
    serial_map: HashMap<usize, usize>,
    pending_bonds: Vec<(usize, usize, BondOrder)>,
    current_chain: Option<ChainId>,
    current_residue: Option<ResidueId>,
}

impl Default for MolecularTopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MolecularTopologyBuilder {
    pub fn new() -> Self {
        Self {
            topology: MolecularTopology::new(),
            positions: Vec::new(),
            serial_map: HashMap::new(),
            pending_bonds: Vec::new(),
            current_chain: None,
            current_residue: None,
        }
    }

    pub fn start_chain(&mut self, id: &str, chain_type: ChainType) -> &mut Self {
        let chain_id = self.topology.add_chain(id, chain_type);
        if self.current_chain != Some(chain_id) {
            self.current_residue = None;
        }
        self.current_chain = Some(chain_id);
        self
    }

    pub fn start_residue(&mut self, number: &str, name: &str) -> Result<&mut Self, TopologyError> {
        let chain_id = self.current_chain.ok_or(TopologyError::UnknownChain)?;
        self.current_residue = Some(self.topology.add_residue(chain_id, number, name)?);
        Ok(self)
    }

    /// Adds an atom to the current residue.
    ///
    /// `serial` is the identifier the source file uses for the atom, used later by
    /// [`add_bond_by_serial`](Self::add_bond_by_serial).
    pub fn add_atom(
        &mut self,
        serial: usize,
        name: &str,
        element: Element,
        position: Point3<f64>,
    ) -> Result<usize, TopologyError> {
        let residue_id = self.current_residue.ok_or(TopologyError::UnknownResidue)?;
        let index = self.topology.add_atom(residue_id, name, element)?;
        self.positions.push(position);
        self.serial_map.insert(serial, index);
        Ok(index)
    }

    /// Records a bond between two atoms identified by their file serial numbers.
    ///
    /// Bonds are resolved in [`build`](Self::build); serials that never appear are
    /// silently dropped, matching how structure files list partial connectivity.
    pub fn add_bond_by_serial(&mut self, serial1: usize, serial2: usize, order: BondOrder) -> &mut Self {
        self.pending_bonds.push((serial1, serial2, order));
        self
    }

    pub fn box_vectors(&mut self, vectors: [Vector3<f64>; 3]) -> &mut Self {
        self.topology.set_box_vectors(Some(vectors));
        self
    }

    pub fn atom_count(&self) -> usize {
        self.positions.len()
    }

    pub fn build(mut self) -> Result<(MolecularTopology, Coordinates), TopologyError> {
        for (serial1, serial2, order) in std::mem::take(&mut self.pending_bonds) {
            if let (Some(&a), Some(&b)) = (self.serial_map.get(&serial1), self.serial_map.get(&serial2)) {
                if a != b {
                    self.topology.add_bond(a, b, order)?;
                }
            }
        }
        Ok((self.topology, self.positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_topology_and_coordinates_in_file_order() {
        let mut builder = MolecularTopologyBuilder::new();
        builder.start_chain("A", ChainType::Protein);
        builder.start_residue("1", "GLY").unwrap();
        builder
            .add_atom(10, "N", Element::N, Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        builder
            .add_atom(11, "CA", Element::C, Point3::new(0.145, 0.0, 0.0))
            .unwrap();
        builder.add_bond_by_serial(10, 11, BondOrder::Single);
        builder.add_bond_by_serial(10, 99, BondOrder::Single);

        let (topology, positions) = builder.build().unwrap();
        assert_eq!(topology.atom_count(), 2);
        assert_eq!(positions.len(), 2);
        assert_eq!(topology.bonds().len(), 1);
        assert!(topology.are_bonded(0, 1));
    }

    #[test]
    fn atoms_require_an_open_residue() {
        let mut builder = MolecularTopologyBuilder::new();
        builder.start_chain("A", ChainType::Protein);
        let result = builder.add_atom(1, "N", Element::N, Point3::origin());
        assert_eq!(result, Err(TopologyError::UnknownResidue));
    }

    #[test]
    fn residues_require_an_open_chain() {
        let mut builder = MolecularTopologyBuilder::new();
        assert!(matches!(
            builder.start_residue("1", "ALA"),
            Err(TopologyError::UnknownChain)
        ));
    }
}
