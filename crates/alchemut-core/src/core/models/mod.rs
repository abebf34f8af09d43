//! # Core Models Module
//!
//! This module contains the data structures used to represent molecular topologies
//! in alchemut, the graph of atoms, residues, chains and bonds that every stage of the
//! mutation pipeline reads from.
//!
//! ## Overview
//!
//! Atoms are stored densely: an atom's index in a [`system::MolecularTopology`] is also
//! its index into the matching coordinate array. Residues and chains live in slot-map
//! arenas so that they can be looked up by stable keys while atoms are renumbered when
//! a residue is replaced.
//!
//! ## Key Components
//!
//! - [`atom`] - Atom identity (name, element, owning residue)
//! - [`residue`] - Residues and the amino-acid classification used for charge and ring lookups
//! - [`chain`] - Chains and their classification
//! - [`system`] - The complete topology with bond graph and query helpers
//! - [`topology`] - Bond representation
//! - [`builder`] - Incremental topology construction used by the file readers
//! - [`ids`] - Keys for residues and chains
//!
//! ## Usage
//!
//! ```ignore
//! use alchemut::core::models::{atom::Element, chain::ChainType, system::MolecularTopology};
//!
//! let mut topology = MolecularTopology::new();
//! let chain = topology.add_chain("A", ChainType::Protein);
//! let residue = topology.add_residue(chain, "1", "ALA")?;
//! let ca = topology.add_atom(residue, "CA", Element::C)?;
//! ```

use nalgebra::Point3;

pub mod atom;
pub mod builder;
pub mod chain;
pub mod ids;
pub mod residue;
pub mod system;
pub mod topology;

/// Atom positions in nanometres, indexed like the atoms of the owning topology.
pub type Coordinates = Vec<Point3<f64>>;
