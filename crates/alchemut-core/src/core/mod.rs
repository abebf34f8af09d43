//! # Core Module
//!
//! Stateless building blocks of the mutation pipeline: the molecular data model,
//! structure-file I/O, force-field parametrization and energy evaluation, residue
//! templates, solvent-box construction and geometric helpers.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms, residues, chains and the bond graph
//! - **File I/O** ([`io`]) - PDB, mmCIF and SDF readers, PDB writer
//! - **Energy Model** ([`forcefield`]) - Parameters, parametrized systems, reference evaluator
//! - **Residue Templates** ([`topology`]) - Template definitions used for bonds and parameters
//! - **Solvation** ([`solvation`]) - Periodic water boxes with counter-ions
//! - **Geometry** ([`utils`]) - Internal-coordinate math
//!
//! Types here know nothing about mutations; the [`engine`](crate::engine) layer
//! builds the alchemical machinery on top of them.

pub mod forcefield;
pub mod io;
pub mod models;
pub mod solvation;
pub mod topology;
pub mod utils;
