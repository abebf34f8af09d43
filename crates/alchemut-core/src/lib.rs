//! # Alchemut Core Library
//!
//! Preparation of relative free-energy calculations for protein point mutations:
//! from an input structure to validated hybrid systems that interpolate between
//! the wild-type and the mutant.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three layers throughout:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularTopology`),
//!   force-field parameters and parametrization, reference energy evaluation,
//!   solvation and structure-file I/O. Parametrization, solvation and energy
//!   evaluation sit behind traits so that an external simulation engine can be
//!   plugged in.
//!
//! - **[`engine`]: The Logic Core.** The stages of a mutation: topology mapping,
//!   naked-charge repair, geometry proposal, counter-ion conversion, hybrid system
//!   construction and endstate validation.
//!
//! - **[`workflows`]: The Public API.** Runs the stages in order for each phase
//!   and collects the resulting hybrid systems.

pub mod core;
pub mod engine;
pub mod workflows;

#[cfg(test)]
pub(crate) mod test_utils;
