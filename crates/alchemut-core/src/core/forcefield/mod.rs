//! # Forcefield Module
//!
//! Force-field parameters, parametrized systems and energy evaluation.
//!
//! ## Overview
//!
//! A force field is read from one or more TOML files into a [`params::Forcefield`].
//! A [`parameterization::SystemGenerator`] turns a [`MolecularTopology`](crate::core::models::system::MolecularTopology)
//! into a [`system::ParametrizedSystem`] (nonbonded particles and exceptions,
//! harmonic bonds and angles, periodic torsions), and an
//! [`energy::EnergyEvaluator`] computes its potential energy.
//!
//! ## Key Components
//!
//! - [`params`] - TOML force-field files, merged in order
//! - [`parameterization`] - Template-based bond perception and parametrization
//! - [`system`] - The parametrized system and its force terms
//! - [`potentials`] - Functional forms (Lennard-Jones, Coulomb, softcore variants, valence terms)
//! - [`energy`] - The evaluator seam and its cutoff-free reference implementation
//! - [`term`] - Per-term energy breakdown
//!
//! ## Units
//!
//! Lengths in nm, energies in kJ/mol, angles in radians, charges in e.

pub mod energy;
pub mod parameterization;
pub mod params;
pub mod potentials;
pub mod system;
pub mod term;
