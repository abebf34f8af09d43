//! # Topology Module
//!
//! Residue templates: the chemical description of each residue (atom names, force-field
//! types, partial charges, internal bonds and inter-residue links) used both to perceive
//! bonds on a structure and to parametrize it.
//!
//! ## Key Components
//!
//! - [`registry`] - [`ResidueTemplate`](registry::ResidueTemplate) and the name-keyed
//!   [`TemplateRegistry`](registry::TemplateRegistry)
//!
//! Templates are normally read as part of a force-field file, see
//! [`Forcefield::load`](crate::core::forcefield::params::Forcefield::load).

pub mod registry;
