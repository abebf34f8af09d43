//! # Engine Module
//!
//! The stateful preparation stages of a point-mutation free-energy calculation.
//!
//! ## Overview
//!
//! Each stage consumes the output of the previous one for a single phase:
//!
//! - **Topology mapping** ([`mapping`]) builds the old and new endpoints of the
//!   mutation as a [`transformation::MutationTransformation`], including the atom
//!   map between them.
//! - **Naked-charge repair** ([`naked_charge`]) gives particles with no
//!   Lennard-Jones radius or well depth a small floor value.
//! - **Geometry proposal** ([`geometry`]) places unique-new atoms and scores the
//!   reverse placement of unique-old atoms, reporting the valence-energy
//!   corrections needed at the endstates.
//! - **Charge-change resolution** ([`charge_change`]) converts waters into
//!   counter-ions when the mutation changes the net charge.
//! - **Hybrid construction** ([`hybrid`]) merges both endpoints into one
//!   alchemically interpolated system, in one of several variants.
//! - **Endstate validation** ([`validation`]) checks the hybrid system against
//!   the independently parametrized endpoints.
//!
//! Configuration ([`config`]), errors ([`error`]) and progress reporting
//! ([`progress`]) are shared by all stages.

pub mod charge_change;
pub mod config;
pub mod error;
pub mod geometry;
pub mod hybrid;
pub mod mapping;
pub mod naked_charge;
pub mod progress;
pub mod transformation;
pub(crate) mod utils;
pub mod validation;
