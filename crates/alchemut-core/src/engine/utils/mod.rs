//! Utility functions for the engine module.
//!
//! Discretized sampling used by the geometry synthesizer, and spatial neighbour
//! queries used by the charge-change resolver and the REST region selection.

pub mod neighbors;
pub mod sampling;
