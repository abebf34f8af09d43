//! # Workflows Module
//!
//! High-level entry points that run the engine stages end to end.
//!
//! ## Overview
//!
//! A workflow takes input structures, a validated configuration and the external
//! collaborators (parametrization, solvation, energy evaluation), and returns
//! live objects ready for downstream sampling. Progress and tracing events are
//! delivered to the [`PipelineObserver`](crate::engine::progress::PipelineObserver)
//! handed to the run.
//!
//! - **Mutation Workflow** ([`mutate`]) - Prepares the hybrid systems of a
//!   single point mutation for the apo phase and, when a binding partner is
//!   given, for the complex phase.

pub mod mutate;
