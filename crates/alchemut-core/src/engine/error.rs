use thiserror::Error;

use super::config::ConfigError;
use super::geometry::GeometryError;
use super::hybrid::HybridError;
use super::transformation::AtomMapError;
use crate::core::forcefield::energy::EnergyError;
use crate::core::forcefield::parameterization::ParameterizationError;
use crate::core::forcefield::params::ParamLoadError;
use crate::core::io::IoError;
use crate::core::models::system::TopologyError;
use crate::core::solvation::SolvationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(
        "Only {found} of the {needed} water molecules needed for counter-ions lie within {radius} nm of the mutated residue"
    )]
    InsufficientSolvent {
        needed: usize,
        found: usize,
        radius: f64,
    },

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error(
        "Endstate {endstate} of the {variant} hybrid system deviates by {discrepancy:.6} kT (threshold {threshold})"
    )]
    EndstateMismatch {
        variant: String,
        endstate: u8,
        discrepancy: f64,
        threshold: f64,
    },

    #[error("Invalid use of the pipeline: {0}")]
    Misuse(String),

    #[error("Structure I/O failed: {0}")]
    Io(#[from] IoError),

    #[error("Force field loading failed: {0}")]
    ParamLoad(#[from] ParamLoadError),

    #[error("Parametrization failed: {0}")]
    Parameterization(#[from] ParameterizationError),

    #[error("Energy evaluation failed: {0}")]
    Energy(#[from] EnergyError),

    #[error("Geometry proposal failed: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Hybrid system construction failed: {0}")]
    Hybrid(#[from] HybridError),

    #[error("Atom map error: {0}")]
    AtomMap(#[from] AtomMapError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Solvation failed: {0}")]
    Solvation(SolvationError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl From<SolvationError> for EngineError {
    fn from(error: SolvationError) -> Self {
        match error {
            SolvationError::UnsupportedShape { .. } => Self::UnsupportedFeature(error.to_string()),
            other => Self::Solvation(other),
        }
    }
}
