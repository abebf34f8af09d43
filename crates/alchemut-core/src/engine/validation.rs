use super::error::EngineError;
use super::geometry::{Correction, GeometryProposal};
use super::hybrid::{AlchemicalState, Endstate, HybridSystem, HybridVariant};
use super::transformation::MutationTransformation;
use crate::core::forcefield::energy::EnergyEvaluator;
use crate::core::forcefield::potentials::thermodynamic_beta;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Share of the threshold above which a passing discrepancy is still logged as a warning.
const WARNING_FRACTION: f64 = 0.1;

/// Outcome of comparing a hybrid system with one physical endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EndstateReport {
    pub variant: HybridVariant,
    pub endstate: Endstate,
    /// Reduced potential of the hybrid system at the endstate.
    pub hybrid: f64,
    /// Reduced potential of the endpoint system.
    pub reference: f64,
    /// Valence energy of the atoms absent from the endpoint.
    pub correction: Correction,
    /// `hybrid - reference - correction`.
    pub discrepancy: f64,
    pub threshold: f64,
}

impl EndstateReport {
    pub fn passed(&self) -> bool {
        self.discrepancy.abs() <= self.threshold
    }
}

/// Checks that hybrid systems reproduce the independently parametrized endpoints.
pub struct EndstateValidator<'e> {
    evaluator: &'e dyn EnergyEvaluator,
    beta: f64,
    threshold: f64,
}

impl<'e> EndstateValidator<'e> {
    pub fn new(evaluator: &'e dyn EnergyEvaluator, temperature: f64, threshold: f64) -> Self {
        Self {
            evaluator,
            beta: thermodynamic_beta(temperature),
            threshold,
        }
    }

    /// Compares `hybrid` with the old endpoint at `lambda = 0` and the new one at
    /// `lambda = 1`; a repartitioned system is only compared at its own endstate.
    ///
    /// # Errors
    ///
    /// [`EngineError::Misuse`] when the system flattens torsions or exceptions,
    /// and [`EngineError::EndstateMismatch`] for the first endstate whose
    /// discrepancy exceeds the threshold.
    #[instrument(skip_all, name = "endstate_validation", fields(variant = %hybrid.variant()))]
    pub fn validate(
        &self,
        hybrid: &HybridSystem,
        transformation: &MutationTransformation,
        old_positions: &[Point3<f64>],
        proposal: &GeometryProposal,
    ) -> Result<Vec<EndstateReport>, EngineError> {
        let settings = hybrid.settings();
        if settings.flatten_torsions || settings.exceptions_flattened() {
            return Err(EngineError::Misuse(
                "endstate validation is meaningless with flattened torsions or exceptions".to_string(),
            ));
        }

        let mut reports = Vec::new();
        for endstate in hybrid.variant().valid_endstates() {
            let (system, positions, correction) = match endstate {
                Endstate::Zero => (
                    transformation.old_system(),
                    old_positions,
                    proposal.added_valence_energy(),
                ),
                Endstate::One => (
                    transformation.new_system(),
                    proposal.new_positions.as_slice(),
                    proposal.subtracted_valence_energy(),
                ),
            };
            let reference = self.evaluator.evaluate(system, positions)?.reduced(self.beta);
            let value = hybrid.reduced_potential(AlchemicalState::at(endstate), self.beta)?;
            let discrepancy = value - reference - correction.value_or_zero();
            let report = EndstateReport {
                variant: hybrid.variant(),
                endstate,
                hybrid: value,
                reference,
                correction,
                discrepancy,
                threshold: self.threshold,
            };

            if !report.passed() {
                return Err(EngineError::EndstateMismatch {
                    variant: hybrid.variant().to_string(),
                    endstate: endstate.index(),
                    discrepancy,
                    threshold: self.threshold,
                });
            }
            if discrepancy.abs() > WARNING_FRACTION * self.threshold {
                warn!(%endstate, discrepancy, "Endstate discrepancy is close to the threshold.");
            } else {
                info!(%endstate, discrepancy, "Endstate validated.");
            }
            reports.push(report);
        }
        Ok(reports)
    }
}
