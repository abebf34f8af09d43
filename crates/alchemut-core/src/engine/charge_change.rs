use super::config::ChargeChangeConfig;
use super::error::EngineError;
use super::transformation::MutationTransformation;
use super::utils::neighbors::ReferenceCloud;
use crate::core::forcefield::system::{NonbondedParticle, ParametrizedSystem};
use crate::core::models::atom::Element;
use crate::core::models::system::MolecularTopology;
use nalgebra::Point3;
use tracing::{info, instrument, warn};

pub const CATION_RESIDUE_NAME: &str = "NA";
pub const ANION_RESIDUE_NAME: &str = "CL";

/// Sodium parameters used when the old system holds no sodium ion.
pub const DEFAULT_CATION: NonbondedParticle = NonbondedParticle {
    charge: 1.0,
    sigma: 0.2439281,
    epsilon: 0.36585,
};

/// Chloride parameters used when the old system holds no chloride ion.
pub const DEFAULT_ANION: NonbondedParticle = NonbondedParticle {
    charge: -1.0,
    sigma: 0.4477657,
    epsilon: 0.14891,
};

/// A water molecule selected for conversion into a monovalent ion.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterConversion {
    /// New-topology index of the oxygen, which becomes the ion.
    pub oxygen: usize,
    /// New-topology indices of the hydrogens, which become dummies.
    pub hydrogens: Vec<usize>,
    /// Distance (nm) from the oxygen to the closest atom of the mutated residue.
    pub distance: f64,
}

/// Counter-ion conversions that restore the net charge of the old endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct IonizationPlan {
    /// New residue formal charge minus old residue formal charge.
    pub charge_difference: i32,
    /// Parameters given to each converted oxygen.
    pub ion: NonbondedParticle,
    pub conversions: Vec<WaterConversion>,
}

impl IonizationPlan {
    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

/// Formal charge of a residue: the amino-acid table where the name is known,
/// otherwise the rounded sum of its parametrized charges.
fn residue_formal_charge(topology: &MolecularTopology, system: &ParametrizedSystem, atoms: &[usize]) -> i32 {
    let known = atoms
        .first()
        .and_then(|&i| topology.residue_of(i))
        .and_then(|r| r.amino_acid())
        .map(|aa| aa.formal_charge());
    known.unwrap_or_else(|| {
        let net: f64 = atoms
            .iter()
            .filter_map(|&i| system.particle(i))
            .map(|p| p.charge)
            .sum();
        net.round() as i32
    })
}

/// Parameters of the first single-atom residue named `name` in the old endpoint.
fn reference_ion(transformation: &MutationTransformation, name: &str) -> Option<NonbondedParticle> {
    let topology = transformation.old_topology();
    topology
        .residues_iter()
        .find(|(_, r)| r.name == name && r.atoms().len() == 1)
        .and_then(|(_, r)| transformation.old_system().particle(r.atoms()[0]).copied())
}

/// Chooses the waters to convert, nearest to the mutated residue first.
///
/// # Errors
///
/// Returns [`EngineError::InsufficientSolvent`] when fewer waters than the
/// charge difference lie within the search radius, and [`EngineError::Internal`]
/// when `new_positions` does not cover the new topology.
pub fn plan(
    transformation: &MutationTransformation,
    new_positions: &[Point3<f64>],
    config: &ChargeChangeConfig,
) -> Result<IonizationPlan, EngineError> {
    let expected = transformation.atom_map().new_count();
    if new_positions.len() != expected {
        return Err(EngineError::Internal(format!(
            "expected {expected} new-endpoint positions, got {}",
            new_positions.len()
        )));
    }
    let old_charge = residue_formal_charge(
        transformation.old_topology(),
        transformation.old_system(),
        transformation.old_residue_atoms(),
    );
    let new_charge = residue_formal_charge(
        transformation.new_topology(),
        transformation.new_system(),
        transformation.new_residue_atoms(),
    );
    let charge_difference = new_charge - old_charge;

    let ion = if charge_difference < 0 {
        reference_ion(transformation, CATION_RESIDUE_NAME).unwrap_or(DEFAULT_CATION)
    } else {
        reference_ion(transformation, ANION_RESIDUE_NAME).unwrap_or(DEFAULT_ANION)
    };
    if charge_difference == 0 {
        return Ok(IonizationPlan {
            charge_difference,
            ion,
            conversions: Vec::new(),
        });
    }

    let needed = charge_difference.unsigned_abs() as usize;
    let topology = transformation.new_topology();
    let site = ReferenceCloud::new(transformation.new_residue_atoms().iter().map(|&i| &new_positions[i]));
    let mut candidates: Vec<WaterConversion> = topology
        .residues_iter()
        .filter(|(_, r)| r.is_water())
        .filter_map(|(_, residue)| {
            let (oxygens, hydrogens): (Vec<usize>, Vec<usize>) = residue
                .atoms()
                .iter()
                .copied()
                .partition(|&i| topology.atom(i).is_some_and(|a| a.element == Element::O));
            let &oxygen = oxygens.first()?;
            let distance = site.nearest_distance(&new_positions[oxygen])?;
            (distance <= config.search_radius).then_some(WaterConversion {
                oxygen,
                hydrogens,
                distance,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.oxygen.cmp(&b.oxygen)));

    if candidates.len() < needed {
        return Err(EngineError::InsufficientSolvent {
            needed,
            found: candidates.len(),
            radius: config.search_radius,
        });
    }
    candidates.truncate(needed);
    Ok(IonizationPlan {
        charge_difference,
        ion,
        conversions: candidates,
    })
}

/// Rewrites the selected waters of the new endpoint and moves them into the core.
fn apply(transformation: &mut MutationTransformation, plan: &IonizationPlan) -> Result<(), EngineError> {
    let (map, new_system) = transformation.begin_charge_resolution();
    for conversion in &plan.conversions {
        let waters = std::iter::once(conversion.oxygen).chain(conversion.hydrogens.iter().copied());
        for new in waters {
            let old = map
                .new_to_old(new)
                .ok_or_else(|| EngineError::Internal(format!("water atom {new} has no old counterpart")))?;
            map.promote_to_core(old)?;
            let particle = new_system
                .particles
                .get_mut(new)
                .ok_or_else(|| EngineError::Internal(format!("water atom {new} is not parametrized")))?;
            *particle = if new == conversion.oxygen {
                plan.ion
            } else {
                NonbondedParticle::new(0.0, particle.sigma, 0.0)
            };
        }
    }
    Ok(())
}

/// Restores the old endpoint's net charge by turning waters into counter-ions.
///
/// Runs at most once per transformation; a second call is a misuse.
#[instrument(skip_all, name = "charge_change")]
pub fn resolve(
    transformation: &mut MutationTransformation,
    new_positions: &[Point3<f64>],
    config: &ChargeChangeConfig,
) -> Result<IonizationPlan, EngineError> {
    if transformation.is_charge_resolved() {
        return Err(EngineError::Misuse(
            "counter-ion conversion has already been applied to this transformation".to_string(),
        ));
    }
    let plan = plan(transformation, new_positions, config)?;
    if plan.charge_difference == 0 {
        info!("No charge change; no counter-ion needed.");
        return Ok(plan);
    }
    if !config.transform_waters {
        warn!(
            charge_difference = plan.charge_difference,
            "Net charge changes and water conversion is disabled."
        );
        return Ok(IonizationPlan {
            conversions: Vec::new(),
            ..plan
        });
    }
    apply(transformation, &plan)?;
    info!(
        charge_difference = plan.charge_difference,
        ion_charge = plan.ion.charge,
        waters = ?plan.conversions.iter().map(|c| c.oxygen).collect::<Vec<_>>(),
        "Converted waters into counter-ions."
    );
    Ok(plan)
}
