use super::config::NakedChargeFloors;
use super::transformation::MutationTransformation;
use crate::core::forcefield::system::ParametrizedSystem;
use crate::core::models::residue::Residue;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Particles with a zero radius or well depth that get the floor values.
///
/// Water atoms are skipped. A particle with `sigma == 1` and no well depth (the
/// convention for hydroxyl hydrogens) gets the hydroxyl radius floor instead.
/// Returns the number of changed particles; running it again changes nothing.
pub fn repair_naked_charges(
    system: &mut ParametrizedSystem,
    skip: &BTreeSet<usize>,
    floors: &NakedChargeFloors,
) -> usize {
    let mut changed = 0;
    for (index, particle) in system.particles.iter_mut().enumerate() {
        if skip.contains(&index) {
            continue;
        }
        let before = *particle;
        if particle.sigma == 0.0 {
            particle.sigma = floors.sigma;
        }
        if particle.epsilon == 0.0 {
            particle.epsilon = floors.epsilon;
            if particle.sigma == 1.0 {
                particle.sigma = floors.hydroxyl_sigma;
            }
        }
        if *particle != before {
            debug!(
                index,
                sigma = particle.sigma,
                epsilon = particle.epsilon,
                "Applied naked-charge floor."
            );
            changed += 1;
        }
    }
    changed
}

/// Applies [`repair_naked_charges`] to both endpoint systems of a transformation.
///
/// Returns the number of changed particles in the old and new system.
#[instrument(skip_all, name = "naked_charge_repair")]
pub fn repair_transformation(
    transformation: &mut MutationTransformation,
    floors: &NakedChargeFloors,
) -> (usize, usize) {
    let old_waters = transformation.old_topology().atoms_where(Residue::is_water);
    let new_waters = transformation.new_topology().atoms_where(Residue::is_water);
    let (old_system, new_system) = transformation.systems_mut();
    let old_changed = repair_naked_charges(old_system, &old_waters, floors);
    let new_changed = repair_naked_charges(new_system, &new_waters, floors);
    if old_changed + new_changed > 0 {
        info!(old = old_changed, new = new_changed, "Repaired naked charges.");
    }
    (old_changed, new_changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::system::NonbondedParticle;

    fn system(particles: Vec<NonbondedParticle>) -> ParametrizedSystem {
        ParametrizedSystem {
            particles,
            ..Default::default()
        }
    }

    #[test]
    fn zero_radius_and_well_depth_get_floors() {
        let mut sys = system(vec![
            NonbondedParticle::new(0.4275, 0.0, 0.0),
            NonbondedParticle::new(0.1, 0.2, 0.0),
            NonbondedParticle::new(-0.3, 0.339967, 0.4577),
        ]);
        let changed = repair_naked_charges(&mut sys, &BTreeSet::new(), &NakedChargeFloors::default());
        assert_eq!(changed, 2);
        assert_eq!(sys.particles[0], NonbondedParticle::new(0.4275, 0.06, 1e-4));
        assert_eq!(sys.particles[1], NonbondedParticle::new(0.1, 0.2, 1e-4));
        assert_eq!(sys.particles[2], NonbondedParticle::new(-0.3, 0.339967, 0.4577));
    }

    #[test]
    fn neutral_particles_are_repaired_too() {
        let mut sys = system(vec![NonbondedParticle::new(0.0, 0.0, 0.0)]);
        let changed = repair_naked_charges(&mut sys, &BTreeSet::new(), &NakedChargeFloors::default());
        assert_eq!(changed, 1);
        assert_eq!(sys.particles[0], NonbondedParticle::new(0.0, 0.06, 1e-4));
    }

    #[test]
    fn unit_radius_hydrogens_get_hydroxyl_floor() {
        let mut sys = system(vec![NonbondedParticle::new(0.41, 1.0, 0.0)]);
        repair_naked_charges(&mut sys, &BTreeSet::new(), &NakedChargeFloors::default());
        assert_eq!(sys.particles[0], NonbondedParticle::new(0.41, 0.1, 1e-4));
    }

    #[test]
    fn skipped_particles_are_left_alone() {
        let mut sys = system(vec![NonbondedParticle::new(0.417, 0.0, 0.0)]);
        let skip: BTreeSet<usize> = [0].into_iter().collect();
        assert_eq!(repair_naked_charges(&mut sys, &skip, &NakedChargeFloors::default()), 0);
        assert_eq!(sys.particles[0].sigma, 0.0);
    }

    #[test]
    fn second_repair_changes_nothing() {
        let mut sys = system(vec![
            NonbondedParticle::new(0.4, 0.0, 0.0),
            NonbondedParticle::new(0.4, 1.0, 0.0),
            NonbondedParticle::new(0.4, 0.0, 0.5),
        ]);
        let floors = NakedChargeFloors::default();
        assert_eq!(repair_naked_charges(&mut sys, &BTreeSet::new(), &floors), 3);
        let repaired = sys.clone();
        assert_eq!(repair_naked_charges(&mut sys, &BTreeSet::new(), &floors), 0);
        assert_eq!(sys, repaired);
    }

    #[test]
    fn custom_floors_are_honoured() {
        let floors = NakedChargeFloors {
            sigma: 0.05,
            epsilon: 1e-3,
            hydroxyl_sigma: 0.12,
        };
        let mut sys = system(vec![NonbondedParticle::new(0.3, 0.0, 0.0), NonbondedParticle::new(0.3, 1.0, 0.0)]);
        repair_naked_charges(&mut sys, &BTreeSet::new(), &floors);
        assert_eq!(sys.particles[0], NonbondedParticle::new(0.3, 0.05, 1e-3));
        assert_eq!(sys.particles[1], NonbondedParticle::new(0.3, 0.12, 1e-3));
    }
}
