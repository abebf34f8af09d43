use crate::core::forcefield::energy::EnergyEvaluator;
use crate::core::forcefield::parameterization::{SystemGenerator, TemplateSystemGenerator};
use crate::core::forcefield::params::Forcefield;
use crate::core::models::Coordinates;
use crate::core::models::system::MolecularTopology;
use crate::core::solvation::{SolvationRequest, Solvator};
use crate::engine::charge_change::{self, IonizationPlan};
use crate::engine::config::{ForcefieldConfig, MutationConfig, SolvationMode};
use crate::engine::error::EngineError;
use crate::engine::geometry::{GeometryEngine, GeometryProposal};
use crate::engine::hybrid::{Endstate, HybridBuilder, HybridSystem, HybridVariant};
use crate::engine::mapping::PointMutationEngine;
use crate::engine::naked_charge;
use crate::engine::progress::{PipelineObserver, Progress};
use crate::engine::transformation::MutationTransformation;
use crate::engine::validation::{EndstateReport, EndstateValidator};
use nalgebra::Point3;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, instrument, warn};

/// A molecular structure with one position per atom.
#[derive(Debug, Clone)]
pub struct Structure {
    pub topology: MolecularTopology,
    pub positions: Coordinates,
}

impl Structure {
    pub fn new(topology: MolecularTopology, positions: Coordinates) -> Self {
        Self { topology, positions }
    }

    /// This structure with `other` appended as additional chains.
    pub fn combined_with(&self, other: &Structure) -> Result<Structure, EngineError> {
        let mut topology = self.topology.clone();
        let index_map = topology.append(&other.topology)?;
        let mut positions = self.positions.clone();
        positions.resize(topology.atom_count(), Point3::origin());
        for (source, &target) in index_map.iter().enumerate() {
            positions[target] = other.positions[source];
        }
        Ok(Structure { topology, positions })
    }
}

/// The external collaborators a run delegates to.
pub struct Collaborators<'c> {
    pub generator: &'c dyn SystemGenerator,
    pub solvator: &'c dyn Solvator,
    pub evaluator: &'c dyn EnergyEvaluator,
}

/// Loads and merges the configured force-field files into a template generator.
pub fn load_generator(config: &ForcefieldConfig) -> Result<TemplateSystemGenerator, EngineError> {
    let forcefield = Forcefield::load(&config.files)?;
    Ok(TemplateSystemGenerator::new(
        forcefield,
        config.small_molecule_forcefield.as_deref(),
    )?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// The biomolecule alone.
    Apo,
    /// The biomolecule bound to its small-molecule partner.
    Complex,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Apo => "apo",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output slot of a hybrid system within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariantKey {
    Plain,
    Repartitioned0,
    Repartitioned1,
    RestCapable,
}

impl VariantKey {
    pub fn of(variant: &HybridVariant) -> Self {
        match variant {
            HybridVariant::Plain => Self::Plain,
            HybridVariant::Repartitioned {
                endstate: Endstate::Zero,
            } => Self::Repartitioned0,
            HybridVariant::Repartitioned {
                endstate: Endstate::One,
            } => Self::Repartitioned1,
            HybridVariant::RestCapable { .. } => Self::RestCapable,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Repartitioned0 => "repartitioned-endstate-0",
            Self::Repartitioned1 => "repartitioned-endstate-1",
            Self::RestCapable => "rest-capable",
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a phase produced before hybrid construction.
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    transformation: MutationTransformation,
    old_positions: Coordinates,
    proposal: GeometryProposal,
    ionization: Option<IonizationPlan>,
    repaired_particles: (usize, usize),
}

impl PhaseOutput {
    pub fn transformation(&self) -> &MutationTransformation {
        &self.transformation
    }

    /// Coordinates of the old endpoint, after solvation and residue renaming.
    pub fn old_positions(&self) -> &[Point3<f64>] {
        &self.old_positions
    }

    pub fn new_positions(&self) -> &[Point3<f64>] {
        &self.proposal.new_positions
    }

    pub fn proposal(&self) -> &GeometryProposal {
        &self.proposal
    }

    /// The counter-ion plan; `None` when the phase ran in vacuum.
    pub fn ionization(&self) -> Option<&IonizationPlan> {
        self.ionization.as_ref()
    }

    /// Particles changed by naked-charge repair in the old and new system.
    pub fn repaired_particles(&self) -> (usize, usize) {
        self.repaired_particles
    }
}

/// Results of one mutation run, keyed by phase and variant.
#[derive(Debug, Clone, Default)]
pub struct MutationOutputs {
    phases: BTreeMap<Phase, PhaseOutput>,
    hybrids: BTreeMap<(Phase, VariantKey), HybridSystem>,
    reports: BTreeMap<(Phase, VariantKey), Vec<EndstateReport>>,
}

impl MutationOutputs {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseOutput> {
        self.phases.get(&phase)
    }

    pub fn phases(&self) -> impl Iterator<Item = (Phase, &PhaseOutput)> {
        self.phases.iter().map(|(phase, output)| (*phase, output))
    }

    pub fn hybrid(&self, phase: Phase, key: VariantKey) -> Option<&HybridSystem> {
        self.hybrids.get(&(phase, key))
    }

    pub fn hybrids(&self) -> impl Iterator<Item = (Phase, VariantKey, &HybridSystem)> {
        self.hybrids.iter().map(|((phase, key), hybrid)| (*phase, *key, hybrid))
    }

    /// Validation reports of one hybrid; empty when validation was disabled.
    pub fn reports(&self, phase: Phase, key: VariantKey) -> &[EndstateReport] {
        self.reports.get(&(phase, key)).map(Vec::as_slice).unwrap_or_default()
    }
}

/// The hybrid variants selected by the configuration, in build order.
pub fn selected_variants(config: &MutationConfig) -> Vec<HybridVariant> {
    let mut variants = Vec::new();
    if config.variants.plain {
        variants.push(HybridVariant::Plain);
    }
    if config.variants.repartitioned {
        variants.extend(Endstate::BOTH.map(|endstate| HybridVariant::Repartitioned { endstate }));
    }
    if config.variants.rest_capable {
        variants.push(HybridVariant::rest_capable(&config.hybrid));
    }
    variants
}

/// Prepares the hybrid systems of a point mutation.
///
/// The apo phase always runs; the complex phase runs when `ligand` is given. Tracing
/// events of the whole run go to the observer's dispatch.
pub fn run(
    protein: &Structure,
    ligand: Option<&Structure>,
    config: &MutationConfig,
    collaborators: &Collaborators,
    observer: &PipelineObserver,
) -> Result<MutationOutputs, EngineError> {
    observer.scoped(|| run_phases(protein, ligand, config, collaborators, observer))
}

#[instrument(skip_all, name = "mutation_workflow", fields(site = %format!("{}:{}->{}", config.site.chain_id, config.site.residue_id, config.site.target)))]
fn run_phases(
    protein: &Structure,
    ligand: Option<&Structure>,
    config: &MutationConfig,
    collaborators: &Collaborators,
    observer: &PipelineObserver,
) -> Result<MutationOutputs, EngineError> {
    check_preconditions(config, collaborators)?;

    let mut phases = vec![(Phase::Apo, protein.clone())];
    if let Some(ligand) = ligand {
        phases.push((Phase::Complex, protein.combined_with(ligand)?));
    }

    let variants = selected_variants(config);
    if variants.is_empty() {
        warn!("No hybrid variant selected; only the endpoints will be prepared.");
    }

    let mut outputs = MutationOutputs::default();
    for (phase, structure) in phases {
        info!(%phase, atoms = structure.topology.atom_count(), "Preparing phase.");
        let output = prepare_phase(phase, &structure, config, collaborators, observer)?;

        observer.report(Progress::PhaseStart {
            name: "Hybrid Construction",
        });
        observer.report(Progress::TaskStart {
            total_steps: variants.len() as u64,
        });
        let builder = HybridBuilder::new(
            &output.transformation,
            &output.old_positions,
            &output.proposal.new_positions,
            &config.hybrid,
        )?;
        let mut built = Vec::with_capacity(variants.len());
        for variant in &variants {
            built.push(builder.build(*variant)?);
            observer.report(Progress::TaskIncrement);
        }
        observer.report(Progress::TaskFinish);
        observer.report(Progress::PhaseFinish);

        if config.validation.enabled && !built.is_empty() {
            observer.report(Progress::PhaseStart {
                name: "Endstate Validation",
            });
            let validator = EndstateValidator::new(
                collaborators.evaluator,
                config.temperature,
                config.validation.threshold,
            );
            for hybrid in &built {
                let reports = validator.validate(
                    hybrid,
                    &output.transformation,
                    &output.old_positions,
                    &output.proposal,
                )?;
                outputs.reports.insert((phase, VariantKey::of(&hybrid.variant())), reports);
            }
            observer.report(Progress::PhaseFinish);
        }

        for hybrid in built {
            outputs.hybrids.insert((phase, VariantKey::of(&hybrid.variant())), hybrid);
        }
        outputs.phases.insert(phase, output);
        info!(%phase, "Phase complete.");
    }
    Ok(outputs)
}

/// Rejects requests that would only fail after the expensive stages.
fn check_preconditions(config: &MutationConfig, collaborators: &Collaborators) -> Result<(), EngineError> {
    if config.solvation.mode == SolvationMode::Solvate {
        collaborators.solvator.check_shape(config.solvation.box_shape)?;
    }
    if config.validation.enabled && (config.hybrid.flatten_torsions || config.hybrid.exceptions_flattened()) {
        return Err(EngineError::Misuse(
            "endstate validation cannot be requested together with torsion or exception flattening".to_string(),
        ));
    }
    Ok(())
}

fn prepare_phase(
    phase: Phase,
    structure: &Structure,
    config: &MutationConfig,
    collaborators: &Collaborators,
    observer: &PipelineObserver,
) -> Result<PhaseOutput, EngineError> {
    let solvated = match config.solvation.mode {
        SolvationMode::Solvate => {
            observer.report(Progress::PhaseStart { name: "Solvation" });
            let solvated = solvate(structure, config, collaborators)?;
            observer.report(Progress::PhaseFinish);
            solvated
        }
        SolvationMode::AlreadySolvated | SolvationMode::Vacuum => structure.clone(),
    };

    observer.report(Progress::PhaseStart {
        name: "Topology Mapping",
    });
    let engine = PointMutationEngine::new(
        collaborators.generator,
        std::slice::from_ref(&config.site),
        config.mapping.clone(),
    )?;
    let (mut transformation, old_positions) = engine.propose(&solvated.topology, &solvated.positions)?;
    let repaired_particles = naked_charge::repair_transformation(&mut transformation, &config.naked_charge);
    observer.report(Progress::PhaseFinish);

    observer.report(Progress::PhaseStart {
        name: "Geometry Proposal",
    });
    let proposal = GeometryEngine::new(config.geometry.clone(), config.temperature).propose(
        &transformation,
        &old_positions,
        collaborators.evaluator,
    )?;
    info!(
        %phase,
        logp_forward = proposal.logp_forward,
        logp_reverse = proposal.logp_reverse,
        added = %proposal.added_valence_energy(),
        subtracted = %proposal.subtracted_valence_energy(),
        "Proposed new geometry."
    );
    observer.report(Progress::PhaseFinish);

    let ionization = if config.solvation.mode == SolvationMode::Vacuum {
        info!(%phase, "Vacuum phase; counter-ion conversion skipped.");
        None
    } else {
        observer.report(Progress::PhaseStart {
            name: "Charge Change",
        });
        let plan = charge_change::resolve(&mut transformation, &proposal.new_positions, &config.charge_change)?;
        observer.report(Progress::PhaseFinish);
        Some(plan)
    };

    Ok(PhaseOutput {
        transformation,
        old_positions,
        proposal,
        ionization,
        repaired_particles,
    })
}

fn solvate(
    structure: &Structure,
    config: &MutationConfig,
    collaborators: &Collaborators,
) -> Result<Structure, EngineError> {
    let mut solute = structure.topology.clone();
    collaborators.generator.assign_bonds(&mut solute)?;
    let solute_charge = collaborators.generator.create_system(&solute)?.total_charge().round() as i32;
    let request = SolvationRequest {
        water_model: config.solvation.water_model,
        padding: config.solvation.padding,
        box_shape: config.solvation.box_shape,
        ionic_strength: config.solvation.ionic_strength,
        solute_charge,
    };
    let (topology, positions) = collaborators.solvator.solvate(&solute, &structure.positions, &request)?;
    Ok(Structure::new(topology, positions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::energy::ReferenceEvaluator;
    use crate::core::models::atom::Element;
    use crate::core::models::chain::ChainType;
    use crate::core::solvation::{BoxShape, EngineVersion, LatticeSolvator};
    use crate::engine::config::{
        GeometryConfig, HybridSettings, MutationConfigBuilder, MutationSite, ValidationConfig, VariantSelection,
    };
    use crate::engine::geometry::Correction;
    use crate::engine::progress::ProgressReporter;
    use crate::test_utils::{alanine_dipeptide, alanine_dipeptide_in_water, fixture_generator};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn builder(target: &str) -> MutationConfigBuilder {
        MutationConfigBuilder::new()
            .mutation(MutationSite::new("A", "2", target))
            .forcefield_files(vec![PathBuf::from("fixture.toml")])
            .geometry(GeometryConfig {
                seed: Some(7),
                ..GeometryConfig::default()
            })
    }

    fn structure((topology, positions): (MolecularTopology, Coordinates)) -> Structure {
        Structure::new(topology, positions)
    }

    fn execute(
        protein: &Structure,
        ligand: Option<&Structure>,
        config: &MutationConfig,
        solvator: &LatticeSolvator,
    ) -> Result<MutationOutputs, EngineError> {
        let generator = fixture_generator();
        let evaluator = ReferenceEvaluator::new();
        let collaborators = Collaborators {
            generator: &generator,
            solvator,
            evaluator: &evaluator,
        };
        run(protein, ligand, config, &collaborators, &PipelineObserver::new())
    }

    fn sodium() -> Structure {
        let mut topology = MolecularTopology::new();
        let chain = topology.add_chain("L", ChainType::Ligand);
        let residue = topology.add_residue(chain, "1", "NA").unwrap();
        topology.add_atom(residue, "NA", Element::Na).unwrap();
        Structure::new(topology, vec![Point3::new(-0.6, -0.6, -0.6)])
    }

    #[test]
    fn alanine_to_serine_round_trips_in_water() {
        let config = builder("SER")
            .already_solvated(true)
            .variants(VariantSelection {
                plain: true,
                repartitioned: true,
                rest_capable: true,
            })
            .build()
            .unwrap();
        let protein = structure(alanine_dipeptide_in_water(3));
        let outputs = execute(&protein, None, &config, &LatticeSolvator::default()).unwrap();

        assert_eq!(outputs.hybrids().count(), 4);
        for key in [
            VariantKey::Plain,
            VariantKey::Repartitioned0,
            VariantKey::Repartitioned1,
            VariantKey::RestCapable,
        ] {
            let hybrid = outputs.hybrid(Phase::Apo, key).unwrap();
            assert_eq!(VariantKey::of(&hybrid.variant()), key);
            assert_eq!(hybrid.settings(), &config.hybrid);
            let reports = outputs.reports(Phase::Apo, key);
            assert!(!reports.is_empty());
            assert!(reports.iter().all(EndstateReport::passed));
        }
        assert_eq!(outputs.reports(Phase::Apo, VariantKey::Repartitioned1).len(), 1);
        assert!(outputs.phase(Phase::Complex).is_none());

        let apo = outputs.phase(Phase::Apo).unwrap();
        assert!(apo.ionization().unwrap().is_empty());
        assert_eq!(apo.new_positions().len(), apo.transformation().atom_map().new_count());
    }

    #[test]
    fn alanine_to_aspartate_converts_one_water() {
        let config = builder("ASP").already_solvated(true).build().unwrap();
        let protein = structure(alanine_dipeptide_in_water(3));
        let outputs = execute(&protein, None, &config, &LatticeSolvator::default()).unwrap();

        let apo = outputs.phase(Phase::Apo).unwrap();
        let plan = apo.ionization().unwrap();
        assert_eq!(plan.charge_difference, -1);
        assert_eq!(plan.conversions.len(), 1);
        let t = apo.transformation();
        assert!((t.new_system().total_charge() - t.old_system().total_charge()).abs() < 1e-6);
        assert!(outputs.reports(Phase::Apo, VariantKey::Plain).iter().all(EndstateReport::passed));
    }

    #[test]
    fn charge_change_without_nearby_water_fails() {
        let config = builder("ASP").already_solvated(true).build().unwrap();
        let protein = structure(alanine_dipeptide());
        let result = execute(&protein, None, &config, &LatticeSolvator::default());
        assert!(matches!(result, Err(EngineError::InsufficientSolvent { needed: 1, found: 0, .. })));
    }

    #[test]
    fn vacuum_runs_skip_counter_ions() {
        let config = builder("ASP").vacuum(true).build().unwrap();
        let protein = structure(alanine_dipeptide());
        let outputs = execute(&protein, None, &config, &LatticeSolvator::default()).unwrap();
        assert!(outputs.phase(Phase::Apo).unwrap().ionization().is_none());
        assert!(outputs.hybrid(Phase::Apo, VariantKey::Plain).is_some());
    }

    #[test]
    fn map_only_mutation_reports_no_corrections() {
        let extra: BTreeMap<String, String> = ["HB1", "HB2", "HB3"]
            .into_iter()
            .map(|name| (name.to_string(), name.to_string()))
            .collect();
        let config = builder("ALA").vacuum(true).extra_sidechain_map(extra).build().unwrap();
        let protein = structure(alanine_dipeptide());
        let outputs = execute(&protein, None, &config, &LatticeSolvator::default()).unwrap();

        let proposal = outputs.phase(Phase::Apo).unwrap().proposal();
        assert_eq!(proposal.added_valence_energy(), Correction::NotApplicable);
        assert_eq!(proposal.subtracted_valence_energy(), Correction::NotApplicable);
        let reports = outputs.reports(Phase::Apo, VariantKey::Plain);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.discrepancy.abs() < 1e-2));
    }

    #[test]
    fn dodecahedron_needs_a_recent_engine() {
        let config = builder("SER").box_shape(BoxShape::Dodecahedron).build().unwrap();
        let protein = structure(alanine_dipeptide());
        let old_engine = LatticeSolvator::new(EngineVersion::new(7, 5));
        let result = execute(&protein, None, &config, &old_engine);
        assert!(matches!(result, Err(EngineError::UnsupportedFeature(_))));
    }

    #[test]
    fn flattening_with_validation_is_a_misuse() {
        let config = builder("SER")
            .vacuum(true)
            .hybrid(HybridSettings {
                flatten_exceptions: true,
                ..HybridSettings::default()
            })
            .build()
            .unwrap();
        let protein = structure(alanine_dipeptide());
        let result = execute(&protein, None, &config, &LatticeSolvator::default());
        assert!(matches!(result, Err(EngineError::Misuse(_))));
    }

    #[test]
    fn flattening_without_validation_builds_unvalidated_systems() {
        let config = builder("SER")
            .vacuum(true)
            .hybrid(HybridSettings {
                flatten_torsions: true,
                ..HybridSettings::default()
            })
            .validation(ValidationConfig {
                enabled: false,
                ..ValidationConfig::default()
            })
            .build()
            .unwrap();
        let protein = structure(alanine_dipeptide());
        let outputs = execute(&protein, None, &config, &LatticeSolvator::default()).unwrap();
        assert!(outputs.hybrid(Phase::Apo, VariantKey::Plain).is_some());
        assert!(outputs.reports(Phase::Apo, VariantKey::Plain).is_empty());
    }

    #[test]
    fn ligand_adds_a_complex_phase() {
        let config = builder("SER").already_solvated(true).build().unwrap();
        let protein = structure(alanine_dipeptide_in_water(3));
        let ligand = sodium();
        let outputs = execute(&protein, Some(&ligand), &config, &LatticeSolvator::default()).unwrap();

        let apo = outputs.hybrid(Phase::Apo, VariantKey::Plain).unwrap();
        let complex = outputs.hybrid(Phase::Complex, VariantKey::Plain).unwrap();
        assert_eq!(complex.atom_count(), apo.atom_count() + 1);
        assert!(outputs.reports(Phase::Complex, VariantKey::Plain).iter().all(EndstateReport::passed));
    }

    #[test]
    fn solvation_builds_a_water_box_before_mapping() {
        let config = builder("SER").padding(0.4).ionic_strength(0.0).build().unwrap();
        let protein = structure(alanine_dipeptide());
        let outputs = execute(&protein, None, &config, &LatticeSolvator::default()).unwrap();
        let apo = outputs.phase(Phase::Apo).unwrap();
        let topology = apo.transformation().old_topology();
        assert!(topology.atom_count() > protein.topology.atom_count());
        assert!(topology.box_vectors().is_some());
    }

    #[test]
    fn progress_phases_are_reported_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = PipelineObserver::new().with_reporter(ProgressReporter::with_callback(Box::new(
            move |event| {
                if let Progress::PhaseStart { name } = event {
                    sink.lock().unwrap().push(name);
                }
            },
        )));
        let config = builder("SER").already_solvated(true).build().unwrap();
        let protein = structure(alanine_dipeptide_in_water(2));
        let generator = fixture_generator();
        let evaluator = ReferenceEvaluator::new();
        let solvator = LatticeSolvator::default();
        let collaborators = Collaborators {
            generator: &generator,
            solvator: &solvator,
            evaluator: &evaluator,
        };
        run(&protein, None, &config, &collaborators, &observer).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "Topology Mapping",
                "Geometry Proposal",
                "Charge Change",
                "Hybrid Construction",
                "Endstate Validation"
            ]
        );
    }

    #[test]
    fn selected_variants_follow_the_configuration() {
        let config = builder("SER")
            .variants(VariantSelection {
                plain: false,
                repartitioned: true,
                rest_capable: true,
            })
            .build()
            .unwrap();
        let variants = selected_variants(&config);
        assert_eq!(variants.len(), 3);
        assert_eq!(VariantKey::of(&variants[1]), VariantKey::Repartitioned1);
        assert_eq!(variants[2], HybridVariant::RestCapable { max_lifting: 0.3 });
    }
}
