use crate::cli::MutateArgs;
use crate::config::{PartialRunConfig, RunConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use alchemut::core::forcefield::energy::ReferenceEvaluator;
use alchemut::core::io::{self as structure_io, IoError, StructureFormat, pdb::PdbFile};
use alchemut::core::models::Coordinates;
use alchemut::core::models::system::MolecularTopology;
use alchemut::core::solvation::LatticeSolvator;
use alchemut::engine::config::{HybridSettings, MutationSite};
use alchemut::engine::progress::{PipelineObserver, ProgressReporter};
use alchemut::workflows::mutate::{self, Collaborators, MutationOutputs, Phase, PhaseOutput, Structure};
use nalgebra::Point3;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{Dispatch, info, warn};

pub const SUMMARY_FILE_NAME: &str = "summary.toml";

#[derive(Debug, Serialize)]
struct RunSummary {
    temperature: f64,
    site: MutationSite,
    phases: Vec<PhaseSummary>,
}

#[derive(Debug, Serialize)]
struct PhaseSummary {
    phase: &'static str,
    old_atoms: usize,
    new_atoms: usize,
    mapped_atoms: usize,
    unique_old_atoms: usize,
    unique_new_atoms: usize,
    repaired_old_particles: usize,
    repaired_new_particles: usize,
    logp_forward: f64,
    logp_reverse: f64,
    added_valence_energy: Option<f64>,
    subtracted_valence_energy: Option<f64>,
    charge_difference: Option<i32>,
    converted_waters: Vec<usize>,
    variants: Vec<VariantSummary>,
}

#[derive(Debug, Serialize)]
struct VariantSummary {
    name: &'static str,
    atoms: usize,
    rest_atoms: usize,
    settings: HybridSettings,
    validation: Vec<ValidationSummary>,
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    endstate: u8,
    discrepancy: f64,
    threshold: f64,
    passed: bool,
}

fn summarize(config: &RunConfig, outputs: &MutationOutputs) -> RunSummary {
    let phases = outputs
        .phases()
        .map(|(phase, output)| summarize_phase(phase, output, outputs))
        .collect();
    RunSummary {
        temperature: config.mutation.temperature,
        site: config.mutation.site.clone(),
        phases,
    }
}

fn summarize_phase(phase: Phase, output: &PhaseOutput, outputs: &MutationOutputs) -> PhaseSummary {
    let map = output.transformation().atom_map();
    let proposal = output.proposal();
    let (repaired_old_particles, repaired_new_particles) = output.repaired_particles();
    let variants = outputs
        .hybrids()
        .filter(|(p, _, _)| *p == phase)
        .map(|(_, key, hybrid)| VariantSummary {
            name: key.name(),
            atoms: hybrid.atom_count(),
            rest_atoms: hybrid.rest_region().len(),
            settings: hybrid.settings().clone(),
            validation: outputs
                .reports(phase, key)
                .iter()
                .map(|report| ValidationSummary {
                    endstate: report.endstate.index(),
                    discrepancy: report.discrepancy,
                    threshold: report.threshold,
                    passed: report.passed(),
                })
                .collect(),
        })
        .collect();
    PhaseSummary {
        phase: phase.name(),
        old_atoms: map.old_count(),
        new_atoms: map.new_count(),
        mapped_atoms: map.mapped_count(),
        unique_old_atoms: map.unique_old().len(),
        unique_new_atoms: map.unique_new().len(),
        repaired_old_particles,
        repaired_new_particles,
        logp_forward: proposal.logp_forward,
        logp_reverse: proposal.logp_reverse,
        added_valence_energy: proposal.added_valence_energy().value(),
        subtracted_valence_energy: proposal.subtracted_valence_energy().value(),
        charge_difference: output.ionization().map(|plan| plan.charge_difference),
        converted_waters: output
            .ionization()
            .map(|plan| plan.conversions.iter().map(|c| c.oxygen).collect())
            .unwrap_or_default(),
        variants,
    }
}

/// Fails before any parsing when a structure file has an unusable extension.
fn check_inputs(args: &MutateArgs) -> Result<()> {
    let format = StructureFormat::from_path(&args.protein)?;
    if !format.supports_biomolecules() {
        return Err(CliError::Argument(format!(
            "The {} format cannot hold the biomolecule ({})",
            format,
            args.protein.display()
        )));
    }
    if let Some(ligand) = &args.ligand {
        StructureFormat::from_path(ligand)?;
    }
    Ok(())
}

fn read_structure(
    path: &Path,
    read: impl FnOnce(&Path) -> std::result::Result<(MolecularTopology, Coordinates), IoError>,
) -> Result<Structure> {
    info!("Loading structure from {:?}", path);
    let (topology, positions) = read(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    Ok(Structure::new(topology, positions))
}

fn write_pdb(path: &Path, topology: &MolecularTopology, positions: &[Point3<f64>]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    PdbFile::write_to(topology, positions, &mut file).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

fn write_outputs(output_dir: &Path, config: &RunConfig, outputs: &MutationOutputs) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();
    for (phase, output) in outputs.phases() {
        let transformation = output.transformation();
        let old_path = output_dir.join(format!("{}_old.pdb", phase.name()));
        write_pdb(&old_path, transformation.old_topology(), output.old_positions())?;
        let new_path = output_dir.join(format!("{}_new.pdb", phase.name()));
        write_pdb(&new_path, transformation.new_topology(), output.new_positions())?;
        written.extend([old_path, new_path]);
    }

    let summary = toml::to_string_pretty(&summarize(config, outputs))
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to serialize the run summary: {}", e)))?;
    let summary_path = output_dir.join(SUMMARY_FILE_NAME);
    std::fs::write(&summary_path, summary)?;
    written.push(summary_path);
    Ok(written)
}

pub fn run(args: MutateArgs, dispatch: Dispatch) -> Result<()> {
    check_inputs(&args)?;

    info!("Merging configuration from file and CLI arguments...");
    let config = PartialRunConfig::load(&args)?.merge_with_cli(&args)?;

    let protein = read_structure(&args.protein, structure_io::read_biomolecule)?;
    let ligand = args
        .ligand
        .as_deref()
        .map(|path| {
            read_structure(path, |p| {
                structure_io::read_small_molecule(p, args.ligand_index, &args.ligand_name)
            })
        })
        .transpose()?;

    let generator = mutate::load_generator(&config.mutation.forcefield)?;
    let solvator = config
        .engine_version
        .map(LatticeSolvator::new)
        .unwrap_or_default();
    let evaluator = ReferenceEvaluator::new();
    let collaborators = Collaborators {
        generator: &generator,
        solvator: &solvator,
        evaluator: &evaluator,
    };

    let progress_handler = CliProgressHandler::new();
    let observer = PipelineObserver::new()
        .with_reporter(ProgressReporter::with_callback(progress_handler.get_callback()))
        .with_dispatch(dispatch);

    let site = &config.mutation.site;
    println!(
        "Mutating {}:{} to {}...",
        site.chain_id, site.residue_id, site.target
    );
    info!("Invoking the core mutation workflow...");
    let outputs = mutate::run(&protein, ligand.as_ref(), &config.mutation, &collaborators, &observer)?;

    if outputs.hybrids().next().is_none() {
        warn!("No hybrid variant was selected; only endpoint structures are written.");
        println!("Warning: no hybrid variant was selected.");
    }
    for (phase, key, hybrid) in outputs.hybrids() {
        let worst = outputs
            .reports(phase, key)
            .iter()
            .map(|r| r.discrepancy.abs())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));
        match worst {
            Some(d) => println!(
                "✓ {} / {}: {} atoms, endstate discrepancy {:.2e} kT",
                phase,
                key,
                hybrid.atom_count(),
                d
            ),
            None => println!("  {} / {}: {} atoms (not validated)", phase, key, hybrid.atom_count()),
        }
    }

    let written = write_outputs(&args.output, &config, &outputs)?;
    for path in &written {
        info!("Wrote {:?}", path);
    }
    println!("Results written to: {}", args.output.display());
    Ok(())
}
