use super::params::Forcefield;
use super::potentials::{combine_epsilon, combine_sigma};
use super::system::{
    HarmonicAngle, HarmonicBond, NonbondedException, NonbondedParticle, ParametrizedSystem,
    PeriodicTorsion,
};
use crate::core::models::system::{MolecularTopology, TopologyError};
use crate::core::models::topology::BondOrder;
use crate::core::topology::registry::ResidueTemplate;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum ParameterizationError {
    #[error("No template found for residue {residue} {number}")]
    MissingTemplate { residue: String, number: String },
    #[error(
        "Residue {residue} {number} does not match its template (missing: {missing:?}, unexpected: {unexpected:?})"
    )]
    TemplateMismatch {
        residue: String,
        number: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("Unknown atom type '{atom_type}' in template of residue {residue}")]
    UnknownAtomType { atom_type: String, residue: String },
    #[error("Missing bond parameters for types {types}")]
    MissingBondParameters { types: String },
    #[error("Missing angle parameters for types {types}")]
    MissingAngleParameters { types: String },
    #[error("Unknown small-molecule force field '{0}'")]
    UnknownSmallMoleculeForcefield(String),
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}

/// Produces parametrized systems from topologies.
///
/// This is the seam to an external parametrization toolkit.
pub trait SystemGenerator {
    /// Adds the bonds implied by residue templates, including links between
    /// consecutive residues of a chain. Residues without a template are skipped.
    fn assign_bonds(&self, topology: &mut MolecularTopology) -> Result<(), ParameterizationError>;

    /// The template that would be used for residues of this name.
    fn residue_template(&self, residue_name: &str) -> Option<&ResidueTemplate>;

    /// Parametrizes every atom and bonded term of the topology.
    fn create_system(&self, topology: &MolecularTopology) -> Result<ParametrizedSystem, ParameterizationError>;
}

/// Template-matching parametrization from a merged [`Forcefield`].
#[derive(Debug, Clone)]
pub struct TemplateSystemGenerator {
    forcefield: Forcefield,
    small_molecule_forcefield: Option<String>,
}

impl TemplateSystemGenerator {
    /// Creates a generator. When `small_molecule_forcefield` is given, residues
    /// without a biopolymer template are looked up in that small-molecule table.
    pub fn new(
        forcefield: Forcefield,
        small_molecule_forcefield: Option<&str>,
    ) -> Result<Self, ParameterizationError> {
        if let Some(identifier) = small_molecule_forcefield {
            if forcefield.small_molecule_templates(identifier).is_none() {
                return Err(ParameterizationError::UnknownSmallMoleculeForcefield(
                    identifier.to_string(),
                ));
            }
        }
        Ok(Self {
            forcefield,
            small_molecule_forcefield: small_molecule_forcefield.map(str::to_string),
        })
    }

    pub fn forcefield(&self) -> &Forcefield {
        &self.forcefield
    }

    fn atom_types_of(
        &self,
        topology: &MolecularTopology,
    ) -> Result<Vec<String>, ParameterizationError> {
        let mut types = vec![String::new(); topology.atom_count()];
        for (_, residue) in topology.residues_iter() {
            let template = self.residue_template(&residue.name).ok_or_else(|| {
                ParameterizationError::MissingTemplate {
                    residue: residue.name.clone(),
                    number: residue.number.clone(),
                }
            })?;

            let missing: Vec<String> = template
                .atom_names()
                .filter(|name| residue.atom_by_name(name).is_none())
                .map(str::to_string)
                .collect();
            let unexpected: Vec<String> = residue
                .atoms()
                .iter()
                .filter_map(|&index| topology.atom(index))
                .filter(|atom| !template.has_atom(&atom.name))
                .map(|atom| atom.name.clone())
                .collect();
            if !missing.is_empty() || !unexpected.is_empty() {
                return Err(ParameterizationError::TemplateMismatch {
                    residue: residue.name.clone(),
                    number: residue.number.clone(),
                    missing,
                    unexpected,
                });
            }

            for template_atom in &template.atoms {
                if let Some(index) = residue.atom_by_name(&template_atom.name) {
                    types[index] = template_atom.atom_type.clone();
                }
            }
        }
        Ok(types)
    }

    fn particles(
        &self,
        topology: &MolecularTopology,
        types: &[String],
    ) -> Result<Vec<NonbondedParticle>, ParameterizationError> {
        topology
            .atoms()
            .iter()
            .enumerate()
            .map(|(index, atom)| {
                let residue = topology.residue(atom.residue_id).ok_or(TopologyError::UnknownResidue)?;
                let template = self.residue_template(&residue.name).ok_or_else(|| {
                    ParameterizationError::MissingTemplate {
                        residue: residue.name.clone(),
                        number: residue.number.clone(),
                    }
                })?;
                let charge = template.atom(&atom.name).map_or(0.0, |a| a.charge);
                let params = self.forcefield.atom_type(&types[index]).ok_or_else(|| {
                    ParameterizationError::UnknownAtomType {
                        atom_type: types[index].clone(),
                        residue: residue.name.clone(),
                    }
                })?;
                Ok(NonbondedParticle::new(charge, params.sigma, params.epsilon))
            })
            .collect()
    }
}

impl SystemGenerator for TemplateSystemGenerator {
    fn assign_bonds(&self, topology: &mut MolecularTopology) -> Result<(), ParameterizationError> {
        let mut pending = Vec::new();
        for (_, chain) in topology.chains_iter() {
            let mut previous_tail: Option<usize> = None;
            for residue_id in chain.residues() {
                let Some(residue) = topology.residue(*residue_id) else {
                    continue;
                };
                let Some(template) = self.residue_template(&residue.name) else {
                    previous_tail = None;
                    continue;
                };
                for [a, b] in &template.bonds {
                    if let (Some(i), Some(j)) = (residue.atom_by_name(a), residue.atom_by_name(b)) {
                        pending.push((i, j));
                    }
                }
                let head = template.head_atom().and_then(|name| residue.atom_by_name(name));
                if let (Some(tail), Some(head)) = (previous_tail, head) {
                    pending.push((tail, head));
                }
                previous_tail = template.tail_atom().and_then(|name| residue.atom_by_name(name));
            }
        }
        debug!(bonds = pending.len(), "Assigning template bonds.");
        for (i, j) in pending {
            topology.add_bond(i, j, BondOrder::Single)?;
        }
        Ok(())
    }

    fn residue_template(&self, residue_name: &str) -> Option<&ResidueTemplate> {
        self.forcefield.residues.get(residue_name).or_else(|| {
            self.small_molecule_forcefield
                .as_deref()
                .and_then(|identifier| self.forcefield.small_molecule_templates(identifier))
                .and_then(|table| table.get(residue_name))
        })
    }

    fn create_system(&self, topology: &MolecularTopology) -> Result<ParametrizedSystem, ParameterizationError> {
        let types = self.atom_types_of(topology)?;
        let particles = self.particles(topology, &types)?;

        let mut bonds = Vec::with_capacity(topology.bonds().len());
        for bond in topology.bonds() {
            let [i, j] = [bond.atom1, bond.atom2];
            let params = self.forcefield.bond_type(&types[i], &types[j]).ok_or_else(|| {
                ParameterizationError::MissingBondParameters {
                    types: format!("{}-{}", types[i], types[j]),
                }
            })?;
            bonds.push(HarmonicBond {
                atoms: [i, j],
                length: params.length,
                k: params.k,
            });
        }

        let mut angles = Vec::new();
        for [i, j, k] in topology.angles() {
            let params = self
                .forcefield
                .angle_type(&types[i], &types[j], &types[k])
                .ok_or_else(|| ParameterizationError::MissingAngleParameters {
                    types: format!("{}-{}-{}", types[i], types[j], types[k]),
                })?;
            angles.push(HarmonicAngle {
                atoms: [i, j, k],
                angle: params.angle,
                k: params.k,
            });
        }

        let mut torsions = Vec::new();
        for [i, j, k, l] in topology.proper_torsions() {
            if let Some(params) = self
                .forcefield
                .torsion_type(&types[i], &types[j], &types[k], &types[l])
            {
                torsions.extend(params.terms.iter().map(|term| PeriodicTorsion {
                    atoms: [i, j, k, l],
                    periodicity: term.periodicity,
                    phase: term.phase,
                    k: term.k,
                }));
            }
        }

        let pairs = topology.bonded_pairs();
        let scaling = self.forcefield.scaling;
        let mut exceptions: Vec<NonbondedException> = pairs
            .one_two
            .iter()
            .chain(pairs.one_three.iter())
            .map(|&(i, j)| NonbondedException {
                atoms: [i, j],
                charge_product: 0.0,
                sigma: 1.0,
                epsilon: 0.0,
            })
            .collect();
        exceptions.extend(pairs.one_four.iter().map(|&(i, j)| {
            let (pi, pj) = (particles[i], particles[j]);
            NonbondedException {
                atoms: [i, j],
                charge_product: scaling.coulomb14_scale * pi.charge * pj.charge,
                sigma: combine_sigma(pi.sigma, pj.sigma),
                epsilon: scaling.lj14_scale * combine_epsilon(pi.epsilon, pj.epsilon),
            }
        }));

        debug!(
            particles = particles.len(),
            bonds = bonds.len(),
            angles = angles.len(),
            torsions = torsions.len(),
            exceptions = exceptions.len(),
            "Created parametrized system."
        );

        Ok(ParametrizedSystem {
            particles,
            exceptions,
            bonds,
            angles,
            torsions,
            box_vectors: topology.box_vectors().copied(),
        })
    }
}
