use super::config::{ConfigError, MappingOptions, MutationSite};
use super::error::EngineError;
use super::transformation::{AtomMap, MutationTransformation};
use crate::core::forcefield::parameterization::SystemGenerator;
use crate::core::models::Coordinates;
use crate::core::models::ids::ResidueId;
use crate::core::models::system::MolecularTopology;
use nalgebra::Point3;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, instrument};

/// Atoms mapped between the old and new residue whenever both carry them.
pub const BACKBONE_ATOM_NAMES: [&str; 6] = ["N", "CA", "C", "O", "H", "HA"];
pub const BETA_CARBON_NAME: &str = "CB";

/// Builds the old and new endpoints of a single-residue substitution.
pub struct PointMutationEngine<'g, G: SystemGenerator + ?Sized> {
    generator: &'g G,
    site: MutationSite,
    options: MappingOptions,
}

impl<'g, G: SystemGenerator + ?Sized> PointMutationEngine<'g, G> {
    /// Fails unless exactly one site is given.
    pub fn new(
        generator: &'g G,
        sites: &[MutationSite],
        options: MappingOptions,
    ) -> Result<Self, ConfigError> {
        let site = match sites {
            [] => return Err(ConfigError::MissingParameter("mutation")),
            [site] => site.clone(),
            _ => return Err(ConfigError::MultipleMutations(sites.len())),
        };
        Ok(Self {
            generator,
            site,
            options,
        })
    }

    pub fn site(&self) -> &MutationSite {
        &self.site
    }

    fn locate(&self, topology: &MolecularTopology) -> Result<ResidueId, ConfigError> {
        let chain = topology
            .find_chain(&self.site.chain_id)
            .ok_or_else(|| ConfigError::ChainNotFound(self.site.chain_id.clone()))?;
        topology
            .find_residue(chain, &self.site.residue_id)
            .ok_or_else(|| ConfigError::ResidueNotFound {
                chain: self.site.chain_id.clone(),
                residue: self.site.residue_id.clone(),
            })
    }

    /// Applies the optional residue rename, dropping atoms the renamed template lacks.
    fn prepare_old(
        &self,
        topology: &MolecularTopology,
        positions: &[Point3<f64>],
    ) -> Result<(MolecularTopology, Coordinates), EngineError> {
        let Some(name) = self.options.old_residue.as_deref() else {
            return Ok((topology.clone(), positions.to_vec()));
        };
        let template = self
            .generator
            .residue_template(name)
            .ok_or_else(|| ConfigError::UnknownResidueName(name.to_string()))?;
        let residue_id = self.locate(topology)?;
        let residue = topology
            .residue(residue_id)
            .ok_or_else(|| EngineError::Internal("located residue vanished".to_string()))?;

        let removed: HashSet<usize> = residue
            .atoms()
            .iter()
            .copied()
            .filter(|&i| topology.atom(i).is_some_and(|a| !template.has_atom(&a.name)))
            .collect();
        let (mut pruned, index_map) = topology.without_atoms(&removed)?;
        let pruned_positions = index_map
            .iter()
            .zip(positions)
            .filter_map(|(kept, p)| kept.map(|_| *p))
            .collect();
        let renamed = self.locate(&pruned)?;
        pruned.rename_residue(renamed, name)?;
        info!(
            residue = name,
            removed = removed.len(),
            "Renamed the residue to be mutated."
        );
        Ok((pruned, pruned_positions))
    }

    /// Builds the transformation and returns it with the (possibly pruned) old positions.
    #[instrument(skip_all, name = "topology_mapping", fields(chain = %self.site.chain_id, residue = %self.site.residue_id, target = %self.site.target))]
    pub fn propose(
        &self,
        topology: &MolecularTopology,
        positions: &[Point3<f64>],
    ) -> Result<(MutationTransformation, Coordinates), EngineError> {
        if positions.len() != topology.atom_count() {
            return Err(EngineError::Internal(format!(
                "{} positions given for {} atoms",
                positions.len(),
                topology.atom_count()
            )));
        }
        self.locate(topology)?;

        let (mut old_topology, old_positions) = self.prepare_old(topology, positions)?;
        self.generator.assign_bonds(&mut old_topology)?;
        let mutated = self.locate(&old_topology)?;
        let old_system = self.generator.create_system(&old_topology)?;

        let target = self
            .generator
            .residue_template(&self.site.target)
            .ok_or_else(|| ConfigError::UnknownResidueName(self.site.target.clone()))?;

        let mut new_topology = MolecularTopology::new();
        let mut environment: BTreeMap<usize, usize> = BTreeMap::new();
        let mut new_residue_atoms = Vec::new();
        for (_, chain) in old_topology.chains_iter() {
            let chain_id = new_topology.add_chain(&chain.id, chain.chain_type);
            for residue_id in chain.residues() {
                let Some(residue) = old_topology.residue(*residue_id) else {
                    continue;
                };
                if *residue_id == mutated {
                    let new_residue = new_topology.add_residue(chain_id, &residue.number, &self.site.target)?;
                    for atom in &target.atoms {
                        new_residue_atoms.push(new_topology.add_atom(new_residue, &atom.name, atom.element())?);
                    }
                } else {
                    let new_residue = new_topology.add_residue(chain_id, &residue.number, &residue.name)?;
                    for &index in residue.atoms() {
                        if let Some(atom) = old_topology.atom(index) {
                            let copied = new_topology.add_atom(new_residue, &atom.name, atom.element)?;
                            environment.insert(index, copied);
                        }
                    }
                }
            }
        }
        for bond in old_topology.bonds() {
            if let (Some(&a), Some(&b)) = (environment.get(&bond.atom1), environment.get(&bond.atom2)) {
                new_topology.add_bond(a, b, bond.order)?;
            }
        }
        self.generator.assign_bonds(&mut new_topology)?;
        new_topology.set_box_vectors(old_topology.box_vectors().copied());

        let old_residue = old_topology
            .residue(mutated)
            .ok_or_else(|| EngineError::Internal("mutated residue vanished".to_string()))?;
        let old_residue_atoms = old_residue.atoms().to_vec();
        let new_name_to_index: BTreeMap<&str, usize> = target
            .atoms
            .iter()
            .map(|a| a.name.as_str())
            .zip(new_residue_atoms.iter().copied())
            .collect();

        let mut core_pairs: BTreeMap<usize, usize> = BTreeMap::new();
        let mut default_names: Vec<&str> = BACKBONE_ATOM_NAMES.to_vec();
        if !self.options.demap_cb {
            default_names.push(BETA_CARBON_NAME);
        }
        for name in default_names {
            if let (Some(old), Some(&new)) = (old_residue.atom_by_name(name), new_name_to_index.get(name)) {
                core_pairs.insert(old, new);
            }
        }
        for (old_name, new_name) in &self.options.extra_sidechain_map {
            let old = old_residue.atom_by_name(old_name).ok_or_else(|| {
                ConfigError::UnknownSidechainAtom {
                    residue: old_residue.name.clone(),
                    atom: old_name.clone(),
                }
            })?;
            let new = new_name_to_index.get(new_name.as_str()).copied().ok_or_else(|| {
                ConfigError::UnknownSidechainAtom {
                    residue: self.site.target.clone(),
                    atom: new_name.clone(),
                }
            })?;
            core_pairs.retain(|_, mapped| *mapped != new);
            core_pairs.insert(old, new);
        }

        let core_old: BTreeSet<usize> = core_pairs.keys().copied().collect();
        let mut old_to_new = environment;
        old_to_new.extend(core_pairs);
        let atom_map = AtomMap::new(
            old_topology.atom_count(),
            new_topology.atom_count(),
            old_to_new,
            core_old,
        )?;

        let new_system = self.generator.create_system(&new_topology)?;
        info!(
            old_atoms = atom_map.old_count(),
            new_atoms = atom_map.new_count(),
            core = atom_map.core_old().len(),
            unique_old = atom_map.unique_old().len(),
            unique_new = atom_map.unique_new().len(),
            "Built atom map."
        );
        debug!(old_residue = %old_residue.name, "Old residue resolved.");

        let transformation = MutationTransformation::new(
            self.site.clone(),
            old_topology,
            new_topology,
            old_system,
            new_system,
            atom_map,
            old_residue_atoms,
            new_residue_atoms,
        );
        Ok((transformation, old_positions))
    }
}
