use crate::core::topology::registry::{ResidueTemplate, TemplateRegistry};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Type name that matches any atom type in torsion definitions.
pub const WILDCARD_TYPE: &str = "X";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AtomTypeParams {
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BondType {
    pub types: [String; 2],
    pub length: f64,
    pub k: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AngleType {
    pub types: [String; 3],
    pub angle: f64,
    pub k: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TorsionTerm {
    pub periodicity: u32,
    pub phase: f64,
    pub k: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TorsionType {
    pub types: [String; 4],
    pub terms: Vec<TorsionTerm>,
}

impl TorsionType {
    fn wildcard_count(&self) -> usize {
        self.types.iter().filter(|t| *t == WILDCARD_TYPE).count()
    }

    fn matches(&self, types: [&str; 4]) -> bool {
        let fits = |pattern: &[String; 4], candidate: [&str; 4]| {
            pattern
                .iter()
                .zip(candidate)
                .all(|(p, c)| p == WILDCARD_TYPE || p == c)
        };
        let [a, b, c, d] = types;
        fits(&self.types, [a, b, c, d]) || fits(&self.types, [d, c, b, a])
    }
}

/// Scale factors applied to nonbonded interactions between atoms three bonds apart.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OneFourScaling {
    #[serde(default = "default_coulomb14_scale")]
    pub coulomb14_scale: f64,
    #[serde(default = "default_lj14_scale")]
    pub lj14_scale: f64,
}

fn default_coulomb14_scale() -> f64 {
    0.833_333_333_3
}

fn default_lj14_scale() -> f64 {
    0.5
}

impl Default for OneFourScaling {
    fn default() -> Self {
        Self {
            coulomb14_scale: default_coulomb14_scale(),
            lj14_scale: default_lj14_scale(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ForcefieldFile {
    #[serde(default)]
    nonbonded: Option<OneFourScaling>,
    #[serde(default)]
    atom_types: HashMap<String, AtomTypeParams>,
    #[serde(default)]
    residues: HashMap<String, ResidueTemplate>,
    #[serde(default)]
    bonds: Vec<BondType>,
    #[serde(default)]
    angles: Vec<AngleType>,
    #[serde(default)]
    torsions: Vec<TorsionType>,
    #[serde(default)]
    small_molecules: HashMap<String, HashMap<String, ResidueTemplate>>,
}

/// Force-field parameters merged from one or more TOML files.
///
/// Files are merged in order: atom types and templates of later files replace
/// those of earlier ones, and valence types defined later take precedence when
/// looked up.
#[derive(Debug, Clone, Default)]
pub struct Forcefield {
    pub scaling: OneFourScaling,
    pub atom_types: HashMap<String, AtomTypeParams>,
    pub residues: TemplateRegistry,
    pub small_molecules: HashMap<String, TemplateRegistry>,
    bond_types: Vec<BondType>,
    angle_types: Vec<AngleType>,
    torsion_types: Vec<TorsionType>,
}

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("No force-field files were given")]
    NoFiles,
}

impl Forcefield {
    /// Loads and merges the given force-field files in order.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ParamLoadError> {
        if paths.is_empty() {
            return Err(ParamLoadError::NoFiles);
        }
        let mut forcefield = Self::default();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
                path: path.to_string_lossy().to_string(),
                source: e,
            })?;
            forcefield.merge_str(&content, path)?;
        }
        Ok(forcefield)
    }

    /// Parses one force-field document and merges it on top of the current contents.
    pub fn merge_str(&mut self, content: &str, origin: &Path) -> Result<(), ParamLoadError> {
        let file: ForcefieldFile = toml::from_str(content).map_err(|e| ParamLoadError::Toml {
            path: origin.to_string_lossy().to_string(),
            source: e,
        })?;
        if let Some(scaling) = file.nonbonded {
            self.scaling = scaling;
        }
        self.atom_types.extend(file.atom_types);
        self.residues.extend(file.residues);
        for (identifier, templates) in file.small_molecules {
            self.small_molecules
                .entry(identifier)
                .or_default()
                .extend(templates);
        }
        self.bond_types.extend(file.bonds);
        self.angle_types.extend(file.angles);
        self.torsion_types.extend(file.torsions);
        Ok(())
    }

    pub fn atom_type(&self, name: &str) -> Option<&AtomTypeParams> {
        self.atom_types.get(name)
    }

    pub fn bond_type(&self, a: &str, b: &str) -> Option<&BondType> {
        self.bond_types.iter().rev().find(|bond| {
            let [x, y] = &bond.types;
            (x == a && y == b) || (x == b && y == a)
        })
    }

    pub fn angle_type(&self, a: &str, center: &str, c: &str) -> Option<&AngleType> {
        self.angle_types.iter().rev().find(|angle| {
            let [x, y, z] = &angle.types;
            y == center && ((x == a && z == c) || (x == c && z == a))
        })
    }

    /// The most specific torsion type matching `a-b-c-d` in either direction.
    ///
    /// Fewer wildcards win; among equally specific matches the last defined wins.
    pub fn torsion_type(&self, a: &str, b: &str, c: &str, d: &str) -> Option<&TorsionType> {
        self.torsion_types
            .iter()
            .enumerate()
            .filter(|(_, torsion)| torsion.matches([a, b, c, d]))
            .min_by_key(|(order, torsion)| (torsion.wildcard_count(), usize::MAX - order))
            .map(|(_, torsion)| torsion)
    }

    /// The template table for a small-molecule force-field identifier.
    pub fn small_molecule_templates(&self, identifier: &str) -> Option<&TemplateRegistry> {
        self.small_molecules.get(identifier)
    }
}

/// Resolves force-field file names relative to a base directory.
pub fn resolve_forcefield_paths(base: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                base.join(file)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const PROTEIN_FF: &str = r#"
        [nonbonded]
        coulomb14_scale = 0.8333333333
        lj14_scale = 0.5

        [atom_types.CT]
        sigma = 0.339967
        epsilon = 0.457730

        [atom_types.HC]
        sigma = 0.264953
        epsilon = 0.065688

        [residues.MET]
        atoms = [{ name = "C1", type = "CT", charge = -0.3 }, { name = "H1", type = "HC", charge = 0.3 }]
        bonds = [["C1", "H1"]]

        [[bonds]]
        types = ["CT", "HC"]
        length = 0.109
        k = 284512.0

        [[angles]]
        types = ["HC", "CT", "HC"]
        angle = 1.881
        k = 276.144

        [[torsions]]
        types = ["X", "CT", "CT", "X"]
        terms = [{ periodicity = 3, phase = 0.0, k = 0.65084 }]

        [[torsions]]
        types = ["HC", "CT", "CT", "HC"]
        terms = [{ periodicity = 3, phase = 0.0, k = 0.6276 }]
    "#;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn load_reads_all_sections_of_a_single_file() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "protein.toml", PROTEIN_FF);

        let ff = Forcefield::load(&[path]).unwrap();

        assert_eq!(ff.atom_types.len(), 2);
        assert_eq!(ff.atom_type("CT").unwrap().sigma, 0.339967);
        assert!(ff.residues.get("MET").is_some());
        assert_eq!(ff.scaling.lj14_scale, 0.5);
        assert_eq!(ff.bond_type("HC", "CT").unwrap().length, 0.109);
        assert_eq!(ff.angle_type("HC", "CT", "HC").unwrap().k, 276.144);
    }

    #[test]
    fn later_files_override_earlier_definitions() {
        let dir = tempdir().unwrap();
        let first = write_file(dir.path(), "a.toml", PROTEIN_FF);
        let second = write_file(
            dir.path(),
            "b.toml",
            r#"
            [atom_types.CT]
            sigma = 0.35
            epsilon = 0.3

            [[bonds]]
            types = ["HC", "CT"]
            length = 0.108
            k = 300000.0
            "#,
        );

        let ff = Forcefield::load(&[first, second]).unwrap();

        assert_eq!(ff.atom_type("CT").unwrap().sigma, 0.35);
        assert_eq!(ff.atom_type("HC").unwrap().sigma, 0.264953);
        assert_eq!(ff.bond_type("CT", "HC").unwrap().length, 0.108);
    }

    #[test]
    fn torsion_lookup_prefers_specific_over_wildcard() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "protein.toml", PROTEIN_FF);
        let ff = Forcefield::load(&[path]).unwrap();

        let specific = ff.torsion_type("HC", "CT", "CT", "HC").unwrap();
        assert_eq!(specific.terms[0].k, 0.6276);

        let generic = ff.torsion_type("N", "CT", "CT", "HC").unwrap();
        assert_eq!(generic.terms[0].k, 0.65084);

        assert!(ff.torsion_type("N", "C", "CT", "HC").is_none());
    }

    #[test]
    fn small_molecule_tables_merge_per_identifier() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "ligands.toml",
            r#"
            [small_molecules.gaff.MOL]
            atoms = [{ name = "C1", type = "CT", charge = 0.0 }]
            "#,
        );
        let ff = Forcefield::load(&[path]).unwrap();
        let table = ff.small_molecule_templates("gaff").unwrap();
        assert!(table.contains("MOL"));
        assert!(ff.small_molecule_templates("openff").is_none());
    }

    #[test]
    fn default_scaling_applies_without_nonbonded_section() {
        let mut ff = Forcefield::default();
        ff.merge_str("[atom_types.OW]\nsigma = 0.315\nepsilon = 0.636", Path::new("mem"))
            .unwrap();
        assert!((ff.scaling.coulomb14_scale - 0.8333333333).abs() < 1e-9);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let result = Forcefield::load(&[PathBuf::from("non_existent.toml")]);
        assert!(matches!(result, Err(ParamLoadError::Io { .. })));
    }

    #[test]
    fn load_fails_for_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "bad.toml", "[atom_types.CT\nsigma = 1");
        let result = Forcefield::load(&[path]);
        assert!(matches!(result, Err(ParamLoadError::Toml { .. })));
    }

    #[test]
    fn load_fails_without_files() {
        let result = Forcefield::load::<PathBuf>(&[]);
        assert!(matches!(result, Err(ParamLoadError::NoFiles)));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/data/ff");
        let resolved = resolve_forcefield_paths(
            base,
            &[PathBuf::from("amber.toml"), PathBuf::from("/abs/tip3p.toml")],
        );
        assert_eq!(resolved[0], PathBuf::from("/data/ff/amber.toml"));
        assert_eq!(resolved[1], PathBuf::from("/abs/tip3p.toml"));
    }
}
