//! Provides input/output functionality for molecular structure files.
//!
//! Structure parsing sits outside the mutation pipeline proper; the readers here turn
//! PDB, mmCIF and SDF files into a [`MolecularTopology`] plus coordinates in
//! nanometres and nothing more. Bonds present in the file are kept, standard residue
//! connectivity is added later from force-field templates.
//!
//! The format is chosen from the file extension with [`StructureFormat::from_path`],
//! which fails before any parsing is attempted.

use crate::core::models::Coordinates;
use crate::core::models::chain::ChainType;
use crate::core::models::residue::AminoAcidType;
use crate::core::models::system::{MolecularTopology, TopologyError};
use phf::{Set, phf_set};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod cif;
pub mod pdb;
pub mod sdf;
pub mod traits;

/// Conversion factor from the Ångström units of structure files to nanometres.
pub const ANGSTROM_TO_NM: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureFormat {
    Pdb,
    Cif,
    Sdf,
}

impl fmt::Display for StructureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pdb => "PDB",
            Self::Cif => "mmCIF",
            Self::Sdf => "SDF",
        })
    }
}

impl StructureFormat {
    /// Resolves the format from a file's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdb" | "ent" => Ok(Self::Pdb),
            "cif" | "mmcif" => Ok(Self::Cif),
            "sdf" | "mol" => Ok(Self::Sdf),
            _ => Err(IoError::UnsupportedExtension {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }

    /// Whether the format can describe a polymer with residues and chains.
    pub fn supports_biomolecules(&self) -> bool {
        matches!(self, Self::Pdb | Self::Cif)
    }
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse {format} data: {details} (at line ~{line})")]
    Parse {
        format: StructureFormat,
        line: usize,
        details: String,
    },

    #[error("unsupported structure file extension '{extension}' for {path}", path = path.display())]
    UnsupportedExtension { path: PathBuf, extension: String },

    #[error("the {format} format cannot be used for {role}")]
    UnsupportedRole {
        format: StructureFormat,
        role: &'static str,
    },

    #[error("entry {index} requested but the file holds only {available} entries")]
    EntryOutOfRange { index: usize, available: usize },

    #[error("inconsistent structure: {0}")]
    Topology(#[from] TopologyError),
}

impl IoError {
    pub fn parse(format: StructureFormat, line: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            format,
            line,
            details: details.into(),
        }
    }
}

/// Residue names of terminal caps that belong to a protein chain.
static CAP_RESIDUE_NAMES: Set<&'static str> = phf_set! { "ACE", "NME", "NMA", "NH2" };
/// Residue names of monoatomic ions.
static ION_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "NA", "CL", "K", "MG", "CA", "ZN", "Na+", "Cl-",
};

/// Classifies the chain a residue of the given name starts.
pub(crate) fn chain_type_for_residue(name: &str) -> ChainType {
    if name.parse::<AminoAcidType>().is_ok() || CAP_RESIDUE_NAMES.contains(name) {
        ChainType::Protein
    } else if crate::core::models::residue::WATER_RESIDUE_NAMES.contains(&name) {
        ChainType::Water
    } else if ION_RESIDUE_NAMES.contains(name) {
        ChainType::Ion
    } else {
        ChainType::Ligand
    }
}

/// Reads the biomolecule of a phase from a PDB or mmCIF file.
pub fn read_biomolecule(path: &Path) -> Result<(MolecularTopology, Coordinates), IoError> {
    use traits::MolecularFile;
    match StructureFormat::from_path(path)? {
        StructureFormat::Pdb => pdb::PdbFile::read_from_path(path).map(|(t, c, _)| (t, c)),
        StructureFormat::Cif => cif::CifFile::read_from_path(path).map(|(t, c, _)| (t, c)),
        format @ StructureFormat::Sdf => Err(IoError::UnsupportedRole {
            format,
            role: "the biomolecule",
        }),
    }
}

/// Reads a small-molecule binding partner.
///
/// SDF files may hold several entries; `entry_index` selects one (zero-based). The
/// index is ignored for single-structure formats.
pub fn read_small_molecule(
    path: &Path,
    entry_index: usize,
    residue_name: &str,
) -> Result<(MolecularTopology, Coordinates), IoError> {
    use traits::MolecularFile;
    match StructureFormat::from_path(path)? {
        StructureFormat::Pdb => pdb::PdbFile::read_from_path(path).map(|(t, c, _)| (t, c)),
        StructureFormat::Cif => cif::CifFile::read_from_path(path).map(|(t, c, _)| (t, c)),
        StructureFormat::Sdf => {
            sdf::SdfFile::read_entry_from_path(path, entry_index, residue_name).map(|(t, c, _)| (t, c))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_resolved_from_extension() {
        assert_eq!(StructureFormat::from_path(Path::new("a/b.PDB")).unwrap(), StructureFormat::Pdb);
        assert_eq!(StructureFormat::from_path(Path::new("x.cif")).unwrap(), StructureFormat::Cif);
        assert_eq!(StructureFormat::from_path(Path::new("lig.sdf")).unwrap(), StructureFormat::Sdf);
    }

    #[test]
    fn unknown_extension_fails_fast() {
        let err = StructureFormat::from_path(Path::new("protein.gro")).unwrap_err();
        assert!(matches!(err, IoError::UnsupportedExtension { ref extension, .. } if extension == "gro"));
    }

    #[test]
    fn sdf_is_rejected_for_biomolecules() {
        let err = read_biomolecule(Path::new("does-not-matter.sdf")).unwrap_err();
        assert!(matches!(err, IoError::UnsupportedRole { format: StructureFormat::Sdf, .. }));
    }

    #[test]
    fn chain_types_are_inferred_from_residue_names() {
        assert_eq!(chain_type_for_residue("ALA"), ChainType::Protein);
        assert_eq!(chain_type_for_residue("ACE"), ChainType::Protein);
        assert_eq!(chain_type_for_residue("HOH"), ChainType::Water);
        assert_eq!(chain_type_for_residue("NA"), ChainType::Ion);
        assert_eq!(chain_type_for_residue("MOL"), ChainType::Ligand);
    }
}
