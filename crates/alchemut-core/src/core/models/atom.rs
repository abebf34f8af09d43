use super::ids::ResidueId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chemical element of an atom.
///
/// Only the elements that occur in biomolecules, common ligands and solvent are
/// enumerated; anything else is carried as [`Element::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Element {
    H,
    C,
    N,
    O,
    S,
    P,
    F,
    Cl,
    Br,
    I,
    Na,
    K,
    Mg,
    Ca,
    Zn,
    #[default]
    Other,
}

#[derive(Debug, Error)]
#[error("Unknown element symbol: '{0}'")]
pub struct ParseElementError(pub String);

impl FromStr for Element {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "H" | "D" => Ok(Self::H),
            "C" => Ok(Self::C),
            "N" => Ok(Self::N),
            "O" => Ok(Self::O),
            "S" => Ok(Self::S),
            "P" => Ok(Self::P),
            "F" => Ok(Self::F),
            "CL" => Ok(Self::Cl),
            "BR" => Ok(Self::Br),
            "I" => Ok(Self::I),
            "NA" => Ok(Self::Na),
            "K" => Ok(Self::K),
            "MG" => Ok(Self::Mg),
            "CA" => Ok(Self::Ca),
            "ZN" => Ok(Self::Zn),
            other => Err(ParseElementError(other.to_string())),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::H => "H",
            Self::C => "C",
            Self::N => "N",
            Self::O => "O",
            Self::S => "S",
            Self::P => "P",
            Self::F => "F",
            Self::Cl => "Cl",
            Self::Br => "Br",
            Self::I => "I",
            Self::Na => "Na",
            Self::K => "K",
            Self::Mg => "Mg",
            Self::Ca => "Ca",
            Self::Zn => "Zn",
            Self::Other => "X",
        };
        f.write_str(symbol)
    }
}

impl Element {
    /// Guesses the element from a PDB-style atom name.
    ///
    /// Protein atom names carry the element as their first letter (`CA` is an
    /// alpha carbon, not calcium), so the guess only considers two-letter symbols
    /// for ion-like names that are the whole atom name.
    pub fn guess_from_atom_name(name: &str) -> Self {
        let trimmed = name.trim().trim_start_matches(|c: char| c.is_ascii_digit());
        let upper = trimmed.to_ascii_uppercase();
        match upper.as_str() {
            "NA" | "NA+" => return Self::Na,
            "CL" | "CL-" => return Self::Cl,
            "K" | "K+" => return Self::K,
            "MG" => return Self::Mg,
            "ZN" => return Self::Zn,
            _ => {}
        }
        upper
            .chars()
            .next()
            .and_then(|c| c.to_string().parse().ok())
            .unwrap_or_default()
    }

    pub fn is_hydrogen(self) -> bool {
        self == Self::H
    }
}

/// A single atom of a [`MolecularTopology`](super::system::MolecularTopology).
///
/// Atoms carry identity only; positions are stored separately so that a topology
/// can be shared between coordinate sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub name: String,          // Atom name (e.g., "CA", "HB2")
    pub element: Element,      // Chemical element
    pub residue_id: ResidueId, // ID of the parent residue
}

impl Atom {
    /// Creates a new atom belonging to the given residue.
    ///
    /// # Arguments
    ///
    /// * `name` - The atom name.
    /// * `element` - The chemical element.
    /// * `residue_id` - Key of the residue the atom belongs to.
    pub fn new(name: &str, element: Element, residue_id: ResidueId) -> Self {
        Self {
            name: name.to_string(),
            element,
            residue_id,
        }
    }
}
