use super::ids::ChainId;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AminoAcidType {
    // --- Aliphatic, Nonpolar ---
    Alanine,    // Alanine (ALA)
    Glycine,    // Glycine (GLY)
    Isoleucine, // Isoleucine (ILE)
    Leucine,    // Leucine (LEU)
    Proline,    // Proline (PRO)
    Valine,     // Valine (VAL)

    // --- Aromatic ---
    Phenylalanine, // Phenylalanine (PHE)
    Tryptophan,    // Tryptophan (TRP)
    Tyrosine,      // Tyrosine (TYR)

    // --- Polar, Uncharged ---
    Asparagine, // Asparagine (ASN)
    Cysteine,   // Cysteine (CYS)
    Cystine,    // Disulfide-bonded cysteine (CYX)
    Glutamine,  // Glutamine (GLN)
    Serine,     // Serine (SER)
    Threonine,  // Threonine (THR)
    Methionine, // Methionine (MET)

    // --- Positively Charged (Basic) ---
    Arginine, // Arginine (ARG)
    Lysine,   // Lysine (LYS)

    // --- Negatively Charged (Acidic) ---
    AsparticAcid, // Aspartic Acid (ASP)
    GlutamicAcid, // Glutamic Acid (GLU)

    // --- Neutral Protonation States ---
    AsparticAcidProtonated, // Protonated aspartic acid (ASH)
    GlutamicAcidProtonated, // Protonated glutamic acid (GLH)
    LysineNeutral,          // Neutral lysine (LYN)

    // --- Special Case: Histidine and its Variants ---
    Histidine,           // Histidine (HIS) - Treated as the epsilon-protonated tautomer
    HistidineDelta,      // Delta-protonated histidine (HID)
    HistidineEpsilon,    // Epsilon-protonated histidine (HIE)
    HistidineProtonated, // Doubly-protonated histidine (HIP) - The positively charged variant
}

impl AminoAcidType {
    /// Three-letter residue code used in structure files and force-field templates.
    pub fn to_three_letter(&self) -> &'static str {
        match self {
            Self::Alanine => "ALA",
            Self::Glycine => "GLY",
            Self::Isoleucine => "ILE",
            Self::Leucine => "LEU",
            Self::Proline => "PRO",
            Self::Valine => "VAL",
            Self::Phenylalanine => "PHE",
            Self::Tryptophan => "TRP",
            Self::Tyrosine => "TYR",
            Self::Asparagine => "ASN",
            Self::Cysteine => "CYS",
            Self::Cystine => "CYX",
            Self::Glutamine => "GLN",
            Self::Serine => "SER",
            Self::Threonine => "THR",
            Self::Methionine => "MET",
            Self::Arginine => "ARG",
            Self::Lysine => "LYS",
            Self::AsparticAcid => "ASP",
            Self::GlutamicAcid => "GLU",
            Self::AsparticAcidProtonated => "ASH",
            Self::GlutamicAcidProtonated => "GLH",
            Self::LysineNeutral => "LYN",
            Self::Histidine => "HIS",
            Self::HistidineDelta => "HID",
            Self::HistidineEpsilon => "HIE",
            Self::HistidineProtonated => "HIP",
        }
    }

    /// Integer formal charge of the residue's side chain at its named protonation state.
    pub fn formal_charge(&self) -> i32 {
        match self {
            Self::Arginine | Self::Lysine | Self::HistidineProtonated => 1,
            Self::AsparticAcid | Self::GlutamicAcid => -1,
            _ => 0,
        }
    }

    /// Whether the side chain closes a ring.
    ///
    /// Ring side chains need a torsion bias during geometry proposal.
    pub fn has_ring_sidechain(&self) -> bool {
        matches!(
            self,
            Self::Tyrosine
                | Self::Phenylalanine
                | Self::Tryptophan
                | Self::Proline
                | Self::Histidine
                | Self::HistidineDelta
                | Self::HistidineEpsilon
                | Self::HistidineProtonated
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown amino acid residue name: '{0}'")]
pub struct ParseAminoAcidError(pub String);

impl FromStr for AminoAcidType {
    type Err = ParseAminoAcidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALA" => Ok(Self::Alanine),
            "GLY" => Ok(Self::Glycine),
            "ILE" => Ok(Self::Isoleucine),
            "LEU" => Ok(Self::Leucine),
            "PRO" => Ok(Self::Proline),
            "VAL" => Ok(Self::Valine),
            "PHE" => Ok(Self::Phenylalanine),
            "TRP" => Ok(Self::Tryptophan),
            "TYR" => Ok(Self::Tyrosine),
            "ASN" => Ok(Self::Asparagine),
            "CYS" => Ok(Self::Cysteine),
            "CYX" => Ok(Self::Cystine),
            "GLN" => Ok(Self::Glutamine),
            "SER" => Ok(Self::Serine),
            "THR" => Ok(Self::Threonine),
            "MET" => Ok(Self::Methionine),
            "ARG" => Ok(Self::Arginine),
            "LYS" => Ok(Self::Lysine),
            "ASP" => Ok(Self::AsparticAcid),
            "GLU" => Ok(Self::GlutamicAcid),
            "ASH" => Ok(Self::AsparticAcidProtonated),
            "GLH" => Ok(Self::GlutamicAcidProtonated),
            "LYN" => Ok(Self::LysineNeutral),
            "HIS" => Ok(Self::Histidine),
            "HID" => Ok(Self::HistidineDelta),
            "HIE" => Ok(Self::HistidineEpsilon),
            "HIP" => Ok(Self::HistidineProtonated),
            other => Err(ParseAminoAcidError(other.to_string())),
        }
    }
}

impl fmt::Display for AminoAcidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_three_letter())
    }
}

/// Residue names recognized as solvent water.
pub const WATER_RESIDUE_NAMES: [&str; 2] = ["HOH", "WAT"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub number: String,                   // Residue sequence number (with insertion code) from source file
    pub name: String,                     // Name of the residue (e.g., "ALA", "HOH")
    pub chain_id: ChainId,                // ID of the parent chain
    pub(crate) atoms: Vec<usize>,         // Indices of atoms belonging to this residue
    atom_name_map: HashMap<String, usize>, // Map from atom name to its index
}

impl Residue {
    pub(crate) fn new(number: &str, name: &str, chain_id: ChainId) -> Self {
        Self {
            number: number.to_string(),
            name: name.to_string(),
            chain_id,
            atoms: Vec::new(),
            atom_name_map: HashMap::new(),
        }
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn atom_by_name(&self, name: &str) -> Option<usize> {
        self.atom_name_map.get(name).copied()
    }

    pub fn amino_acid(&self) -> Option<AminoAcidType> {
        self.name.parse().ok()
    }

    pub fn is_water(&self) -> bool {
        WATER_RESIDUE_NAMES.contains(&self.name.as_str())
    }

    pub(crate) fn add_atom(&mut self, name: &str, index: usize) {
        self.atoms.push(index);
        self.atom_name_map.insert(name.to_string(), index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn dummy_chain_id() -> ChainId {
        ChainId::from(KeyData::from_ffi(1))
    }

    #[test]
    fn parses_all_histidine_tautomers() {
        assert_eq!("HID".parse::<AminoAcidType>(), Ok(AminoAcidType::HistidineDelta));
        assert_eq!("hie".parse::<AminoAcidType>(), Ok(AminoAcidType::HistidineEpsilon));
        assert_eq!("HIP".parse::<AminoAcidType>(), Ok(AminoAcidType::HistidineProtonated));
        assert!("HSD".parse::<AminoAcidType>().is_err());
    }

    #[test]
    fn formal_charges_match_protonation_states() {
        assert_eq!(AminoAcidType::AsparticAcid.formal_charge(), -1);
        assert_eq!(AminoAcidType::AsparticAcidProtonated.formal_charge(), 0);
        assert_eq!(AminoAcidType::Lysine.formal_charge(), 1);
        assert_eq!(AminoAcidType::LysineNeutral.formal_charge(), 0);
        assert_eq!(AminoAcidType::HistidineProtonated.formal_charge(), 1);
        assert_eq!(AminoAcidType::Alanine.formal_charge(), 0);
    }

    #[test]
    fn ring_residues_are_flagged() {
        for name in ["TYR", "PHE", "TRP", "PRO", "HIS", "HID", "HIE", "HIP"] {
            let aa: AminoAcidType = name.parse().unwrap();
            assert!(aa.has_ring_sidechain(), "{name} should be a ring residue");
        }
        assert!(!AminoAcidType::Serine.has_ring_sidechain());
    }

    #[test]
    fn three_letter_code_round_trips_through_display() {
        assert_eq!(AminoAcidType::Cystine.to_string(), "CYX");
        assert_eq!("CYX".parse::<AminoAcidType>(), Ok(AminoAcidType::Cystine));
    }

    #[test]
    fn residue_tracks_atoms_by_name() {
        let mut residue = Residue::new("10", "SER", dummy_chain_id());
        residue.add_atom("N", 4);
        residue.add_atom("OG", 9);
        assert_eq!(residue.atoms(), &[4, 9]);
        assert_eq!(residue.atom_by_name("OG"), Some(9));
        assert_eq!(residue.atom_by_name("CB"), None);
        assert_eq!(residue.amino_acid(), Some(AminoAcidType::Serine));
        assert!(!residue.is_water());
    }
}
