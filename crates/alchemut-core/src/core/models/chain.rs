use super::ids::ResidueId;
use std::fmt;

/// Broad role of a chain within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainType {
    Protein,
    Ligand,
    Water,
    Ion,
    Other,
}

impl ChainType {
    /// Water and counter-ions: never part of the mutated region or the REST region.
    pub fn is_solvent(self) -> bool {
        matches!(self, Self::Water | Self::Ion)
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protein => "protein",
            Self::Ligand => "ligand",
            Self::Water => "water",
            Self::Ion => "ion",
            Self::Other => "other",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: String,
    pub chain_type: ChainType,
    pub(crate) residues: Vec<ResidueId>,
}

impl Chain {
    pub(crate) fn new(id: &str, chain_type: ChainType) -> Self {
        Self {
            id: id.to_string(),
            chain_type,
            residues: Vec::new(),
        }
    }

    /// Residues in chain order.
    pub fn residues(&self) -> &[ResidueId] {
        &self.residues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solvent_chains_are_water_and_ions() {
        assert!(ChainType::Water.is_solvent());
        assert!(ChainType::Ion.is_solvent());
        assert!(!ChainType::Ligand.is_solvent());
        assert!(!ChainType::Protein.is_solvent());
    }

    #[test]
    fn chain_type_displays_lowercase() {
        assert_eq!(ChainType::Water.to_string(), "water");
    }

    #[test]
    fn new_chain_starts_empty() {
        let chain = Chain::new("B", ChainType::Ligand);
        assert_eq!(chain.id, "B");
        assert!(chain.residues().is_empty());
    }
}
