use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

#[derive(Debug, Error)]
#[error("Invalid bond order string")]
pub struct ParseBondOrderError;

impl FromStr for BondOrder {
    type Err = ParseBondOrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "4" | "ar" | "aromatic" => Ok(Self::Aromatic),
            _ => Err(ParseBondOrderError),
        }
    }
}

impl fmt::Display for BondOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Aromatic => "Aromatic",
            }
        )
    }
}

/// An undirected bond between two atom indices of the same topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bond {
    pub atom1: usize,     // Index of the first atom
    pub atom2: usize,     // Index of the second atom
    pub order: BondOrder, // Bond order (e.g., single, double, etc.)
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize, order: BondOrder) -> Self {
        Self {
            atom1,
            atom2,
            order,
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }

    /// Returns the partner of `atom` in this bond, if `atom` takes part in it.
    pub fn partner(&self, atom: usize) -> Option<usize> {
        if self.atom1 == atom {
            Some(self.atom2)
        } else if self.atom2 == atom {
            Some(self.atom1)
        } else {
            None
        }
    }

    /// Whether this bond connects the same two atoms as `other`, in either direction.
    pub fn same_atoms(&self, other: &Bond) -> bool {
        (self.atom1 == other.atom1 && self.atom2 == other.atom2)
            || (self.atom1 == other.atom2 && self.atom2 == other.atom1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bond_order_from_str_valid() {
        assert_eq!(BondOrder::from_str("1").unwrap(), BondOrder::Single);
        assert_eq!(BondOrder::from_str("double").unwrap(), BondOrder::Double);
        assert_eq!(BondOrder::from_str("T").unwrap(), BondOrder::Triple);
        assert_eq!(BondOrder::from_str("4").unwrap(), BondOrder::Aromatic);
    }

    #[test]
    fn bond_order_from_str_invalid() {
        assert!(BondOrder::from_str("quadruple").is_err());
    }

    #[test]
    fn bond_order_default_is_single() {
        assert_eq!(BondOrder::default(), BondOrder::Single);
    }

    #[test]
    fn bond_reports_partner_and_membership() {
        let bond = Bond::new(3, 7, BondOrder::Single);
        assert!(bond.contains(3));
        assert!(!bond.contains(5));
        assert_eq!(bond.partner(7), Some(3));
        assert_eq!(bond.partner(5), None);
    }

    #[test]
    fn same_atoms_ignores_direction() {
        let a = Bond::new(1, 2, BondOrder::Single);
        let b = Bond::new(2, 1, BondOrder::Double);
        let c = Bond::new(1, 3, BondOrder::Single);
        assert!(a.same_atoms(&b));
        assert!(!a.same_atoms(&c));
    }
}
