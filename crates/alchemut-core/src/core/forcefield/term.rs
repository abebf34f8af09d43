use serde::Serialize;
use std::ops::{Add, AddAssign};

/// Potential energy split by force term, in kJ/mol.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EnergyBreakdown {
    pub bond: f64,
    pub angle: f64,
    pub torsion: f64,
    pub nonbonded: f64,
}

impl EnergyBreakdown {
    pub fn new(bond: f64, angle: f64, torsion: f64, nonbonded: f64) -> Self {
        Self {
            bond,
            angle,
            torsion,
            nonbonded,
        }
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.bond + self.angle + self.torsion + self.nonbonded
    }

    /// Reduced potential `β·U` of the total energy.
    #[inline]
    pub fn reduced(&self, beta: f64) -> f64 {
        beta * self.total()
    }

    pub fn is_finite(&self) -> bool {
        self.total().is_finite()
    }
}

impl Add for EnergyBreakdown {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            bond: self.bond + rhs.bond,
            angle: self.angle + rhs.angle,
            torsion: self.torsion + rhs.torsion,
            nonbonded: self.nonbonded + rhs.nonbonded,
        }
    }
}

impl AddAssign for EnergyBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        self.bond += rhs.bond;
        self.angle += rhs.angle;
        self.torsion += rhs.torsion;
        self.nonbonded += rhs.nonbonded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_returns_sum_of_all_terms() {
        let energy = EnergyBreakdown::new(1.5, -2.0, 0.5, 1.0);
        assert_eq!(energy.total(), 1.0);
    }

    #[test]
    fn reduced_scales_total_by_beta() {
        let energy = EnergyBreakdown::new(1.0, 1.0, 0.0, 2.0);
        assert_eq!(energy.reduced(0.5), 2.0);
    }

    #[test]
    fn add_and_add_assign_are_term_wise() {
        let a = EnergyBreakdown::new(1.0, 2.0, 3.0, 4.0);
        let b = EnergyBreakdown::new(0.5, 0.5, 0.5, 0.5);
        let sum = a + b;
        assert_eq!(sum, EnergyBreakdown::new(1.5, 2.5, 3.5, 4.5));

        let mut acc = EnergyBreakdown::default();
        acc += a;
        acc += b;
        assert_eq!(acc, sum);
    }

    #[test]
    fn infinite_terms_are_detected() {
        let energy = EnergyBreakdown::new(f64::INFINITY, 0.0, 0.0, 0.0);
        assert!(!energy.is_finite());
        assert!(EnergyBreakdown::default().is_finite());
    }
}
